//! Control-plane CLI client. Sends one fire-and-forget command to a
//! running stage and, if a status address was given, prints whatever
//! status messages arrive over the next few polls.

use clap::Parser;
use serde_json::Value;

use daqflow::cli::DaqctlArgs;
use daqflow::control::ControlClient;
use daqflow::transport::{Socket, SocketRole};
use daqflow::wire::StageCommand;

fn build_command(name: &str, arguments: Option<&str>) -> anyhow::Result<StageCommand> {
    Ok(match name {
        "start" => StageCommand::Start,
        "stop" => StageCommand::Stop,
        "off" => StageCommand::Off,
        "quit" => StageCommand::Quit,
        "reset" => StageCommand::Reset,
        "snapshot" => StageCommand::Snapshot,
        "reconfigure" => {
            let config = match arguments {
                Some(raw) => serde_json::from_str(raw)?,
                None => Value::Null,
            };
            StageCommand::Reconfigure(config)
        }
        "add_file" => {
            let filename = match arguments {
                Some(raw) => serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|v| v.get("filename").and_then(Value::as_str).map(String::from))
                    .unwrap_or_else(|| raw.trim_matches('"').to_string()),
                None => String::new(),
            };
            StageCommand::AddFile { filename }
        }
        other => StageCommand::Other(other.to_string()),
    })
}

fn main() -> anyhow::Result<()> {
    daqflow::bootstrap::init_tracing("daqctl", 1);
    let args = DaqctlArgs::try_parse_from(std::env::args())?;

    let command = build_command(&args.command, args.arguments.as_deref())?;

    let ctx = zmq::Context::new();
    match &args.status_address {
        Some(status_address) => {
            let client = ControlClient::connect(&ctx, &args.commands_address, status_address)?;
            client.send(command)?;
            println!("sent {} to {}", args.command, args.commands_address);
            for _ in 0..20 {
                if let Some(status) = client.poll_status()? {
                    println!("{}", serde_json::to_string(&status)?);
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
        }
        None => {
            let commands = Socket::connect(&ctx, SocketRole::Push, &args.commands_address)?;
            commands.send("command", &command.to_json()?)?;
            println!("sent {} to {}", args.command, args.commands_address);
        }
    }

    Ok(())
}
