//! Control-plane client, grounded on a `controller`-style binary shape
//! (connect to a running stage, send commands, observe status) but
//! **[REDESIGN]** re-targeted to PUSH/PULL fire-and-forget commands
//! instead of a REQ/REP round trip, matching the wire contract's
//! "commands are fire-and-forget; acknowledgement is implicit through the
//! next status publication" rule.

use crate::transport::{Socket, SocketRole, TransportResult};
use crate::wire::command::StageCommand;
use crate::wire::status::StatusMessage;

/// Connects to one running stage: a PUSH socket for commands and a SUB
/// socket for its status stream. Both connect to addresses the stage
/// already binds; the client never binds anything itself.
pub struct ControlClient {
    commands: Socket,
    status: Socket,
}

impl ControlClient {
    pub fn connect(ctx: &zmq::Context, commands_address: &str, status_address: &str) -> TransportResult<Self> {
        let commands = Socket::connect(ctx, SocketRole::Push, commands_address)?;
        let status = Socket::connect(ctx, SocketRole::Sub, status_address)?;
        status.subscribe("status_")?;
        Ok(Self { commands, status })
    }

    pub fn send(&self, command: StageCommand) -> anyhow::Result<()> {
        let bytes = command.to_json()?;
        // Commands have no topic framing of their own on the wire; the PULL
        // side reads the raw JSON payload directly.
        self.commands.send("command", &bytes)?;
        Ok(())
    }

    /// Polls for one status message without blocking, mirroring every
    /// stage's own non-suspending receive discipline.
    pub fn poll_status(&self) -> anyhow::Result<Option<StatusMessage>> {
        match self.status.recv_nonblocking()? {
            Some((_topic, payload)) => Ok(Some(StatusMessage::from_json(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Socket as RawSocket;

    #[test]
    fn send_encodes_command_as_json_payload() {
        let ctx = zmq::Context::new();
        let pull = RawSocket::bind(&ctx, SocketRole::Pull, "inproc://control-test-cmd").unwrap();
        let push = RawSocket::connect(&ctx, SocketRole::Push, "inproc://control-test-cmd").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));

        push.send("command", &StageCommand::Stop.to_json().unwrap()).unwrap();

        let mut received = None;
        for _ in 0..50 {
            if let Some(msg) = pull.recv_nonblocking().unwrap() {
                received = Some(msg);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let (_topic, payload) = received.expect("command should have arrived");
        assert_eq!(StageCommand::from_json(&payload).unwrap(), StageCommand::Stop);
    }
}
