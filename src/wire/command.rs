//! Command JSON received on a stage's PULL socket: `{"command": "<name>",
//! "arguments": {...}}`. Commands are fire-and-forget — acknowledgement is
//! implicit through the next status publication, not a reply message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recognized command vocabulary across the system. `Other` carries any
/// unrecognized name verbatim so callers can log it before ignoring it —
/// unknown commands are ignored, not rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum StageCommand {
    Start,
    Stop,
    Reconfigure(Value),
    Off,
    Quit,
    Reset,
    AddFile { filename: String },
    Snapshot,
    Other(String),
}

impl StageCommand {
    pub fn name(&self) -> &str {
        match self {
            StageCommand::Start => "start",
            StageCommand::Stop => "stop",
            StageCommand::Reconfigure(_) => "reconfigure",
            StageCommand::Off => "off",
            StageCommand::Quit => "quit",
            StageCommand::Reset => "reset",
            StageCommand::AddFile { .. } => "add_file",
            StageCommand::Snapshot => "snapshot",
            StageCommand::Other(name) => name,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let (command, arguments) = match self {
            StageCommand::Reconfigure(config) => {
                ("reconfigure", serde_json::json!({ "config": config }))
            }
            StageCommand::AddFile { filename } => {
                ("add_file", serde_json::json!({ "filename": filename }))
            }
            other => (other.name(), Value::Object(Default::default())),
        };
        serde_json::to_vec(&RawCommand {
            command: command.to_string(),
            arguments,
        })
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let raw: RawCommand = serde_json::from_slice(bytes)?;
        Ok(raw.into_stage_command())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawCommand {
    command: String,
    #[serde(default)]
    arguments: Value,
}

impl RawCommand {
    fn into_stage_command(self) -> StageCommand {
        match self.command.as_str() {
            "start" => StageCommand::Start,
            "stop" => StageCommand::Stop,
            "reconfigure" => {
                let config = self
                    .arguments
                    .get("config")
                    .cloned()
                    .unwrap_or(Value::Null);
                StageCommand::Reconfigure(config)
            }
            "off" => StageCommand::Off,
            "quit" => StageCommand::Quit,
            "reset" => StageCommand::Reset,
            "add_file" => {
                let filename = self
                    .arguments
                    .get("filename")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                StageCommand::AddFile { filename }
            }
            "snapshot" => StageCommand::Snapshot,
            other => StageCommand::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_roundtrip() {
        for cmd in [StageCommand::Start, StageCommand::Stop, StageCommand::Quit] {
            let bytes = cmd.to_json().unwrap();
            let decoded = StageCommand::from_json(&bytes).unwrap();
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn reconfigure_carries_arguments_config() {
        let cmd = StageCommand::Reconfigure(serde_json::json!({"base_period_ms": 20}));
        let bytes = cmd.to_json().unwrap();
        let decoded = StageCommand::from_json(&bytes).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn unknown_command_name_is_preserved_not_rejected() {
        let bytes = br#"{"command": "frobnicate", "arguments": {}}"#;
        let decoded = StageCommand::from_json(bytes).unwrap();
        assert_eq!(decoded, StageCommand::Other("frobnicate".to_string()));
    }

    #[test]
    fn add_file_extracts_filename() {
        let bytes = br#"{"command": "add_file", "arguments": {"filename": "run042"}}"#;
        let decoded = StageCommand::from_json(bytes).unwrap();
        assert_eq!(
            decoded,
            StageCommand::AddFile {
                filename: "run042".to_string()
            }
        );
    }
}
