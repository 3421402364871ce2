//! Log writer stage binary. Subscribes to upstream events/waveforms/raw
//! streams and appends every message to the currently open run's files.
//! A new run is only opened once `add_file` names a base filename.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::logwriter::RunRecorder;
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;
use daqflow::wire::StageCommand;

struct RecorderHooks {
    recorder: RunRecorder,
    records_written: u64,
}

impl RecorderHooks {
    fn new() -> Self {
        Self {
            recorder: RunRecorder::new(),
            records_written: 0,
        }
    }
}

impl StageHooks for RecorderHooks {
    fn stage_name(&self) -> &'static str {
        "recorder"
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                if !self.recorder.is_open() {
                    return Ok(PollOutcome::Idle);
                }
                let result = if topic_str.contains("_waveforms_v0") {
                    self.recorder.record_waveforms(&payload)
                } else if topic_str.contains("_events_v0") {
                    self.recorder.record_events(&payload)
                } else {
                    Ok(())
                };
                result.map_err(|e| StageError::Acquisition(e.to_string()))?;
                self.recorder
                    .record_raw(&topic_str, &payload)
                    .map_err(|e| StageError::Acquisition(e.to_string()))?;
                self.records_written += 1;
                Ok(PollOutcome::Produced(1))
            }
            Ok(None) => Ok(PollOutcome::Idle),
            Err(e) => Err(StageError::Communication(e.to_string())),
        }
    }

    /// The recorder writes straight through on every poll rather than
    /// buffering; `publish_pending` only flushes, on the same cadence
    /// every other stage uses to publish.
    fn publish_pending(&mut self, _data_pub: Option<&Socket>) -> Result<usize, StageError> {
        if self.recorder.is_open() {
            self.recorder
                .flush_all()
                .map_err(|e| StageError::Acquisition(e.to_string()))?;
        }
        Ok(0)
    }

    fn status_fields(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("records_written".to_string(), self.records_written.into());
        map.insert("is_open".to_string(), self.recorder.is_open().into());
        let (events_bytes, waveforms_bytes, raw_bytes) = self.recorder.byte_counters();
        map.insert("events_bytes".to_string(), events_bytes.into());
        map.insert("waveforms_bytes".to_string(), waveforms_bytes.into());
        map.insert("raw_bytes".to_string(), raw_bytes.into());
        map
    }

    fn handle_custom_command(&mut self, cmd: &StageCommand) {
        match cmd {
            StageCommand::AddFile { filename } => {
                if let Err(e) = self.recorder.open(filename) {
                    tracing::warn!(error = %e, filename, "failed to open recorder run");
                }
            }
            StageCommand::Reset => {
                if let Err(e) = self.recorder.close() {
                    tracing::warn!(error = %e, "failed to close recorder run on reset");
                }
            }
            _ => {}
        }
    }

    fn stop_acquisition(&mut self) -> Result<(), StageError> {
        self.recorder
            .close()
            .map_err(|e| StageError::Acquisition(e.to_string()))
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("recorder", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("recorder");
    if let Some(addr) = args.status_address {
        stage_config.status_bind = Some(addr);
    }
    if let Some(addr) = args.input_address {
        stage_config.data_sub_connect = Some(addr);
    }
    if let Some(addr) = args.commands_address {
        stage_config.command_pull_bind = Some(addr);
    }
    if let Some(ms) = args.base_period_ms {
        stage_config.base_period = std::time::Duration::from_millis(ms);
    }

    let terminate = Arc::new(AtomicBool::new(false));
    daqflow::bootstrap::install_terminate_on_ctrl_c(terminate.clone());

    let mut stage = Stage::new(stage_config, terminate);
    let mut hooks = RecorderHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
