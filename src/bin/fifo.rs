//! Expiration buffer stage binary. Accumulates incoming records and only
//! ever emits them in response to an explicit `snapshot` command — never
//! on the timer or high-water mark that drives every other stage.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::ops::fifo::ExpiringFifo;
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;
use daqflow::wire::topic;
use daqflow::wire::StageCommand;

const DEFAULT_EXPIRATION: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize, Default)]
struct FifoDeviceConfig {
    expiration_secs: Option<u64>,
}

struct FifoHooks {
    buffer: ExpiringFifo,
    last_topic: Option<String>,
    snapshot_requested: bool,
    events_buffered: u64,
    snapshots_taken: u64,
}

impl FifoHooks {
    fn new() -> Self {
        Self {
            buffer: ExpiringFifo::new(DEFAULT_EXPIRATION),
            last_topic: None,
            snapshot_requested: false,
            events_buffered: 0,
            snapshots_taken: 0,
        }
    }
}

impl StageHooks for FifoHooks {
    fn stage_name(&self) -> &'static str {
        "fifo"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        let parsed: FifoDeviceConfig =
            serde_json::from_value(config.clone()).map_err(|e| StageError::Parse(e.to_string()))?;
        let expiration = parsed
            .expiration_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_EXPIRATION);
        self.buffer = ExpiringFifo::new(expiration);
        Ok(())
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let now = Instant::now();
        self.buffer.evict_expired(now);

        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                self.events_buffered += 1;
                self.last_topic = Some(topic_str);
                self.buffer.push(payload, now);
                Ok(PollOutcome::Produced(1))
            }
            Ok(None) => Ok(PollOutcome::Idle),
            Err(e) => Err(StageError::Communication(e.to_string())),
        }
    }

    /// Forces `Stage::publish_due` to fire on the very next tick once a
    /// snapshot has been requested, regardless of the publish timer;
    /// otherwise reports empty so the buffer never auto-flushes.
    fn pending_len(&self) -> usize {
        if self.snapshot_requested {
            usize::MAX
        } else {
            0
        }
    }

    fn publish_pending(&mut self, data_pub: Option<&Socket>) -> Result<usize, StageError> {
        if !self.snapshot_requested {
            return Ok(0);
        }
        self.snapshot_requested = false;
        let snapshot = self.buffer.snapshot();
        if snapshot.is_empty() {
            return Ok(0);
        }
        self.snapshots_taken += 1;
        let Some(socket) = data_pub else {
            return Ok(1);
        };
        let kind = self
            .last_topic
            .as_deref()
            .and_then(|t| t.strip_prefix("data_"))
            .and_then(|rest| rest.split_once('_'))
            .map(|(_, kind)| topic::strip_size_suffix(kind))
            .unwrap_or("events_v0");
        let out_topic = topic::with_size_suffix(&format!("data_fifo_{kind}"), snapshot.len());
        socket
            .send(&out_topic, &snapshot)
            .map_err(|e| StageError::Communication(e.to_string()))?;
        Ok(1)
    }

    fn status_fields(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("events_buffered".to_string(), self.events_buffered.into());
        map.insert("buffer_len".to_string(), self.buffer.len().into());
        map.insert("snapshots_taken".to_string(), self.snapshots_taken.into());
        map
    }

    fn handle_custom_command(&mut self, cmd: &StageCommand) {
        if *cmd == StageCommand::Snapshot {
            self.snapshot_requested = true;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("fifo", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("fifo");
    if let Some(addr) = args.status_address {
        stage_config.status_bind = Some(addr);
    }
    if let Some(addr) = args.data_address {
        stage_config.data_pub_bind = Some(addr);
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
    let mut hooks = FifoHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
