//! Temporal sorter stage binary. Subscribes to an upstream events or
//! waveforms stream and republishes each message's records stably
//! sorted by timestamp.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::ops::sofi;
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;
use daqflow::wire::topic;

struct SofiHooks {
    pending: VecDeque<(String, Vec<u8>)>,
    records_in: u64,
}

impl SofiHooks {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            records_in: 0,
        }
    }

    fn handle_message(&mut self, topic_str: &str, payload: &[u8]) -> Result<(), StageError> {
        let sorted = if topic_str.contains("_waveforms_v0") {
            sofi::sort_waveforms(payload)
        } else if topic_str.contains("_events_v0") {
            sofi::sort_events(payload)
        } else {
            self.pending.push_back((topic_str.to_string(), payload.to_vec()));
            return Ok(());
        }
        .map_err(|e| StageError::Parse(e.to_string()))?;

        self.records_in += 1;
        let prefix = topic::kind_producer_prefix(topic_str);
        let suffix = &topic_str[prefix.len()..];
        let rebuilt = format!("data_sofi{suffix}");
        let without_size = topic::strip_size_suffix(&rebuilt);
        let out_topic = topic::with_size_suffix(without_size, sorted.len());
        self.pending.push_back((out_topic, sorted));
        Ok(())
    }
}

impl StageHooks for SofiHooks {
    fn stage_name(&self) -> &'static str {
        "sofi"
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                self.handle_message(&topic_str, &payload)?;
                Ok(PollOutcome::Produced(1))
            }
            Ok(None) => Ok(PollOutcome::Idle),
            Err(e) => Err(StageError::Communication(e.to_string())),
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn publish_pending(&mut self, data_pub: Option<&Socket>) -> Result<usize, StageError> {
        let Some(socket) = data_pub else {
            let n = self.pending.len();
            self.pending.clear();
            return Ok(n);
        };
        let mut published = 0;
        while let Some((topic_str, payload)) = self.pending.pop_front() {
            socket
                .send(&topic_str, &payload)
                .map_err(|e| StageError::Communication(e.to_string()))?;
            published += 1;
        }
        Ok(published)
    }

    fn status_fields(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("records_in".to_string(), self.records_in.into());
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("sofi", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("sofi");
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
    let mut hooks = SofiHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
