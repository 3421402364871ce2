//! Coincidence filter stage binary. Subscribes to an upstream events
//! stream, groups events within a timing window of a reference channel,
//! and republishes coincidence (and, optionally, anticoincidence) groups.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::ops::cofi::{self, CofiConfig};
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;
use daqflow::wire::topic;

#[derive(Debug, Deserialize, Default)]
struct CofiDeviceConfig {
    reference_channels: Option<Vec<u8>>,
    left_window: Option<i64>,
    right_window: Option<i64>,
    multiplicity: Option<usize>,
    keep_reference_without_matches: Option<bool>,
    enable_anticoincidences: Option<bool>,
    output_growth_multiplier: Option<usize>,
}

struct CofiHooks {
    config: CofiConfig,
    pending: VecDeque<(String, Vec<u8>)>,
    events_in: u64,
    events_out: u64,
}

impl CofiHooks {
    fn new() -> Self {
        Self {
            config: CofiConfig::default(),
            pending: VecDeque::new(),
            events_in: 0,
            events_out: 0,
        }
    }

    fn handle_message(&mut self, topic_str: &str, payload: &[u8]) -> Result<(), StageError> {
        if !topic_str.contains("_events_v0") {
            self.pending.push_back((topic_str.to_string(), payload.to_vec()));
            return Ok(());
        }
        let (coincidence, anti) = cofi::filter_events(payload, &self.config)
            .map_err(|e| StageError::Parse(e.to_string()))?;
        self.events_in += (payload.len() / daqflow::wire::PSD_EVENT_SIZE) as u64;
        if !coincidence.is_empty() {
            self.events_out += (coincidence.len() / daqflow::wire::PSD_EVENT_SIZE) as u64;
            let out_topic = topic::with_size_suffix("data_cofi_events_v0", coincidence.len());
            self.pending.push_back((out_topic, coincidence));
        }
        if self.config.enable_anticoincidences && !anti.is_empty() {
            let out_topic = topic::with_size_suffix("anti_cofi_events_v0", anti.len());
            self.pending.push_back((out_topic, anti));
        }
        Ok(())
    }
}

impl StageHooks for CofiHooks {
    fn stage_name(&self) -> &'static str {
        "cofi"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        let parsed: CofiDeviceConfig =
            serde_json::from_value(config.clone()).map_err(|e| StageError::Parse(e.to_string()))?;
        let defaults = CofiConfig::default();
        self.config = CofiConfig {
            reference_channels: parsed.reference_channels.unwrap_or(defaults.reference_channels),
            left_window: parsed.left_window.unwrap_or(defaults.left_window),
            right_window: parsed.right_window.unwrap_or(defaults.right_window),
            multiplicity: parsed.multiplicity.unwrap_or(defaults.multiplicity),
            keep_reference_without_matches: parsed
                .keep_reference_without_matches
                .unwrap_or(defaults.keep_reference_without_matches),
            enable_anticoincidences: parsed
                .enable_anticoincidences
                .unwrap_or(defaults.enable_anticoincidences),
            output_growth_multiplier: parsed
                .output_growth_multiplier
                .unwrap_or(defaults.output_growth_multiplier),
        };
        Ok(())
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
        map.insert("events_in".to_string(), self.events_in.into());
        map.insert("events_out".to_string(), self.events_out.into());
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("cofi", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("cofi");
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
    let mut hooks = CofiHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
