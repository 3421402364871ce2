//! Waveform analyzer host stage binary. Subscribes to an upstream
//! waveforms stream and republishes derived PSD events plus any waveforms
//! that didn't yield one (or are explicitly passed through).

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::ops::waan::{AnalyzerHost, ChannelConfig, ChargeIntegrationAnalyzer};
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;
use daqflow::wire::topic;

#[derive(Debug, Deserialize, Default)]
struct ChannelConfigFile {
    channel: u8,
    baseline_samples: Option<usize>,
    short_gate_start: Option<usize>,
    short_gate_len: Option<usize>,
    long_gate_start: Option<usize>,
    long_gate_len: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct WaanDeviceConfig {
    passthrough_waveforms: Option<bool>,
    channels: Option<Vec<ChannelConfigFile>>,
}

struct WaanHooks {
    host: AnalyzerHost<ChargeIntegrationAnalyzer>,
    pending: VecDeque<(String, Vec<u8>)>,
    waveforms_in: u64,
    events_out: u64,
}

impl WaanHooks {
    fn new() -> Self {
        Self {
            host: AnalyzerHost::new(ChargeIntegrationAnalyzer),
            pending: VecDeque::new(),
            waveforms_in: 0,
            events_out: 0,
        }
    }
}

impl StageHooks for WaanHooks {
    fn stage_name(&self) -> &'static str {
        "waan"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        let parsed: WaanDeviceConfig =
            serde_json::from_value(config.clone()).map_err(|e| StageError::Parse(e.to_string()))?;
        self.host = AnalyzerHost::new(ChargeIntegrationAnalyzer);
        self.host.passthrough_waveforms = parsed.passthrough_waveforms.unwrap_or(false);
        for ch in parsed.channels.unwrap_or_default() {
            let defaults = ChannelConfig::default();
            self.host.set_channel_config(
                ch.channel,
                ChannelConfig {
                    baseline_samples: ch.baseline_samples.unwrap_or(defaults.baseline_samples),
                    short_gate_start: ch.short_gate_start.unwrap_or(defaults.short_gate_start),
                    short_gate_len: ch.short_gate_len.unwrap_or(defaults.short_gate_len),
                    long_gate_start: ch.long_gate_start.unwrap_or(defaults.long_gate_start),
                    long_gate_len: ch.long_gate_len.unwrap_or(defaults.long_gate_len),
                },
            );
        }
        Ok(())
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                if !topic_str.contains("_waveforms_v0") {
                    self.pending.push_back((topic_str, payload));
                    return Ok(PollOutcome::Produced(1));
                }
                self.waveforms_in += 1;
                let (events, waveforms) = self
                    .host
                    .process(&payload)
                    .map_err(|e| StageError::Parse(e.to_string()))?;
                if !events.is_empty() {
                    self.events_out += 1;
                    let out_topic = topic::with_size_suffix("data_waan_events_v0", events.len());
                    self.pending.push_back((out_topic, events));
                }
                if !waveforms.is_empty() {
                    let out_topic = topic::with_size_suffix("data_waan_waveforms_v0", waveforms.len());
                    self.pending.push_back((out_topic, waveforms));
                }
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
        map.insert("waveforms_in".to_string(), self.waveforms_in.into());
        map.insert("events_out".to_string(), self.events_out.into());
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("waan", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("waan");
    stage_config.status_bind.get_or_insert_with(|| "tcp://*:16206".to_string());
    stage_config.data_pub_bind.get_or_insert_with(|| "tcp://*:16207".to_string());
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
    let mut hooks = WaanHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
