//! Histogram accumulator service. Subscribes to an upstream events
//! stream, fills per-channel qlong/qshort histograms, and republishes a
//! JSON snapshot on the same cadence status is published.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::histogram::Histogram2D;
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;
use daqflow::wire::psd::decode_events;
use daqflow::wire::StageCommand;

#[derive(Debug, Deserialize)]
struct HistodDeviceConfig {
    #[serde(default = "default_bins")]
    bins: usize,
    #[serde(default = "default_max")]
    qshort_max: f64,
    #[serde(default = "default_max")]
    qlong_max: f64,
}

fn default_bins() -> usize {
    256
}

fn default_max() -> f64 {
    65536.0
}

impl Default for HistodDeviceConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
            qshort_max: default_max(),
            qlong_max: default_max(),
        }
    }
}

struct HistodHooks {
    config: HistodDeviceConfig,
    per_channel: HashMap<u8, Histogram2D>,
    events_in: u64,
    snapshot: Option<Vec<u8>>,
}

impl HistodHooks {
    fn new() -> Self {
        Self {
            config: HistodDeviceConfig::default(),
            per_channel: HashMap::new(),
            events_in: 0,
            snapshot: None,
        }
    }

    fn histogram_for(&mut self, channel: u8) -> &mut Histogram2D {
        let config = &self.config;
        self.per_channel.entry(channel).or_insert_with(|| {
            Histogram2D::new(config.bins, 0.0, config.qshort_max, config.bins, 0.0, config.qlong_max)
        })
    }

    fn build_snapshot(&self) -> Vec<u8> {
        let mut per_channel = serde_json::Map::new();
        for (channel, histo) in &self.per_channel {
            per_channel.insert(channel.to_string(), histo.to_json());
        }
        serde_json::to_vec(&Value::Object(per_channel)).unwrap_or_default()
    }
}

impl StageHooks for HistodHooks {
    fn stage_name(&self) -> &'static str {
        "histod"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        self.config = serde_json::from_value(config.clone()).unwrap_or_default();
        self.per_channel.clear();
        Ok(())
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                if !topic_str.contains("_events_v0") {
                    return Ok(PollOutcome::Idle);
                }
                for view in decode_events(&payload).map_err(|e| StageError::Parse(e.to_string()))? {
                    self.events_in += 1;
                    self.histogram_for(view.channel()).fill(view.qshort() as f64, view.qlong() as f64);
                }
                self.snapshot = Some(self.build_snapshot());
                Ok(PollOutcome::Produced(1))
            }
            Ok(None) => Ok(PollOutcome::Idle),
            Err(e) => Err(StageError::Communication(e.to_string())),
        }
    }

    fn pending_len(&self) -> usize {
        if self.snapshot.is_some() {
            1
        } else {
            0
        }
    }

    fn publish_pending(&mut self, data_pub: Option<&Socket>) -> Result<usize, StageError> {
        let Some(bytes) = self.snapshot.take() else {
            return Ok(0);
        };
        if let Some(socket) = data_pub {
            let topic = format!("data_histod_histograms_v0_s{}", bytes.len());
            socket
                .send(&topic, &bytes)
                .map_err(|e| StageError::Communication(e.to_string()))?;
        }
        Ok(1)
    }

    fn status_fields(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("events_in".to_string(), self.events_in.into());
        map.insert("channels_tracked".to_string(), self.per_channel.len().into());
        map
    }

    fn handle_custom_command(&mut self, cmd: &StageCommand) {
        if *cmd == StageCommand::Reset {
            for histo in self.per_channel.values_mut() {
                histo.reset();
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("histod", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("histod");
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
    let mut hooks = HistodHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
