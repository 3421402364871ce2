//! Compressor stage binary. Subscribes to any data topic and republishes
//! each message compressed under a `compressed_<algo>_<inner>` topic.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::ops::compress::{self, Algorithm};
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;

#[derive(Debug, Deserialize, Default)]
struct GzadDeviceConfig {
    algorithm: Option<String>,
}

struct GzadHooks {
    algorithm: Algorithm,
    pending: VecDeque<(String, Vec<u8>)>,
    bytes_in: u64,
    bytes_out: u64,
}

impl GzadHooks {
    fn new() -> Self {
        Self {
            algorithm: Algorithm::Zlib,
            pending: VecDeque::new(),
            bytes_in: 0,
            bytes_out: 0,
        }
    }
}

impl StageHooks for GzadHooks {
    fn stage_name(&self) -> &'static str {
        "gzad"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        let parsed: GzadDeviceConfig =
            serde_json::from_value(config.clone()).map_err(|e| StageError::Parse(e.to_string()))?;
        self.algorithm = parsed
            .algorithm
            .as_deref()
            .and_then(Algorithm::parse)
            .unwrap_or(Algorithm::Zlib);
        Ok(())
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                self.bytes_in += payload.len() as u64;
                let (out_topic, compressed) = compress::compress(self.algorithm, &topic_str, &payload)
                    .map_err(|e| StageError::Acquisition(e.to_string()))?;
                self.bytes_out += compressed.len() as u64;
                self.pending.push_back((out_topic, compressed));
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
        map.insert("bytes_in".to_string(), self.bytes_in.into());
        map.insert("bytes_out".to_string(), self.bytes_out.into());
        map.insert("algorithm".to_string(), self.algorithm.name().into());
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("gzad", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("gzad");
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
    let mut hooks = GzadHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
