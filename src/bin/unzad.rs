//! Decompressor stage binary. Subscribes to `compressed_<algo>_<inner>`
//! topics and republishes each message restored to its original topic
//! and bytes.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::ops::compress;
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;

const DEFAULT_MAX_OUTPUT: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize, Default)]
struct UnzadDeviceConfig {
    max_output_bytes: Option<usize>,
}

struct UnzadHooks {
    max_output: usize,
    pending: VecDeque<(String, Vec<u8>)>,
    bytes_in: u64,
    bytes_out: u64,
}

impl UnzadHooks {
    fn new() -> Self {
        Self {
            max_output: DEFAULT_MAX_OUTPUT,
            pending: VecDeque::new(),
            bytes_in: 0,
            bytes_out: 0,
        }
    }
}

impl StageHooks for UnzadHooks {
    fn stage_name(&self) -> &'static str {
        "unzad"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        let parsed: UnzadDeviceConfig =
            serde_json::from_value(config.clone()).map_err(|e| StageError::Parse(e.to_string()))?;
        self.max_output = parsed.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT);
        Ok(())
    }

    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let Some(socket) = data_sub else {
            return Ok(PollOutcome::Idle);
        };
        match socket.recv_nonblocking() {
            Ok(Some((topic_str, payload))) => {
                if !topic_str.starts_with("compressed_") {
                    self.pending.push_back((topic_str, payload));
                    return Ok(PollOutcome::Produced(1));
                }
                self.bytes_in += payload.len() as u64;
                let (out_topic, decompressed) =
                    compress::decompress(&topic_str, &payload, self.max_output)
                        .map_err(|e| StageError::Acquisition(e.to_string()))?;
                self.bytes_out += decompressed.len() as u64;
                self.pending.push_back((out_topic, decompressed));
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
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("unzad", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("unzad");
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
    let mut hooks = UnzadHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
