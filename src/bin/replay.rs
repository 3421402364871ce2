//! Replay sequencer stage binary. Republishes a recorded `.ade`/`.adr`
//! file at the stage's own tick pace instead of a live source driving it.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;

use daqflow::cli::ReplayArgs;
use daqflow::config::StageFileConfig;
use daqflow::filereader::{AdeReader, AdrReader};
use daqflow::ops::replay::{ReplayConfig, ReplaySequencer, ReplaySource};
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::transport::Socket;

struct ReplayHooks {
    sequencer: ReplaySequencer,
    pending: VecDeque<(String, Vec<u8>)>,
    records_replayed: u64,
}

impl ReplayHooks {
    fn new(file_name: String, buffer_size: usize, config: ReplayConfig) -> anyhow::Result<Self> {
        let reopen_path = file_name.clone();
        let reopen = Box::new(move || -> Result<ReplaySource, daqflow::filereader::FileReaderError> {
            if reopen_path.ends_with(".adr") {
                Ok(ReplaySource::Adr(AdrReader::open(&reopen_path)?))
            } else {
                Ok(ReplaySource::Ade(AdeReader::open_psd_events(&reopen_path, buffer_size)?))
            }
        });
        let sequencer = ReplaySequencer::new(config, reopen)?;
        Ok(Self {
            sequencer,
            pending: VecDeque::new(),
            records_replayed: 0,
        })
    }
}

impl StageHooks for ReplayHooks {
    fn stage_name(&self) -> &'static str {
        "replay"
    }

    fn poll(&mut self, _data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        match self.sequencer.step() {
            Ok(Some((topic_str, payload))) => {
                self.records_replayed += 1;
                self.pending.push_back((topic_str, payload));
                Ok(PollOutcome::Produced(1))
            }
            Ok(None) => {
                if self.sequencer.is_finished() {
                    Ok(PollOutcome::Eof)
                } else {
                    Ok(PollOutcome::Idle)
                }
            }
            Err(e) => Err(StageError::Acquisition(e.to_string())),
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
        map.insert("records_replayed".to_string(), self.records_replayed.into());
        map.insert("finished".to_string(), self.sequencer.is_finished().into());
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = ReplayArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("replay", args.stage.verbosity());

    let file_config = StageFileConfig::load(&args.stage.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("replay");
    if let Some(addr) = args.stage.status_address {
        stage_config.status_bind = Some(addr);
    }
    if let Some(addr) = args.stage.data_address {
        stage_config.data_pub_bind = Some(addr);
    }
    if let Some(addr) = args.stage.commands_address {
        stage_config.command_pull_bind = Some(addr);
    }
    if let Some(ms) = args.stage.base_period_ms {
        stage_config.base_period = std::time::Duration::from_millis(ms);
    }

    let terminate = Arc::new(AtomicBool::new(false));
    daqflow::bootstrap::install_terminate_on_ctrl_c(terminate.clone());

    let replay_config = ReplayConfig {
        skip_packets: args.skip_packets,
        continuous: args.continuous,
    };
    let mut stage = Stage::new(stage_config, terminate);
    let mut hooks = ReplayHooks::new(args.file_name, args.buffer_size, replay_config)?;
    stage.run(&mut hooks);
    Ok(())
}
