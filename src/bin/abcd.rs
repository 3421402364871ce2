//! Acquisition source stage binary. Wraps an `AcquisitionSource` (the
//! emulator, the only built-in producer) and republishes triggers framed
//! as PSD events and, if configured, waveforms.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use daqflow::cli::StageArgs;
use clap::Parser;
use daqflow::config::StageFileConfig;
use daqflow::runtime::{PollOutcome, Stage, StageError, StageHooks};
use daqflow::source::emulator::{EmulatorConfig, EmulatorSource};
use daqflow::source::{AcquisitionSource, RawTrigger};
use daqflow::transport::Socket;
use daqflow::wire::psd::PsdEvent;
use daqflow::wire::waveform::WaveformEvent;

#[derive(Debug, Deserialize, Default)]
struct AbcdDeviceConfig {
    num_channels: Option<u8>,
    events_per_tick: Option<usize>,
    qshort_mean: Option<f64>,
    qshort_stddev: Option<f64>,
    qlong_mean: Option<f64>,
    qlong_stddev: Option<f64>,
    baseline_mean: Option<f64>,
    baseline_stddev: Option<f64>,
    time_step_ticks: Option<u64>,
    offset_step: Option<u64>,
    emit_waveforms: Option<bool>,
    waveform_samples: Option<usize>,
}

struct AbcdHooks {
    source: EmulatorSource,
    events_buf: Vec<u8>,
    waveforms_buf: Vec<u8>,
    events_published: u64,
}

impl AbcdHooks {
    fn new() -> Self {
        Self {
            source: EmulatorSource::new(EmulatorConfig::default())
                .expect("default emulator config is always valid"),
            events_buf: Vec::new(),
            waveforms_buf: Vec::new(),
            events_published: 0,
        }
    }

    fn frame(&mut self, triggers: &[RawTrigger]) {
        for t in triggers {
            let event = PsdEvent::new(t.timestamp, t.qshort, t.qlong, t.baseline, t.channel, 0);
            event.encode_into(&mut self.events_buf);
            if let Some(samples) = &t.samples {
                let waveform = WaveformEvent::new(t.timestamp, t.channel, samples.clone(), t.gates.clone());
                waveform.encode_into(&mut self.waveforms_buf);
            }
        }
    }
}

impl StageHooks for AbcdHooks {
    fn stage_name(&self) -> &'static str {
        "abcd"
    }

    fn read_config(&mut self, config: &Value) -> Result<(), StageError> {
        let parsed: AbcdDeviceConfig =
            serde_json::from_value(config.clone()).map_err(|e| StageError::Parse(e.to_string()))?;
        let defaults = EmulatorConfig::default();
        let emulator_config = EmulatorConfig {
            num_channels: parsed.num_channels.unwrap_or(defaults.num_channels),
            events_per_tick: parsed.events_per_tick.unwrap_or(defaults.events_per_tick),
            qshort_mean: parsed.qshort_mean.unwrap_or(defaults.qshort_mean),
            qshort_stddev: parsed.qshort_stddev.unwrap_or(defaults.qshort_stddev),
            qlong_mean: parsed.qlong_mean.unwrap_or(defaults.qlong_mean),
            qlong_stddev: parsed.qlong_stddev.unwrap_or(defaults.qlong_stddev),
            baseline_mean: parsed.baseline_mean.unwrap_or(defaults.baseline_mean),
            baseline_stddev: parsed.baseline_stddev.unwrap_or(defaults.baseline_stddev),
            time_step_ticks: parsed.time_step_ticks.unwrap_or(defaults.time_step_ticks),
            offset_step: parsed.offset_step.unwrap_or(defaults.offset_step),
            emit_waveforms: parsed.emit_waveforms.unwrap_or(defaults.emit_waveforms),
            waveform_samples: parsed.waveform_samples.unwrap_or(defaults.waveform_samples),
        };
        self.source =
            EmulatorSource::new(emulator_config).map_err(|e| StageError::Configure(e.to_string()))?;
        Ok(())
    }

    fn poll(&mut self, _data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        let mut triggers = Vec::new();
        let n = self
            .source
            .poll(&mut triggers)
            .map_err(|e| StageError::Acquisition(e.to_string()))?;
        if n == 0 {
            if self.source.is_exhausted() {
                return Ok(PollOutcome::Eof);
            }
            return Ok(PollOutcome::Idle);
        }
        self.frame(&triggers);
        Ok(PollOutcome::Produced(n))
    }

    fn pending_len(&self) -> usize {
        self.events_buf.len() / daqflow::wire::PSD_EVENT_SIZE
    }

    fn publish_pending(&mut self, data_pub: Option<&Socket>) -> Result<usize, StageError> {
        let mut published = 0;
        if let Some(socket) = data_pub {
            if !self.events_buf.is_empty() {
                let topic = format!("data_abcd_events_v0_s{}", self.events_buf.len());
                socket
                    .send(&topic, &self.events_buf)
                    .map_err(|e| StageError::Communication(e.to_string()))?;
                published += self.events_buf.len() / daqflow::wire::PSD_EVENT_SIZE;
            }
            if !self.waveforms_buf.is_empty() {
                let topic = format!("data_abcd_waveforms_v0_s{}", self.waveforms_buf.len());
                socket
                    .send(&topic, &self.waveforms_buf)
                    .map_err(|e| StageError::Communication(e.to_string()))?;
            }
        }
        self.events_published += published as u64;
        self.events_buf.clear();
        self.waveforms_buf.clear();
        Ok(published)
    }

    fn status_fields(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("events_published".to_string(), self.events_published.into());
        map
    }
}

fn main() -> anyhow::Result<()> {
    let args = StageArgs::try_parse_from(std::env::args())?;
    daqflow::bootstrap::init_tracing("abcd", args.verbosity());

    let file_config = StageFileConfig::load(&args.config_file).unwrap_or_default();
    let mut stage_config = file_config.into_stage_config("abcd");
    stage_config.status_bind.get_or_insert_with(|| "tcp://*:16180".to_string());
    stage_config.data_pub_bind.get_or_insert_with(|| "tcp://*:16181".to_string());
    stage_config.command_pull_bind.get_or_insert_with(|| "tcp://*:16182".to_string());
    if let Some(addr) = args.status_address {
        stage_config.status_bind = Some(addr);
    }
    if let Some(addr) = args.data_address {
        stage_config.data_pub_bind = Some(addr);
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
    let mut hooks = AbcdHooks::new();
    stage.run(&mut hooks);
    Ok(())
}
