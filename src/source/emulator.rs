//! Random pulse generator, reworked from a fixed-interval batch emitter
//! into an `AcquisitionSource` that the generic stage runtime polls once
//! per tick instead of driving its own timer task.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::{AcquisitionSource, RawTrigger, WrapTracker};

#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub num_channels: u8,
    pub events_per_tick: usize,
    pub qshort_mean: f64,
    pub qshort_stddev: f64,
    pub qlong_mean: f64,
    pub qlong_stddev: f64,
    pub baseline_mean: f64,
    pub baseline_stddev: f64,
    pub time_step_ticks: u64,
    pub offset_step: u64,
    pub emit_waveforms: bool,
    pub waveform_samples: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            num_channels: 16,
            events_per_tick: 10,
            qshort_mean: 500.0,
            qshort_stddev: 50.0,
            qlong_mean: 2000.0,
            qlong_stddev: 150.0,
            baseline_mean: 8192.0,
            baseline_stddev: 5.0,
            time_step_ticks: 1000,
            offset_step: 0,
            emit_waveforms: false,
            waveform_samples: 64,
        }
    }
}

/// Generates synthetic PSD (and optionally waveform) triggers with
/// Gaussian-distributed charge integrals, standing in for a real digitizer.
pub struct EmulatorSource {
    config: EmulatorConfig,
    rng: StdRng,
    qshort: Normal<f64>,
    qlong: Normal<f64>,
    baseline: Normal<f64>,
    raw_counter: u64,
    wrap: WrapTracker,
}

impl EmulatorSource {
    /// Fails if any configured standard deviation is negative — a value
    /// that can arrive straight from a remote `reconfigure` command and
    /// must not be allowed to panic the stage.
    pub fn new(config: EmulatorConfig) -> Result<Self, rand_distr::NormalError> {
        let qshort = Normal::new(config.qshort_mean, config.qshort_stddev)?;
        let qlong = Normal::new(config.qlong_mean, config.qlong_stddev)?;
        let baseline = Normal::new(config.baseline_mean, config.baseline_stddev)?;
        let wrap = WrapTracker::new(config.offset_step);
        Ok(Self {
            config,
            rng: StdRng::from_entropy(),
            qshort,
            qlong,
            baseline,
            raw_counter: 0,
            wrap,
        })
    }

    fn next_trigger(&mut self, channel: u8) -> RawTrigger {
        self.raw_counter += self.config.time_step_ticks;
        let raw = if self.config.offset_step != 0 {
            self.raw_counter % self.config.offset_step
        } else {
            self.raw_counter
        };
        let timestamp = self.wrap.advance(raw);

        let qshort = self.qshort.sample(&mut self.rng).max(0.0) as u16;
        let qlong = self.qlong.sample(&mut self.rng).max(0.0) as u16;
        let baseline = self.baseline.sample(&mut self.rng).max(0.0) as u16;

        let samples = if self.config.emit_waveforms {
            Some(self.synthesize_waveform(baseline, qshort))
        } else {
            None
        };

        RawTrigger {
            channel,
            timestamp,
            qshort,
            qlong,
            baseline,
            samples,
            gates: Vec::new(),
        }
    }

    fn synthesize_waveform(&mut self, baseline: u16, amplitude: u16) -> Vec<u16> {
        let n = self.config.waveform_samples;
        let peak = n / 4;
        (0..n)
            .map(|i| {
                let noise: i32 = self.rng.gen_range(-3..=3);
                let envelope = if i < peak {
                    0.0
                } else {
                    let decay = (i - peak) as f64 / (n as f64 / 4.0);
                    (-decay).exp()
                };
                let value = baseline as i32 + (amplitude as f64 * envelope) as i32 + noise;
                value.clamp(0, u16::MAX as i32) as u16
            })
            .collect()
    }
}

impl AcquisitionSource for EmulatorSource {
    fn poll(&mut self, out: &mut Vec<RawTrigger>) -> std::io::Result<usize> {
        let n = self.config.events_per_tick;
        let channels = self.config.num_channels.max(1);
        for i in 0..n {
            let channel = (i % channels as usize) as u8;
            out.push(self.next_trigger(channel));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_requested_count_per_poll() {
        let mut source = EmulatorSource::new(EmulatorConfig {
            events_per_tick: 7,
            ..Default::default()
        })
        .unwrap();
        let mut out = Vec::new();
        let n = source.poll(&mut out).unwrap();
        assert_eq!(n, 7);
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn timestamps_are_monotonic_per_poll_sequence() {
        let mut source = EmulatorSource::new(EmulatorConfig {
            num_channels: 1,
            events_per_tick: 1,
            ..Default::default()
        })
        .unwrap();
        let mut last = 0u64;
        for _ in 0..20 {
            let mut out = Vec::new();
            source.poll(&mut out).unwrap();
            assert!(out[0].timestamp > last);
            last = out[0].timestamp;
        }
    }

    #[test]
    fn waveform_emission_matches_configured_length() {
        let mut source = EmulatorSource::new(EmulatorConfig {
            emit_waveforms: true,
            waveform_samples: 32,
            events_per_tick: 1,
            ..Default::default()
        })
        .unwrap();
        let mut out = Vec::new();
        source.poll(&mut out).unwrap();
        assert_eq!(out[0].samples.as_ref().unwrap().len(), 32);
    }
}
