//! Waveform analyzer host, grounded on `original_source/waan/waan.cpp`
//! for the host shape (per-channel pluggable analysis, dual output streams)
//! and on the PSD record's own field contract (qshort/qlong/baseline) for
//! the bundled charge-integration analyzer, since the original tool loads
//! its analysis function as a runtime plugin rather than shipping one in
//! the host binary.

use crate::wire::psd::PsdEvent;
use crate::wire::waveform::{decode_waveforms, WaveformEventView};
use crate::wire::DecodeResult;

#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub baseline_samples: usize,
    pub short_gate_start: usize,
    pub short_gate_len: usize,
    pub long_gate_start: usize,
    pub long_gate_len: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            baseline_samples: 8,
            short_gate_start: 0,
            short_gate_len: 16,
            long_gate_start: 0,
            long_gate_len: 64,
        }
    }
}

/// The host's analysis contract: `analyze(samples, gates, config) -> PSD
/// event or none`. `None` drops the waveform (e.g. failed pulse-shape
/// discrimination).
pub trait ChannelAnalyzer {
    fn analyze(&mut self, view: &WaveformEventView<'_>, config: &ChannelConfig) -> Option<PsdEvent>;
}

/// Baseline-subtracted charge integration over two configurable gates —
/// the simplest analyzer satisfying the PSD record's field contract.
pub struct ChargeIntegrationAnalyzer;

impl ChannelAnalyzer for ChargeIntegrationAnalyzer {
    fn analyze(&mut self, view: &WaveformEventView<'_>, config: &ChannelConfig) -> Option<PsdEvent> {
        let n = view.samples_number() as usize;
        if n == 0 {
            return None;
        }
        let baseline_count = config.baseline_samples.min(n).max(1);
        let baseline_sum: u32 = (0..baseline_count).map(|i| view.sample(i) as u32).sum();
        let baseline = (baseline_sum / baseline_count as u32) as u16;

        let integrate = |start: usize, len: usize| -> u32 {
            let end = (start + len).min(n);
            if start >= end {
                return 0;
            }
            (start..end)
                .map(|i| (view.sample(i) as i64 - baseline as i64).max(0) as u32)
                .sum()
        };

        let qshort = integrate(config.short_gate_start, config.short_gate_len).min(u16::MAX as u32) as u16;
        let qlong = integrate(config.long_gate_start, config.long_gate_len).min(u16::MAX as u32) as u16;

        Some(PsdEvent::new(
            view.timestamp(),
            qshort,
            qlong,
            baseline,
            view.channel(),
            0,
        ))
    }
}

pub struct AnalyzerHost<A: ChannelAnalyzer> {
    analyzer: A,
    default_config: ChannelConfig,
    per_channel: std::collections::HashMap<u8, ChannelConfig>,
    /// Pass the source waveform through to the secondary output stream
    /// even when an analysis succeeds.
    pub passthrough_waveforms: bool,
}

impl<A: ChannelAnalyzer> AnalyzerHost<A> {
    pub fn new(analyzer: A) -> Self {
        Self {
            analyzer,
            default_config: ChannelConfig::default(),
            per_channel: std::collections::HashMap::new(),
            passthrough_waveforms: false,
        }
    }

    pub fn set_channel_config(&mut self, channel: u8, config: ChannelConfig) {
        self.per_channel.insert(channel, config);
    }

    fn config_for(&self, channel: u8) -> &ChannelConfig {
        self.per_channel.get(&channel).unwrap_or(&self.default_config)
    }

    /// Processes a decoded waveform buffer, returning `(psd_events_bytes,
    /// waveforms_bytes)`. The waveform stream carries only those waveforms
    /// that either produced no PSD event or were explicitly marked for
    /// passthrough.
    pub fn process(&mut self, bytes: &[u8]) -> DecodeResult<(Vec<u8>, Vec<u8>)> {
        let mut events = Vec::new();
        let mut waveforms = Vec::new();

        for view in decode_waveforms(bytes)? {
            let config = *self.config_for(view.channel());
            match self.analyzer.analyze(&view, &config) {
                Some(event) => {
                    event.encode_into(&mut events);
                    if self.passthrough_waveforms {
                        waveforms.extend_from_slice(view.raw());
                    }
                }
                None => waveforms.extend_from_slice(view.raw()),
            }
        }

        Ok((events, waveforms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::psd::decode_events;
    use crate::wire::waveform::WaveformEvent;

    #[test]
    fn integrates_gates_above_baseline() {
        let samples = vec![10u16, 10, 10, 10, 50, 60, 50, 10, 10, 10];
        let waveform = WaveformEvent::new(1000, 2, samples, vec![]);
        let bytes = waveform.encode();

        let mut host = AnalyzerHost::new(ChargeIntegrationAnalyzer);
        host.set_channel_config(
            2,
            ChannelConfig {
                baseline_samples: 4,
                short_gate_start: 4,
                short_gate_len: 3,
                long_gate_start: 0,
                long_gate_len: 10,
            },
        );

        let (events, waveforms) = host.process(&bytes).unwrap();
        assert!(waveforms.is_empty());

        let decoded: Vec<_> = decode_events(&events).unwrap().map(|v| v.to_owned()).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].timestamp, 1000);
        assert_eq!(decoded[0].channel, 2);
        assert_eq!(decoded[0].baseline, 10);
        assert_eq!(decoded[0].qshort, (50 - 10) + (60 - 10) + (50 - 10));
    }

    #[test]
    fn empty_waveform_is_dropped_and_passed_through() {
        let waveform = WaveformEvent::new(1, 0, vec![], vec![]);
        let bytes = waveform.encode();

        let mut host = AnalyzerHost::new(ChargeIntegrationAnalyzer);
        let (events, waveforms) = host.process(&bytes).unwrap();
        assert!(events.is_empty());
        assert_eq!(waveforms, bytes);
    }

    #[test]
    fn passthrough_flag_duplicates_analyzed_waveforms() {
        let samples = vec![0u16, 0, 100, 0, 0];
        let waveform = WaveformEvent::new(5, 1, samples, vec![]);
        let bytes = waveform.encode();

        let mut host = AnalyzerHost::new(ChargeIntegrationAnalyzer);
        host.passthrough_waveforms = true;
        let (events, waveforms) = host.process(&bytes).unwrap();
        assert_eq!(events.len(), crate::wire::psd::PSD_EVENT_SIZE);
        assert_eq!(waveforms, bytes);
    }
}
