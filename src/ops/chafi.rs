//! Channel filter, grounded on `original_source/chafi/chafi.c`:
//! copies events whose channel is in the configured set to the output
//! buffer, preserving original order.

use std::collections::HashSet;

use crate::wire::psd::decode_events;
use crate::wire::waveform::decode_waveforms;
use crate::wire::DecodeResult;

pub fn filter_events(bytes: &[u8], channels: &HashSet<u8>) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::new();
    for view in decode_events(bytes)? {
        if channels.contains(&view.channel()) {
            out.extend_from_slice(view.raw());
        }
    }
    Ok(out)
}

/// Waveform path decodes the length-prefixed layout and copies each
/// accepted waveform verbatim, rewriting nothing but the concatenation
/// offset (the record bytes themselves are untouched).
pub fn filter_waveforms(bytes: &[u8], channels: &HashSet<u8>) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::new();
    for view in decode_waveforms(bytes)? {
        if channels.contains(&view.channel()) {
            out.extend_from_slice(view.raw());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::psd::{encode_events, PsdEvent};
    use crate::wire::waveform::WaveformEvent;

    #[test]
    fn keeps_only_selected_channels_in_order() {
        let events = [
            PsdEvent::new(1, 0, 0, 0, 0, 0),
            PsdEvent::new(2, 0, 0, 0, 1, 0),
            PsdEvent::new(3, 0, 0, 0, 2, 0),
            PsdEvent::new(4, 0, 0, 0, 1, 0),
        ];
        let bytes = encode_events(&events);
        let channels: HashSet<u8> = [1].into_iter().collect();
        let filtered = filter_events(&bytes, &channels).unwrap();
        let decoded: Vec<_> = decode_events(&filtered).unwrap().map(|v| v.to_owned()).collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].timestamp, 2);
        assert_eq!(decoded[1].timestamp, 4);
    }

    #[test]
    fn waveform_filter_preserves_accepted_records_verbatim() {
        let e1 = WaveformEvent::new(1, 0, vec![1, 2], vec![]);
        let e2 = WaveformEvent::new(2, 5, vec![3, 4, 5], vec![]);
        let mut bytes = e1.encode();
        bytes.extend(e2.encode());

        let channels: HashSet<u8> = [5].into_iter().collect();
        let filtered = filter_waveforms(&bytes, &channels).unwrap();
        assert_eq!(filtered, e2.encode());
    }
}
