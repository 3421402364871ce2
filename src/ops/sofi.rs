//! Temporal sorter, grounded on `original_source/filters/sofi.c`:
//! decode, stable-sort by timestamp, re-emit in one message. Output size
//! equals input size exactly — every input record reappears once.

use crate::wire::psd::{decode_events, PsdEvent, PSD_EVENT_SIZE};
use crate::wire::waveform::{decode_waveforms, WaveformEvent};
use crate::wire::DecodeResult;

pub fn sort_events(bytes: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut events: Vec<PsdEvent> = decode_events(bytes)?.map(|v| v.to_owned()).collect();
    events.sort_by_key(|e| e.timestamp);
    let mut out = Vec::with_capacity(events.len() * PSD_EVENT_SIZE);
    for event in &events {
        event.encode_into(&mut out);
    }
    Ok(out)
}

pub fn sort_waveforms(bytes: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut waveforms: Vec<WaveformEvent> = decode_waveforms(bytes)?.map(|v| v.to_owned()).collect();
    waveforms.sort_by_key(|w| w.timestamp);
    let mut out = Vec::with_capacity(bytes.len());
    for waveform in &waveforms {
        waveform.encode_into(&mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::psd::encode_events;

    #[test]
    fn sorts_and_preserves_stable_order_for_ties() {
        // input timestamps [50, 10, 10, 40]; the two 10s keep input order.
        let events = [
            PsdEvent::new(50, 0, 0, 0, 1, 0),
            PsdEvent::new(10, 0, 0, 0, 2, 0),
            PsdEvent::new(10, 0, 0, 0, 3, 0),
            PsdEvent::new(40, 0, 0, 0, 4, 0),
        ];
        let bytes = encode_events(&events);
        let sorted = sort_events(&bytes).unwrap();
        let decoded: Vec<PsdEvent> = decode_events(&sorted).unwrap().map(|v| v.to_owned()).collect();

        assert_eq!(
            decoded.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![10, 10, 40, 50]
        );
        assert_eq!(decoded[0].channel, 2);
        assert_eq!(decoded[1].channel, 3);
    }

    #[test]
    fn output_size_matches_input() {
        let events = [PsdEvent::new(5, 0, 0, 0, 0, 0), PsdEvent::new(1, 0, 0, 0, 0, 0)];
        let bytes = encode_events(&events);
        let sorted = sort_events(&bytes).unwrap();
        assert_eq!(sorted.len(), bytes.len());
    }
}
