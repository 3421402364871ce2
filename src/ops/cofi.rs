//! Coincidence filter, grounded on
//! `original_source/filters/cofi.c`: for each reference-channel event,
//! windows outward in both directions over the timestamp-sorted buffer and
//! groups any non-reference events found within `[ts-L, ts+W)`.

use std::collections::HashSet;

use crate::wire::psd::{decode_events, PsdEvent, PSD_EVENT_SIZE};
use crate::wire::DecodeResult;

#[derive(Debug, Clone)]
pub struct CofiConfig {
    pub reference_channels: Vec<u8>,
    /// Left edge of the coincidence window, ticks, subtracted from the
    /// reference timestamp (`cofi.c`'s `-l`).
    pub left_window: i64,
    /// Right edge of the coincidence window, ticks, added to the reference
    /// timestamp (`cofi.c`'s `-r`).
    pub right_window: i64,
    pub multiplicity: usize,
    pub keep_reference_without_matches: bool,
    pub enable_anticoincidences: bool,
    /// Output buffer cap as a multiple of the input size; excess records
    /// are silently dropped once the cap is reached.
    pub output_growth_multiplier: usize,
}

impl Default for CofiConfig {
    fn default() -> Self {
        Self {
            reference_channels: Vec::new(),
            left_window: 0,
            right_window: 0,
            multiplicity: 1,
            keep_reference_without_matches: false,
            enable_anticoincidences: false,
            output_growth_multiplier: 2,
        }
    }
}

/// Runs the filter over a `data_<producer>_events_v0` buffer, returning
/// `(coincidence_bytes, anticoincidence_bytes)`. The anticoincidence buffer
/// is empty unless `enable_anticoincidences` is set.
pub fn filter_events(bytes: &[u8], config: &CofiConfig) -> DecodeResult<(Vec<u8>, Vec<u8>)> {
    let events: Vec<PsdEvent> = decode_events(bytes)?.map(|v| v.to_owned()).collect();
    let is_ref = |ch: u8| config.reference_channels.contains(&ch);

    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by(|&a, &b| {
        events[a]
            .timestamp
            .cmp(&events[b].timestamp)
            .then(a.cmp(&b))
    });
    let mut pos_of = vec![0usize; events.len()];
    for (pos, &orig) in order.iter().enumerate() {
        pos_of[orig] = pos;
    }

    let mut selected: HashSet<usize> = HashSet::new();
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();

    for &orig in &order {
        if !is_ref(events[orig].channel) {
            continue;
        }
        let pos = pos_of[orig];
        let ts = events[orig].timestamp as i128;
        let left_bound = ts - config.left_window as i128;
        let right_bound = ts + config.right_window as i128;

        let mut backward = Vec::new();
        let mut p = pos;
        while p > 0 {
            p -= 1;
            let candidate = order[p];
            if (events[candidate].timestamp as i128) <= left_bound {
                break;
            }
            if !is_ref(events[candidate].channel) {
                backward.push(candidate);
            }
        }
        backward.reverse();

        let mut forward = Vec::new();
        let mut p = pos;
        loop {
            p += 1;
            if p >= order.len() {
                break;
            }
            let candidate = order[p];
            if (events[candidate].timestamp as i128) >= right_bound {
                break;
            }
            if !is_ref(events[candidate].channel) {
                forward.push(candidate);
            }
        }

        let mut members = backward;
        members.extend(forward);

        if members.len() >= config.multiplicity {
            selected.insert(orig);
            selected.extend(members.iter().copied());
            groups.push((orig, members));
        } else if config.keep_reference_without_matches {
            selected.insert(orig);
            groups.push((orig, Vec::new()));
        }
    }

    let max_output = bytes.len().saturating_mul(config.output_growth_multiplier.max(1));
    let mut coincidence = Vec::new();
    for (ref_idx, members) in &groups {
        if coincidence.len() + PSD_EVENT_SIZE > max_output {
            break;
        }
        let mut reference = events[*ref_idx].clone();
        reference.set_group_counter_saturating(members.len());
        reference.encode_into(&mut coincidence);
        for &member in members {
            if coincidence.len() + PSD_EVENT_SIZE > max_output {
                break;
            }
            events[member].encode_into(&mut coincidence);
        }
    }

    let mut anti = Vec::new();
    if config.enable_anticoincidences {
        for (i, event) in events.iter().enumerate() {
            if !selected.contains(&i) {
                event.encode_into(&mut anti);
            }
        }
    }

    Ok((coincidence, anti))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::psd::encode_events;

    fn event(ts: u64, ch: u8) -> PsdEvent {
        PsdEvent::new(ts, 1, 2, 3, ch, 0)
    }

    #[test]
    fn reference_gathers_members_in_window() {
        let events = vec![
            event(100, 0),
            event(120, 3),
            event(130, 4),
            event(300, 0),
            event(305, 0),
        ];
        let bytes = encode_events(&events);
        let config = CofiConfig {
            reference_channels: vec![0],
            left_window: 50,
            right_window: 50,
            multiplicity: 1,
            keep_reference_without_matches: true,
            enable_anticoincidences: false,
            output_growth_multiplier: 2,
        };
        let (coincidence, _anti) = filter_events(&bytes, &config).unwrap();
        let decoded: Vec<_> = decode_events(&coincidence).unwrap().map(|v| v.to_owned()).collect();

        assert_eq!(decoded[0].timestamp, 100);
        assert_eq!(decoded[0].group_counter, 2);
        assert_eq!(decoded[1].timestamp, 120);
        assert_eq!(decoded[2].timestamp, 130);

        assert_eq!(decoded[3].timestamp, 300);
        assert_eq!(decoded[3].group_counter, 0);
        assert_eq!(decoded[4].timestamp, 305);
        assert_eq!(decoded[4].group_counter, 0);
    }

    #[test]
    fn without_keep_flag_unmatched_references_are_suppressed() {
        let events = vec![event(100, 0), event(120, 3), event(130, 4), event(300, 0)];
        let bytes = encode_events(&events);
        let config = CofiConfig {
            reference_channels: vec![0],
            left_window: 50,
            right_window: 50,
            multiplicity: 1,
            keep_reference_without_matches: false,
            enable_anticoincidences: true,
            output_growth_multiplier: 2,
        };
        let (coincidence, anti) = filter_events(&bytes, &config).unwrap();
        let decoded: Vec<_> = decode_events(&coincidence).unwrap().map(|v| v.to_owned()).collect();
        assert_eq!(decoded.len(), 3); // ref(100,0) + 2 members, (300,0) suppressed

        let anti_decoded: Vec<_> = decode_events(&anti).unwrap().map(|v| v.to_owned()).collect();
        assert_eq!(anti_decoded.len(), 1);
        assert_eq!(anti_decoded[0].timestamp, 300);
    }
}
