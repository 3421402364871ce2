//! Drives a handful of raw events through the same stage sequence a real
//! deployment chains on the wire: encode, coincidence-select, sort,
//! compress, decompress. Asserts the final payload decodes back to the
//! same coincidence groups the filter produced, byte for byte.

use daqflow::ops::cofi::{filter_events, CofiConfig};
use daqflow::ops::compress::{compress, decompress, Algorithm};
use daqflow::ops::sofi::sort_events;
use daqflow::wire::psd::{decode_events, encode_events, PsdEvent};

#[test]
fn encode_filter_sort_compress_round_trips() {
    let events = vec![
        PsdEvent::new(305, 1, 2, 3, 0, 0),
        PsdEvent::new(100, 1, 2, 3, 0, 0),
        PsdEvent::new(130, 1, 2, 3, 4, 0),
        PsdEvent::new(120, 1, 2, 3, 3, 0),
        PsdEvent::new(300, 1, 2, 3, 0, 0),
    ];
    let raw = encode_events(&events);

    let config = CofiConfig {
        reference_channels: vec![0],
        left_window: 50,
        right_window: 50,
        multiplicity: 1,
        keep_reference_without_matches: true,
        enable_anticoincidences: false,
        output_growth_multiplier: 2,
    };
    let (coincidence, _anti) = filter_events(&raw, &config).unwrap();

    let sorted = sort_events(&coincidence).unwrap();
    let sorted_events: Vec<PsdEvent> = decode_events(&sorted).unwrap().map(|v| v.to_owned()).collect();
    let timestamps: Vec<u64> = sorted_events.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![100, 120, 130, 300, 305]);

    let topic = format!("data_cofi_events_v0_s{}", sorted.len());
    let (compressed_topic, compressed) = compress(Algorithm::Zlib, &topic, &sorted).unwrap();
    let (restored_topic, decompressed) = decompress(&compressed_topic, &compressed, sorted.len() * 4).unwrap();

    assert_eq!(decompressed, sorted);
    assert_eq!(restored_topic, topic);

    let final_events: Vec<PsdEvent> = decode_events(&decompressed).unwrap().map(|v| v.to_owned()).collect();
    assert_eq!(final_events, sorted_events);
}
