//! Topic envelope: the ASCII prefix (up to a single space) that precedes
//! every binary or JSON payload on the wire.
//!
//! Grammar: `<kind>_<producer>_<version>[_n<seq>][_s<size>]`. Receivers
//! must treat the topic as opaque beyond prefix-matching on
//! `<kind>_<producer>`; only the `_s<size>` suffix, when present, is a
//! contract that must equal the payload's byte length.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("envelope contains no space separator between topic and payload")]
    MissingSeparator,
    #[error("topic declares size {declared} but payload is {actual} bytes")]
    SizeMismatch { declared: usize, actual: usize },
}

/// Splits a received envelope into its topic string and payload slice.
/// The separator is the first ASCII space; everything after it is payload,
/// including embedded spaces.
pub fn split_envelope(envelope: &[u8]) -> Result<(&str, &[u8]), TopicError> {
    let space = envelope
        .iter()
        .position(|&b| b == b' ')
        .ok_or(TopicError::MissingSeparator)?;
    let topic =
        std::str::from_utf8(&envelope[..space]).map_err(|_| TopicError::MissingSeparator)?;
    Ok((topic, &envelope[space + 1..]))
}

/// Builds a complete on-wire envelope: topic, one space, payload. The send
/// is always atomic — the caller gets back one contiguous buffer.
pub fn build_envelope(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(topic.len() + 1 + payload.len());
    out.extend_from_slice(topic.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out
}

/// Returns the `<kind>_<producer>` prefix used for subscription matching.
/// Falls back to the whole topic if it has fewer than two `_`-delimited
/// segments.
pub fn kind_producer_prefix(topic: &str) -> &str {
    let mut parts = topic.splitn(3, '_');
    let kind = parts.next();
    let producer = parts.next();
    match (kind, producer) {
        (Some(k), Some(p)) => &topic[..k.len() + 1 + p.len()],
        _ => topic,
    }
}

/// Extracts the declared payload size from a trailing `_s<N>` token, if any.
pub fn parse_size_suffix(topic: &str) -> Option<usize> {
    topic
        .rsplit('_')
        .find(|seg| seg.starts_with('s') && seg.len() > 1 && seg[1..].bytes().all(|b| b.is_ascii_digit()))
        .and_then(|seg| seg[1..].parse().ok())
}

/// Extracts the declared sequence number from a trailing `_n<seq>` token,
/// if any. A `_s<size>` suffix may follow it.
pub fn parse_seq_suffix(topic: &str) -> Option<u64> {
    for seg in topic.split('_') {
        if seg.starts_with('n') && seg.len() > 1 && seg[1..].bytes().all(|b| b.is_ascii_digit()) {
            return seg[1..].parse().ok();
        }
    }
    None
}

/// Removes a trailing `_s<N>` token from a topic, leaving any `_n<seq>`
/// token untouched. Used by gzad/unzad when rebuilding a topic around a
/// different payload size.
pub fn strip_size_suffix(topic: &str) -> &str {
    match topic.rfind("_s") {
        Some(idx) if topic[idx + 2..].bytes().all(|b| b.is_ascii_digit()) && topic.len() > idx + 2 => {
            &topic[..idx]
        }
        _ => topic,
    }
}

/// Appends a `_s<size>` token to a topic that has already had its old one
/// stripped (or never had one).
pub fn with_size_suffix(topic_without_size: &str, size: usize) -> String {
    format!("{topic_without_size}_s{size}")
}

/// Validates that a topic's declared `_s<size>`, if present, matches the
/// actual payload length (used when receiving, per I1/I2's byte-exactness).
pub fn validate_size_suffix(topic: &str, payload_len: usize) -> Result<(), TopicError> {
    if let Some(declared) = parse_size_suffix(topic) {
        if declared != payload_len {
            return Err(TopicError::SizeMismatch {
                declared,
                actual: payload_len,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let envelope = build_envelope("data_x_events_v0_s32", &[1, 2, 3, 4]);
        let (topic, payload) = split_envelope(&envelope).unwrap();
        assert_eq!(topic, "data_x_events_v0_s32");
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn kind_producer_prefix_matches_spec_grammar() {
        assert_eq!(kind_producer_prefix("data_abcd_events_v0_s32"), "data_abcd");
        assert_eq!(kind_producer_prefix("status_abcd"), "status_abcd");
    }

    #[test]
    fn size_suffix_parses_and_validates() {
        assert_eq!(parse_size_suffix("data_x_events_v0_s32"), Some(32));
        assert_eq!(parse_size_suffix("status_abcd"), None);
        assert!(validate_size_suffix("data_x_events_v0_s32", 32).is_ok());
        assert!(validate_size_suffix("data_x_events_v0_s32", 31).is_err());
    }

    #[test]
    fn seq_suffix_parses_when_present() {
        assert_eq!(parse_seq_suffix("data_x_events_v0_n7_s32"), Some(7));
        assert_eq!(parse_seq_suffix("data_x_events_v0_s32"), None);
    }

    #[test]
    fn strip_and_rebuild_size_suffix_for_compression() {
        let original = "data_abcd_events_v0_s1024";
        let without_size = strip_size_suffix(original);
        assert_eq!(without_size, "data_abcd_events_v0");
        let compressed_topic = format!(
            "compressed_zlib_{}",
            with_size_suffix(without_size, 512)
        );
        assert_eq!(compressed_topic, "compressed_zlib_data_abcd_events_v0_s512");
    }

    #[test]
    fn missing_separator_is_rejected() {
        let err = split_envelope(b"no_space_here").unwrap_err();
        assert_eq!(err, TopicError::MissingSeparator);
    }
}
