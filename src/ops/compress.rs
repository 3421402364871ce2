//! Compressor/decompressor, grounded on `original_source/gzad/gzad.c`:
//! wraps a payload under a rewritten topic carrying the codec name and
//! compressed size, and reverses it on the way back out. `zlib` uses
//! `flate2`; `bz2` uses the `bzip2` crate, the standard ecosystem choice
//! for the algorithm the original tool also offers.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::wire::topic::{self, TopicError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Zlib,
    Bz2,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Zlib => "zlib",
            Algorithm::Bz2 => "bz2",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "zlib" => Some(Algorithm::Zlib),
            "bz2" => Some(Algorithm::Bz2),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("topic framing error: {0}")]
    Topic(#[from] TopicError),
    #[error("unrecognized compression algorithm in topic: {0}")]
    UnknownAlgorithm(String),
    #[error("decompressed output exceeded the configured buffer bound")]
    OutputOverflow,
}

fn compress_bytes(algo: Algorithm, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    match algo {
        Algorithm::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            encoder.finish()
        }
        Algorithm::Bz2 => {
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(payload)?;
            encoder.finish()
        }
    }
}

fn decompress_bytes(algo: Algorithm, payload: &[u8], max_output: usize) -> Result<Vec<u8>, CompressError> {
    let mut out = Vec::new();
    let read = match algo {
        Algorithm::Zlib => {
            let mut decoder = ZlibDecoder::new(payload).take(max_output as u64 + 1);
            decoder.read_to_end(&mut out)?
        }
        Algorithm::Bz2 => {
            let mut decoder = bzip2::read::BzDecoder::new(payload).take(max_output as u64 + 1);
            decoder.read_to_end(&mut out)?
        }
    };
    if read > max_output {
        return Err(CompressError::OutputOverflow);
    }
    Ok(out)
}

/// gzad: compresses `payload` and returns the rewritten topic plus the
/// compressed bytes. `inner_topic` is the topic without its `_s<size>`
/// suffix; the result is wrapped as
/// `compressed_<algo>_<original_topic_without_size>_s<compressed_size>`.
pub fn compress(algo: Algorithm, inner_topic: &str, payload: &[u8]) -> Result<(String, Vec<u8>), CompressError> {
    let bare_inner = topic::strip_size_suffix(inner_topic);
    let compressed = compress_bytes(algo, payload)?;
    let topic = format!("compressed_{}_{}_s{}", algo.name(), bare_inner, compressed.len());
    Ok((topic, compressed))
}

/// unzad: given a `compressed_<algo>_<inner>_s<n>` topic and its payload,
/// decompresses and restores the inner topic (with a fresh size suffix for
/// the now-larger payload).
pub fn decompress(topic: &str, payload: &[u8], max_output: usize) -> Result<(String, Vec<u8>), CompressError> {
    let rest = topic
        .strip_prefix("compressed_")
        .ok_or_else(|| CompressError::UnknownAlgorithm(topic.to_string()))?;
    let (algo_name, inner_with_size) = rest
        .split_once('_')
        .ok_or_else(|| CompressError::UnknownAlgorithm(topic.to_string()))?;
    let algo = Algorithm::parse(algo_name).ok_or_else(|| CompressError::UnknownAlgorithm(algo_name.to_string()))?;
    let inner_bare = topic::strip_size_suffix(inner_with_size);

    let decompressed = decompress_bytes(algo, payload, max_output)?;
    let restored_topic = topic::with_size_suffix(inner_bare, decompressed.len());
    Ok((restored_topic, decompressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_roundtrip_preserves_bytes_and_topic() {
        let payload: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
        let (topic, compressed) = compress(Algorithm::Zlib, "data_x_events_v0_s65536", &payload).unwrap();
        assert!(topic.starts_with("compressed_zlib_data_x_events_v0_s"));

        let (restored_topic, decompressed) = decompress(&topic, &compressed, payload.len() * 4).unwrap();
        assert_eq!(decompressed, payload);
        assert_eq!(restored_topic, "data_x_events_v0_s65536");
    }

    #[test]
    fn bz2_roundtrip() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let (topic, compressed) = compress(Algorithm::Bz2, "data_y_events_v0_s4400", &payload).unwrap();
        let (_restored_topic, decompressed) = decompress(&topic, &compressed, payload.len() * 4).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn oversized_output_is_rejected() {
        let payload = vec![7u8; 10_000];
        let (topic, compressed) = compress(Algorithm::Zlib, "data_z_events_v0_s10000", &payload).unwrap();
        let err = decompress(&topic, &compressed, 10).unwrap_err();
        assert!(matches!(err, CompressError::OutputOverflow));
    }
}
