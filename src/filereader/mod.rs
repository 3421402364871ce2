//! File readers for the two on-disk formats, grounded on
//! `original_source/replay/replay_raw.c` (envelope framing) and
//! `original_source/replay/replay_events.c` (fixed-record framing).
//!
//! `.ade`/`.adw` files are raw concatenated records with no framing of
//! their own — a chunked reader fabricates a topic around whatever slice
//! it reads. `.adr` files are streams of `<topic> <payload>` envelopes,
//! exactly as they travel on the wire, and are read back one envelope at
//! a time.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use thiserror::Error;

use crate::wire::psd::PSD_EVENT_SIZE;
use crate::wire::topic::{self, TopicError};

#[derive(Error, Debug)]
pub enum FileReaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("envelope framing error: {0}")]
    Topic(#[from] TopicError),
    #[error("chunk size must be a multiple of the record size ({record_size})")]
    UnalignedChunkSize { record_size: usize },
}

/// Reads `.ade`/`.adw` files in caller-sized chunks, a multiple of the
/// fixed record size (16 bytes for PSD events), fabricating a
/// `data_abcd_events_v0_s<n>` topic for each chunk actually read.
pub struct AdeReader {
    file: BufReader<File>,
    chunk_bytes: usize,
    topic_prefix: String,
}

impl AdeReader {
    /// `records_per_chunk` mirrors replay_events.c's `buffer_size` in units
    /// of whole records; `record_size` is 16 for PSD events and the
    /// variable waveform record size is not supported by this reader (use
    /// `AdrReader` for those streams).
    pub fn open(
        path: impl AsRef<Path>,
        topic_prefix: &str,
        records_per_chunk: usize,
        record_size: usize,
    ) -> Result<Self, FileReaderError> {
        let file = BufReader::new(File::open(path)?);
        Ok(Self {
            file,
            chunk_bytes: records_per_chunk * record_size,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    pub fn open_psd_events(
        path: impl AsRef<Path>,
        records_per_chunk: usize,
    ) -> Result<Self, FileReaderError> {
        Self::open(path, "data_abcd_events_v0", records_per_chunk, PSD_EVENT_SIZE)
    }

    /// Reads the next chunk. Returns `None` at end of file — EOF is not an
    /// error. A short final chunk is returned topic-labeled with its
    /// actual size, per the original tool's behavior.
    pub fn next_chunk(&mut self) -> Result<Option<(String, Vec<u8>)>, FileReaderError> {
        let mut buf = vec![0u8; self.chunk_bytes];
        let mut total = 0;
        loop {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    if total == buf.len() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if total == 0 {
            return Ok(None);
        }
        buf.truncate(total);
        let topic = topic::with_size_suffix(&self.topic_prefix, buf.len());
        Ok(Some((topic, buf)))
    }
}

/// Reads `.adr` envelope-stream files: `<topic> <payload bytes>` repeated
/// with no separator between records beyond what the topic's `_s<size>`
/// suffix implies, matching the wire framing byte for byte.
pub struct AdrReader {
    file: BufReader<File>,
}

impl AdrReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FileReaderError> {
        Ok(Self {
            file: BufReader::new(File::open(path)?),
        })
    }

    /// Reads one `(topic, payload)` envelope. Returns `None` at EOF.
    pub fn next_envelope(&mut self) -> Result<Option<(String, Vec<u8>)>, FileReaderError> {
        let mut topic_bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.file.read(&mut byte) {
                Ok(0) => {
                    if topic_bytes.is_empty() {
                        return Ok(None);
                    }
                    return Err(FileReaderError::Topic(TopicError::MissingSeparator));
                }
                Ok(_) => {
                    if byte[0] == b' ' {
                        break;
                    }
                    topic_bytes.push(byte[0]);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let topic_str = String::from_utf8(topic_bytes).map_err(|_| TopicError::MissingSeparator)?;
        let size = topic::parse_size_suffix(&topic_str).unwrap_or(0);
        let mut payload = vec![0u8; size];
        self.file.read_exact(&mut payload)?;
        Ok(Some((topic_str, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn ade_reader_chunks_records_and_labels_final_short_chunk() {
        let path = write_temp("daqflow_test_ade_reader.ade", &[7u8; PSD_EVENT_SIZE * 5]);
        let mut reader = AdeReader::open_psd_events(&path, 3).unwrap();

        let (topic1, chunk1) = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk1.len(), PSD_EVENT_SIZE * 3);
        assert_eq!(topic1, format!("data_abcd_events_v0_s{}", PSD_EVENT_SIZE * 3));

        let (topic2, chunk2) = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk2.len(), PSD_EVENT_SIZE * 2);
        assert_eq!(topic2, format!("data_abcd_events_v0_s{}", PSD_EVENT_SIZE * 2));

        assert!(reader.next_chunk().unwrap().is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn adr_reader_yields_successive_envelopes() {
        let mut bytes = topic::build_envelope("status_abcd_s3", b"abc");
        bytes.extend(topic::build_envelope("data_abcd_events_v0_s2", &[9, 9]));
        let path = write_temp("daqflow_test_adr_reader.adr", &bytes);

        let mut reader = AdrReader::open(&path).unwrap();
        let (t1, p1) = reader.next_envelope().unwrap().unwrap();
        assert_eq!(t1, "status_abcd_s3");
        assert_eq!(p1, b"abc");

        let (t2, p2) = reader.next_envelope().unwrap().unwrap();
        assert_eq!(t2, "data_abcd_events_v0_s2");
        assert_eq!(p2, vec![9, 9]);

        assert!(reader.next_envelope().unwrap().is_none());
        std::fs::remove_file(&path).ok();
    }
}
