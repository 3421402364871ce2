//! Replay sequencer, grounded on
//! `original_source/replay/replay_events.c` and
//! `original_source/replay/replay_raw.c`: republishes a recorded file at a
//! controlled rate. Timestamps inside payloads are never rewritten; only
//! the wall-clock pacing between chunks is synthetic.

use crate::filereader::{AdeReader, AdrReader, FileReaderError};

/// A source of `(topic, payload)` envelopes abstracting over the two file
/// formats replay can drive from.
pub enum ReplaySource {
    Ade(AdeReader),
    Adr(AdrReader),
}

impl ReplaySource {
    fn next(&mut self) -> Result<Option<(String, Vec<u8>)>, FileReaderError> {
        match self {
            ReplaySource::Ade(r) => r.next_chunk(),
            ReplaySource::Adr(r) => r.next_envelope(),
        }
    }
}

pub struct ReplayConfig {
    /// Leading packets suppressed entirely (not just delayed), mirroring
    /// `-s <pknum>` in both original tools.
    pub skip_packets: usize,
    /// Restarts the file from the beginning once exhausted (`-c`/`-d`).
    pub continuous: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            skip_packets: 0,
            continuous: false,
        }
    }
}

/// Drives one file through to completion (or forever, if `continuous`),
/// handing each accepted `(topic, payload)` envelope to `emit`. The caller
/// is responsible for sleeping the configured base period between calls
/// to `step` — replay itself performs no I/O beyond reading the file.
pub struct ReplaySequencer {
    config: ReplayConfig,
    packets_seen: usize,
    reopen: Box<dyn FnMut() -> Result<ReplaySource, FileReaderError>>,
    source: ReplaySource,
    finished: bool,
}

impl ReplaySequencer {
    pub fn new(
        config: ReplayConfig,
        mut reopen: Box<dyn FnMut() -> Result<ReplaySource, FileReaderError>>,
    ) -> Result<Self, FileReaderError> {
        let source = reopen()?;
        Ok(Self {
            config,
            packets_seen: 0,
            reopen,
            source,
            finished: false,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advances by one chunk/envelope. Returns `Some(envelope)` when a
    /// non-skipped record was produced, `None` when the step was a skip or
    /// (non-continuous) end of file was reached. Sets `finished` once a
    /// non-continuous file is exhausted.
    pub fn step(&mut self) -> Result<Option<(String, Vec<u8>)>, FileReaderError> {
        if self.finished {
            return Ok(None);
        }

        match self.source.next()? {
            Some(envelope) => {
                let index = self.packets_seen;
                self.packets_seen += 1;
                if index < self.config.skip_packets {
                    Ok(None)
                } else {
                    Ok(Some(envelope))
                }
            }
            None => {
                if self.config.continuous {
                    self.source = (self.reopen)()?;
                    self.packets_seen = 0;
                    Ok(None)
                } else {
                    self.finished = true;
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::psd::PSD_EVENT_SIZE;
    use std::io::Write;

    fn write_temp(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn skip_suppresses_leading_chunks_then_emits() {
        let path = write_temp("daqflow_test_replay_skip.ade", &[3u8; PSD_EVENT_SIZE * 4]);
        let path_for_reopen = path.clone();
        let mut seq = ReplaySequencer::new(
            ReplayConfig {
                skip_packets: 1,
                continuous: false,
            },
            Box::new(move || Ok(ReplaySource::Ade(AdeReader::open_psd_events(&path_for_reopen, 1).unwrap()))),
        )
        .unwrap();

        assert!(seq.step().unwrap().is_none()); // skipped
        assert!(seq.step().unwrap().is_some());
        assert!(seq.step().unwrap().is_some());
        assert!(seq.step().unwrap().is_some());
        assert!(seq.step().unwrap().is_none()); // eof
        assert!(seq.is_finished());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn continuous_mode_reopens_instead_of_finishing() {
        let path = write_temp("daqflow_test_replay_continuous.ade", &[5u8; PSD_EVENT_SIZE]);
        let path_for_reopen = path.clone();
        let mut seq = ReplaySequencer::new(
            ReplayConfig {
                skip_packets: 0,
                continuous: true,
            },
            Box::new(move || Ok(ReplaySource::Ade(AdeReader::open_psd_events(&path_for_reopen, 1).unwrap()))),
        )
        .unwrap();

        assert!(seq.step().unwrap().is_some());
        assert!(seq.step().unwrap().is_none()); // eof -> reopened
        assert!(!seq.is_finished());
        assert!(seq.step().unwrap().is_some()); // first record again

        std::fs::remove_file(&path).ok();
    }
}
