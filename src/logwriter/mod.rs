//! Append-only log writer, grounded on
//! `original_source/include/files_functions.h`'s framing conventions (raw
//! concatenated records for `.ade`/`.adw`, full envelopes for `.adr`) and
//! on an open/write/flush/close lifecycle shape adapted from
//! length-prefixed MsgPack batch framing to the wire contract's raw byte
//! framing.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::wire::topic;

#[derive(Error, Debug)]
pub enum LogWriterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no file currently open")]
    NotOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `.ade` — concatenated PSD event records, no framing.
    Events,
    /// `.adw` — concatenated waveform event records, no framing.
    Waveforms,
    /// `.adr` — full envelope stream (topic + space + payload).
    Raw,
}

impl StreamKind {
    fn extension(self) -> &'static str {
        match self {
            StreamKind::Events => "ade",
            StreamKind::Waveforms => "adw",
            StreamKind::Raw => "adr",
        }
    }
}

/// One append-only output stream with a running byte counter reported via
/// status. Flushing happens on an explicit command or every status
/// publication — never implicitly on every write, to avoid a syscall per
/// event.
pub struct LogFile {
    kind: StreamKind,
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl LogFile {
    pub fn create(base_name: &str, kind: StreamKind) -> Result<Self, LogWriterError> {
        let path = PathBuf::from(format!("{base_name}.{}", kind.extension()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            kind,
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Appends a raw record (`.ade`/`.adw`) verbatim, no framing added.
    pub fn write_record(&mut self, bytes: &[u8]) -> Result<(), LogWriterError> {
        debug_assert!(matches!(self.kind, StreamKind::Events | StreamKind::Waveforms));
        self.writer.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Appends a full `<topic> <payload>` envelope (`.adr`).
    pub fn write_envelope(&mut self, topic_str: &str, payload: &[u8]) -> Result<(), LogWriterError> {
        debug_assert!(matches!(self.kind, StreamKind::Raw));
        let envelope = topic::build_envelope(topic_str, payload);
        self.writer.write_all(&envelope)?;
        self.bytes_written += envelope.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LogWriterError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Hosts up to three parallel append-only streams for one run: events,
/// waveforms, and raw.
#[derive(Default)]
pub struct RunRecorder {
    events: Option<LogFile>,
    waveforms: Option<LogFile>,
    raw: Option<LogFile>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, base_name: &str) -> Result<(), LogWriterError> {
        self.events = Some(LogFile::create(base_name, StreamKind::Events)?);
        self.waveforms = Some(LogFile::create(base_name, StreamKind::Waveforms)?);
        self.raw = Some(LogFile::create(base_name, StreamKind::Raw)?);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.events.is_some()
    }

    pub fn record_events(&mut self, bytes: &[u8]) -> Result<(), LogWriterError> {
        self.events.as_mut().ok_or(LogWriterError::NotOpen)?.write_record(bytes)
    }

    pub fn record_waveforms(&mut self, bytes: &[u8]) -> Result<(), LogWriterError> {
        self.waveforms.as_mut().ok_or(LogWriterError::NotOpen)?.write_record(bytes)
    }

    pub fn record_raw(&mut self, topic_str: &str, payload: &[u8]) -> Result<(), LogWriterError> {
        self.raw.as_mut().ok_or(LogWriterError::NotOpen)?.write_envelope(topic_str, payload)
    }

    /// Flushed on command or every status publication.
    pub fn flush_all(&mut self) -> Result<(), LogWriterError> {
        if let Some(f) = self.events.as_mut() {
            f.flush()?;
        }
        if let Some(f) = self.waveforms.as_mut() {
            f.flush()?;
        }
        if let Some(f) = self.raw.as_mut() {
            f.flush()?;
        }
        Ok(())
    }

    pub fn byte_counters(&self) -> (u64, u64, u64) {
        (
            self.events.as_ref().map(LogFile::bytes_written).unwrap_or(0),
            self.waveforms.as_ref().map(LogFile::bytes_written).unwrap_or(0),
            self.raw.as_ref().map(LogFile::bytes_written).unwrap_or(0),
        )
    }

    /// Closes all three streams, on `stop` or shutdown.
    pub fn close(&mut self) -> Result<(), LogWriterError> {
        if let Some(mut f) = self.events.take() {
            f.flush()?;
        }
        if let Some(mut f) = self.waveforms.take() {
            f.flush()?;
        }
        if let Some(mut f) = self.raw.take() {
            f.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base(name: &str) -> String {
        std::env::temp_dir().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn records_append_without_framing_and_track_size() {
        let base = temp_base("daqflow_test_logwriter_basic");
        let mut recorder = RunRecorder::new();
        recorder.open(&base).unwrap();
        recorder.record_events(&[1, 2, 3, 4]).unwrap();
        recorder.record_events(&[5, 6]).unwrap();
        recorder.flush_all().unwrap();

        let (events_bytes, waveforms_bytes, raw_bytes) = recorder.byte_counters();
        assert_eq!(events_bytes, 6);
        assert_eq!(waveforms_bytes, 0);
        assert_eq!(raw_bytes, 0);

        recorder.close().unwrap();
        let contents = std::fs::read(format!("{base}.ade")).unwrap();
        assert_eq!(contents, vec![1, 2, 3, 4, 5, 6]);

        std::fs::remove_file(format!("{base}.ade")).ok();
        std::fs::remove_file(format!("{base}.adw")).ok();
        std::fs::remove_file(format!("{base}.adr")).ok();
    }

    #[test]
    fn raw_stream_writes_full_envelopes() {
        let base = temp_base("daqflow_test_logwriter_raw");
        let mut recorder = RunRecorder::new();
        recorder.open(&base).unwrap();
        recorder.record_raw("status_abcd_s3", b"abc").unwrap();
        recorder.close().unwrap();

        let contents = std::fs::read(format!("{base}.adr")).unwrap();
        assert_eq!(contents, b"status_abcd_s3 abc");

        std::fs::remove_file(format!("{base}.ade")).ok();
        std::fs::remove_file(format!("{base}.adw")).ok();
        std::fs::remove_file(format!("{base}.adr")).ok();
    }

    #[test]
    fn writing_before_open_is_rejected() {
        let mut recorder = RunRecorder::new();
        assert!(matches!(recorder.record_events(&[1]), Err(LogWriterError::NotOpen)));
    }
}
