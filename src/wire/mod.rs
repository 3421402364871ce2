//! Wire codecs (C1): the PSD event and waveform event binary formats, the
//! topic envelope framing, and the status/command JSON messages.
//!
//! Decoding is zero-copy where possible — records borrow from the buffer
//! that was received and must not outlive it (see `runtime` for how the
//! tick loop scopes this). Encoding assumes little-endian host byte order;
//! heterogeneous producer/consumer architectures are unsupported by design.

pub mod command;
pub mod error;
pub mod psd;
pub mod status;
pub mod topic;
pub mod waveform;

pub use command::StageCommand;
pub use error::{DecodeError, DecodeResult};
pub use psd::{decode_events, encode_events, PsdEvent, PsdEventView, PSD_EVENT_SIZE};
pub use status::{MsgIdCounter, StatusMessage};
pub use waveform::{decode_waveforms, encode_waveform, WaveformEvent, WaveformEventView};
