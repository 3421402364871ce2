//! daqflow: a distributed nuclear-physics data-acquisition pipeline.
//!
//! Cooperating single-threaded stages exchange binary event/waveform
//! records and JSON status/command messages over brokerless ZeroMQ
//! PUB/SUB and PUSH/PULL sockets. This crate provides the wire codecs,
//! the generic stage runtime, the acquisition source contract, the stream
//! operators, the histogram engine, the log writer, the file readers and
//! the control-plane client; each `src/bin/*` target wires one of them
//! into a runnable process.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod control;
pub mod filereader;
pub mod histogram;
pub mod logwriter;
pub mod ops;
pub mod runtime;
pub mod source;
pub mod transport;
pub mod wire;
