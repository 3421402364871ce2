//! `StageHooks` generalizes a `CommandHandlerExt`-style extension point
//! from a fixed 5-state component machine to the full stage graph in
//! `state`. Every binary (the acquisition source and every stream
//! operator) implements this trait once; `Stage::run` supplies the
//! identical tick loop.
//!
//! Hooks default to no-ops so a stream-operator stage — which has no
//! device to create or configure — only overrides `poll` and
//! `publish_pending`.

use serde_json::Value;

use super::error::StageError;
use crate::transport::Socket;
use crate::wire::StageCommand;

/// What happened during one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `n` new records were read into the hook's internal buffer.
    Produced(usize),
    /// Nothing was available this tick.
    Idle,
    /// The upstream source is exhausted (end of a replay file, typically);
    /// the stage should proceed to `Stop` rather than keep polling.
    Eof,
}

pub trait StageHooks {
    fn stage_name(&self) -> &'static str;

    /// Loads and validates the stage's JSON configuration. Called once at
    /// boot and again on every `reconfigure` command.
    fn read_config(&mut self, _config: &Value) -> Result<(), StageError> {
        Ok(())
    }

    /// Creates the stage's device or equivalent resource. A no-op for pure
    /// stream operators, which have none.
    fn create_device(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Applies the loaded configuration to the device.
    fn configure_device(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    fn allocate_memory(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    fn clear_memory(&mut self) {}

    fn destroy_device(&mut self) {}

    /// Reads or generates one tick's worth of records without blocking.
    /// Implementations own where records land (an internal `Vec`) and
    /// report how many arrived so the engine can evaluate the high-water
    /// mark. `data_sub` is the stage's inbound data socket, if it has one
    /// (a pure source has none; a filter reads from it directly here).
    fn poll(&mut self, data_sub: Option<&Socket>) -> Result<PollOutcome, StageError>;

    /// Number of records presently buffered and awaiting publication.
    fn pending_len(&self) -> usize {
        0
    }

    /// Publishes everything buffered and returns how many records were
    /// flushed. Called when the buffer crosses the high-water mark or the
    /// publish timer elapses, whichever is first. `data_pub` is the
    /// stage's outbound data socket, if it has one.
    fn publish_pending(&mut self, data_pub: Option<&Socket>) -> Result<usize, StageError>;

    /// Component-specific fields merged into the next status message
    /// (e.g. `events_read`, `bytes_written`).
    fn status_fields(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    /// Gives a stage a chance to react to a command the generic machine
    /// doesn't itself transition on (`snapshot`, `reset`, `add_file`, ...).
    fn handle_custom_command(&mut self, _cmd: &StageCommand) {}
}
