//! Error taxonomy for the stage runtime. Each variant maps to one recovery
//! branch in the state machine; see `state::StageState::on_error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    /// Any transport failure: bind, send, or an unexpected socket error.
    #[error("communication error: {0}")]
    Communication(String),

    /// Configuration JSON was rejected.
    #[error("parse error: {0}")]
    Parse(String),

    /// The device (or equivalent per-stage resource) rejected settings.
    #[error("configure error: {0}")]
    Configure(String),

    /// The device failed during steady-state operation, not at configure
    /// time.
    #[error("device error: {0}")]
    Device(String),

    /// The data path failed during a run (a read, a decode, a write).
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// A restart's own reconfigure attempt failed.
    #[error("restart configure error: {0}")]
    RestartConfigure(String),
}

impl StageError {
    /// The JSON `type` tag published on the events topic before any state
    /// change; every nontrivial error produces one.
    pub fn event_type(&self) -> &'static str {
        match self {
            StageError::Communication(_) => "communication_error",
            StageError::Parse(_) => "parse_error",
            StageError::Configure(_) => "configure_error",
            StageError::Device(_) => "device_error",
            StageError::Acquisition(_) => "acquisition_error",
            StageError::RestartConfigure(_) => "restart_configure_error",
        }
    }

    pub fn description(&self) -> String {
        self.to_string()
    }
}
