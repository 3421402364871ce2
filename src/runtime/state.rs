//! The generic stage state machine graph, grounded on
//! `original_source/absp/include/states.hpp` — the same five numeric
//! ranges (1xx init, 2xx normal, 3xx acquisition, 4xx restart, 8xx
//! shutdown, 9xx error) reappear here as enum groups, generalized into a
//! single tagged-variant dispatch covering the full graph.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageState {
    // 1xx: initialization chain
    Start,
    CreateContext,
    CreateSockets,
    BindSockets,
    ReadConfig,
    CreateDevice,
    ConfigureDevice,
    AllocateMemory,

    // 2xx: idle / control loop
    PublishStatus,
    ReceiveCommands,
    ReconfigureClear,
    ReconfigureDestroyDevice,

    // 3xx: acquisition loop
    StartAcq,
    AcqReceiveCommands,
    ReadData,
    PublishData,
    StopPublish,
    StopAcq,

    // 4xx: restart (self-heal) chain
    RestartPublish,
    RestartStopAcq,
    RestartClear,
    RestartDestroy,
    RestartCreate,
    RestartConfigure,
    RestartAllocate,

    // 8xx: shutdown chain
    ClearMemory,
    DestroyDevice,
    CloseSockets,
    DestroyContext,
    Stop,

    // 9xx: errors
    CommunicationError,
    ParseError,
    ConfigureError,
    DeviceError,
    AcquisitionError,
    RestartConfigureError,
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Stop)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            StageState::CommunicationError
                | StageState::ParseError
                | StageState::ConfigureError
                | StageState::DeviceError
                | StageState::AcquisitionError
                | StageState::RestartConfigureError
        )
    }

    pub fn is_acquiring(self) -> bool {
        matches!(
            self,
            StageState::StartAcq
                | StageState::AcqReceiveCommands
                | StageState::ReadData
                | StageState::PublishData
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            StageState::Start => "start",
            StageState::CreateContext => "create_context",
            StageState::CreateSockets => "create_sockets",
            StageState::BindSockets => "bind_sockets",
            StageState::ReadConfig => "read_config",
            StageState::CreateDevice => "create_device",
            StageState::ConfigureDevice => "configure_device",
            StageState::AllocateMemory => "allocate_memory",
            StageState::PublishStatus => "publish_status",
            StageState::ReceiveCommands => "receive_commands",
            StageState::ReconfigureClear => "reconfigure_clear",
            StageState::ReconfigureDestroyDevice => "reconfigure_destroy_device",
            StageState::StartAcq => "start_acq",
            StageState::AcqReceiveCommands => "acq_receive_commands",
            StageState::ReadData => "read_data",
            StageState::PublishData => "publish_data",
            StageState::StopPublish => "stop_publish",
            StageState::StopAcq => "stop_acq",
            StageState::RestartPublish => "restart_publish",
            StageState::RestartStopAcq => "restart_stop_acq",
            StageState::RestartClear => "restart_clear",
            StageState::RestartDestroy => "restart_destroy",
            StageState::RestartCreate => "restart_create",
            StageState::RestartConfigure => "restart_configure",
            StageState::RestartAllocate => "restart_allocate",
            StageState::ClearMemory => "clear_memory",
            StageState::DestroyDevice => "destroy_device",
            StageState::CloseSockets => "close_sockets",
            StageState::DestroyContext => "destroy_context",
            StageState::Stop => "stop",
            StageState::CommunicationError => "communication_error",
            StageState::ParseError => "parse_error",
            StageState::ConfigureError => "configure_error",
            StageState::DeviceError => "device_error",
            StageState::AcquisitionError => "acquisition_error",
            StageState::RestartConfigureError => "restart_configure_error",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
