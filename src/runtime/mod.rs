//! The generic stage runtime — one tick-driven cooperative state machine
//! reused by every binary, generalizing a per-task `handle_command`
//! dispatch into the full graph in `state::StageState`, grounded on
//! `original_source/absp`'s component loop.
//!
//! There is exactly one thread. Each call to `tick` performs at most one
//! blocking-free unit of work and returns; `run` sleeps the base period
//! between ticks. No task system, no shared-memory concurrency: every
//! socket, timer, and buffer in a `Stage` is owned outright.

pub mod error;
pub mod hooks;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::transport::{Socket, SocketRole, TransportResult, SLOW_JOINER_WAIT};
use crate::wire::{MsgIdCounter, StageCommand, StatusMessage};

pub use error::StageError;
pub use hooks::{PollOutcome, StageHooks};
pub use state::StageState;

/// Default publish period: the maximum time pending records may wait
/// before being flushed even if the high-water mark isn't reached.
pub const DEFAULT_PUBLISH_PERIOD: Duration = Duration::from_secs(3);

/// Default high-water mark: records buffered before a publish is forced
/// regardless of the timer.
pub const DEFAULT_HIGH_WATER_MARK: usize = 4096;

/// Default tick period: how long `run` sleeps between ticks when idle.
pub const DEFAULT_BASE_PERIOD: Duration = Duration::from_millis(10);

pub struct StageConfig {
    pub module_name: String,
    pub status_bind: Option<String>,
    pub data_pub_bind: Option<String>,
    pub data_sub_connect: Option<String>,
    pub data_sub_topic: Option<String>,
    pub command_pull_bind: Option<String>,
    pub base_period: Duration,
    pub publish_period: Duration,
    pub high_water_mark: usize,
    pub initial_config: Value,
}

/// The generic engine. `H` supplies every piece of domain behavior through
/// `StageHooks`; everything else (sockets, timers, the state graph) is
/// identical across binaries.
pub struct Stage {
    state: StageState,
    ctx: zmq::Context,
    module_name: String,
    status_socket: Option<Socket>,
    data_pub_socket: Option<Socket>,
    data_sub_socket: Option<Socket>,
    command_socket: Option<Socket>,
    status_bind: Option<String>,
    data_pub_bind: Option<String>,
    data_sub_connect: Option<String>,
    data_sub_topic: Option<String>,
    command_pull_bind: Option<String>,
    base_period: Duration,
    publish_period: Duration,
    high_water_mark: usize,
    terminate: Arc<AtomicBool>,
    last_publish: Option<Instant>,
    last_status: Option<Instant>,
    msg_id: MsgIdCounter,
    config: Value,
    pending_config: Option<Value>,
    configure_retry_used: bool,
    last_error: Option<StageError>,
}

impl Stage {
    pub fn new(cfg: StageConfig, terminate: Arc<AtomicBool>) -> Self {
        Self {
            state: StageState::Start,
            ctx: zmq::Context::new(),
            module_name: cfg.module_name,
            status_socket: None,
            data_pub_socket: None,
            data_sub_socket: None,
            command_socket: None,
            status_bind: cfg.status_bind,
            data_pub_bind: cfg.data_pub_bind,
            data_sub_connect: cfg.data_sub_connect,
            data_sub_topic: cfg.data_sub_topic,
            command_pull_bind: cfg.command_pull_bind,
            base_period: cfg.base_period,
            publish_period: cfg.publish_period,
            high_water_mark: cfg.high_water_mark,
            terminate,
            last_publish: None,
            last_status: None,
            msg_id: MsgIdCounter::default(),
            config: cfg.initial_config,
            pending_config: None,
            configure_retry_used: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Borrows the data-subscription socket, if this stage has one. The
    /// engine passes this straight into `poll` each tick; exposed here too
    /// for callers that want to inspect a running stage from outside.
    pub fn data_sub_socket(&self) -> Option<&Socket> {
        self.data_sub_socket.as_ref()
    }

    pub fn data_pub_socket(&self) -> Option<&Socket> {
        self.data_pub_socket.as_ref()
    }

    fn terminating(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    /// Runs until `StageState::Stop` is reached, calling `tick` once per
    /// iteration and sleeping the base period in between.
    pub fn run(&mut self, hooks: &mut dyn StageHooks) {
        loop {
            self.tick(hooks);
            if self.state.is_terminal() {
                break;
            }
            std::thread::sleep(self.base_period);
        }
        info!(module = %self.module_name, "stage stopped");
    }

    /// Advances the state machine by exactly one step.
    pub fn tick(&mut self, hooks: &mut dyn StageHooks) {
        let next = match self.state {
            StageState::Start => StageState::CreateContext,
            StageState::CreateContext => StageState::CreateSockets,
            StageState::CreateSockets => self.do_create_sockets(),
            StageState::BindSockets => self.do_bind_sockets(),
            StageState::ReadConfig => self.do_read_config(hooks),
            StageState::CreateDevice => self.do_create_device(hooks),
            StageState::ConfigureDevice => self.do_configure_device(hooks),
            StageState::AllocateMemory => self.do_allocate_memory(hooks),
            StageState::PublishStatus => self.do_publish_status(hooks),
            StageState::ReceiveCommands => self.do_receive_commands(false, hooks),
            StageState::ReconfigureClear => {
                hooks.clear_memory();
                StageState::ReconfigureDestroyDevice
            }
            StageState::ReconfigureDestroyDevice => {
                hooks.destroy_device();
                StageState::CreateDevice
            }
            StageState::StartAcq => self.do_start_acq(hooks),
            StageState::AcqReceiveCommands => self.do_receive_commands(true, hooks),
            StageState::ReadData => self.do_read_data(hooks),
            StageState::PublishData => self.do_publish_data(hooks),
            StageState::StopPublish => self.do_stop_publish(hooks),
            StageState::StopAcq => {
                if let Err(e) = hooks.stop_acquisition() {
                    self.fail(e)
                } else {
                    StageState::ReceiveCommands
                }
            }
            StageState::RestartPublish => self.do_stop_publish(hooks),
            StageState::RestartStopAcq => {
                let _ = hooks.stop_acquisition();
                StageState::RestartClear
            }
            StageState::RestartClear => {
                hooks.clear_memory();
                StageState::RestartDestroy
            }
            StageState::RestartDestroy => {
                hooks.destroy_device();
                StageState::RestartCreate
            }
            StageState::RestartCreate => self.do_create_device(hooks),
            StageState::RestartConfigure => self.do_restart_configure(hooks),
            StageState::RestartAllocate => self.do_allocate_memory(hooks),
            StageState::ClearMemory => {
                hooks.clear_memory();
                StageState::DestroyDevice
            }
            StageState::DestroyDevice => {
                hooks.destroy_device();
                StageState::CloseSockets
            }
            StageState::CloseSockets => {
                self.status_socket = None;
                self.data_pub_socket = None;
                self.data_sub_socket = None;
                self.command_socket = None;
                StageState::DestroyContext
            }
            StageState::DestroyContext => StageState::Stop,
            StageState::Stop => StageState::Stop,

            StageState::CommunicationError
            | StageState::ParseError
            | StageState::DeviceError
            | StageState::AcquisitionError
            | StageState::RestartConfigureError => self.enter_shutdown_after_error(),

            StageState::ConfigureError => {
                if self.configure_retry_used {
                    self.enter_shutdown_after_error()
                } else {
                    self.configure_retry_used = true;
                    StageState::ReconfigureDestroyDevice
                }
            }
        };
        if next != self.state {
            debug!(module = %self.module_name, from = %self.state, to = %next, "state transition");
        }
        self.state = next;
    }

    fn fail(&mut self, err: StageError) -> StageState {
        error!(module = %self.module_name, error = %err, kind = err.event_type(), "stage error");
        let target = match &err {
            StageError::Communication(_) => StageState::CommunicationError,
            StageError::Parse(_) => StageState::ParseError,
            StageError::Configure(_) => StageState::ConfigureError,
            StageError::Device(_) => {
                if self.state.is_acquiring() {
                    StageState::AcquisitionError
                } else {
                    StageState::DeviceError
                }
            }
            StageError::Acquisition(_) => StageState::AcquisitionError,
            StageError::RestartConfigure(_) => StageState::RestartConfigureError,
        };
        self.last_error = Some(err);
        target
    }

    /// Every error, including one raised while sockets are already broken,
    /// still walks the shutdown chain so device and socket teardown always
    /// run, even after a fatal error.
    fn enter_shutdown_after_error(&mut self) -> StageState {
        StageState::ClearMemory
    }

    fn do_create_sockets(&mut self) -> StageState {
        match self.try_create_sockets() {
            Ok(()) => StageState::BindSockets,
            Err(e) => self.fail(StageError::Communication(e.to_string())),
        }
    }

    fn try_create_sockets(&mut self) -> TransportResult<()> {
        if let Some(addr) = &self.command_pull_bind {
            self.command_socket = Some(Socket::bind(&self.ctx, SocketRole::Pull, addr)?);
        }
        if let Some(addr) = &self.data_sub_connect {
            let sub = Socket::connect(&self.ctx, SocketRole::Sub, addr)?;
            if let Some(topic) = &self.data_sub_topic {
                sub.subscribe(topic)?;
            } else {
                sub.subscribe("")?;
            }
            self.data_sub_socket = Some(sub);
        }
        Ok(())
    }

    fn do_bind_sockets(&mut self) -> StageState {
        match self.try_bind_sockets() {
            Ok(()) => {
                std::thread::sleep(SLOW_JOINER_WAIT);
                StageState::ReadConfig
            }
            Err(e) => self.fail(StageError::Communication(e.to_string())),
        }
    }

    fn try_bind_sockets(&mut self) -> TransportResult<()> {
        if let Some(addr) = &self.status_bind {
            self.status_socket = Some(Socket::bind(&self.ctx, SocketRole::Pub, addr)?);
        }
        if let Some(addr) = &self.data_pub_bind {
            self.data_pub_socket = Some(Socket::bind(&self.ctx, SocketRole::Pub, addr)?);
        }
        Ok(())
    }

    fn do_read_config(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        let config = self.pending_config.take().unwrap_or_else(|| self.config.clone());
        match hooks.read_config(&config) {
            Ok(()) => {
                self.config = config;
                StageState::CreateDevice
            }
            Err(e) => self.fail(e),
        }
    }

    fn do_create_device(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        match hooks.create_device() {
            Ok(()) => StageState::ConfigureDevice,
            Err(e) => self.fail(e),
        }
    }

    fn do_configure_device(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        match hooks.configure_device() {
            Ok(()) => StageState::AllocateMemory,
            Err(e) => self.fail(e),
        }
    }

    fn do_restart_configure(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        match hooks.configure_device() {
            Ok(()) => StageState::RestartAllocate,
            Err(_) => self.fail(StageError::RestartConfigure(
                "restart reconfigure rejected by device".to_string(),
            )),
        }
    }

    fn do_allocate_memory(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        match hooks.allocate_memory() {
            Ok(()) => {
                if self.state == StageState::RestartAllocate {
                    StageState::StartAcq
                } else {
                    StageState::PublishStatus
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn do_publish_status(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        if let Some(socket) = &self.status_socket {
            let mut msg = StatusMessage::new(self.module_name.as_str(), self.msg_id.next())
                .with_state(self.state.name());
            for (k, v) in hooks.status_fields() {
                msg = msg.with_field(k, v);
            }
            if let Ok(bytes) = msg.to_json() {
                let topic = format!("status_{}", self.module_name);
                if let Err(e) = socket.send(&topic, &bytes) {
                    warn!(module = %self.module_name, error = %e, "status publish failed");
                }
            }
        }
        self.last_status = Some(Instant::now());
        StageState::ReceiveCommands
    }

    fn do_receive_commands(&mut self, acquiring: bool, hooks: &mut dyn StageHooks) -> StageState {
        if self.terminating() {
            return StageState::ClearMemory;
        }

        if let Some(socket) = &self.command_socket {
            match socket.recv_nonblocking() {
                Ok(Some((_topic, payload))) => {
                    if let Ok(cmd) = StageCommand::from_json(&payload) {
                        return self.dispatch_command(cmd, acquiring, hooks);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    return self.fail(StageError::Communication(e.to_string()));
                }
            }
        }

        if acquiring {
            StageState::ReadData
        } else if self.status_due() {
            StageState::PublishStatus
        } else {
            StageState::ReceiveCommands
        }
    }

    fn dispatch_command(&mut self, cmd: StageCommand, acquiring: bool, hooks: &mut dyn StageHooks) -> StageState {
        match cmd {
            StageCommand::Start if !acquiring => StageState::StartAcq,
            StageCommand::Stop if acquiring => StageState::StopPublish,
            StageCommand::Reconfigure(config) => {
                self.pending_config = Some(config);
                self.configure_retry_used = false;
                if acquiring {
                    StageState::RestartPublish
                } else {
                    StageState::ReconfigureClear
                }
            }
            StageCommand::Off | StageCommand::Quit => {
                if acquiring {
                    StageState::StopAcq
                } else {
                    StageState::ClearMemory
                }
            }
            other => {
                hooks.handle_custom_command(&other);
                if acquiring {
                    StageState::ReadData
                } else if self.status_due() {
                    StageState::PublishStatus
                } else {
                    StageState::ReceiveCommands
                }
            }
        }
    }

    fn status_due(&self) -> bool {
        match self.last_status {
            Some(t) => t.elapsed() >= self.publish_period,
            None => true,
        }
    }

    fn publish_due(&self, hooks: &dyn StageHooks) -> bool {
        hooks.pending_len() >= self.high_water_mark
            || match self.last_publish {
                Some(t) => t.elapsed() >= self.publish_period,
                None => true,
            }
    }

    fn do_start_acq(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        match hooks.start_acquisition() {
            Ok(()) => {
                self.last_publish = Some(Instant::now());
                StageState::AcqReceiveCommands
            }
            Err(e) => self.fail(e),
        }
    }

    fn do_read_data(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        if self.terminating() {
            return StageState::StopPublish;
        }
        match hooks.poll(self.data_sub_socket.as_ref()) {
            Ok(PollOutcome::Eof) => StageState::StopPublish,
            Ok(_) => {
                if self.publish_due(hooks) {
                    StageState::PublishData
                } else {
                    StageState::AcqReceiveCommands
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn do_publish_data(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        match hooks.publish_pending(self.data_pub_socket.as_ref()) {
            Ok(_) => {
                self.last_publish = Some(Instant::now());
                StageState::AcqReceiveCommands
            }
            Err(e) => self.fail(e),
        }
    }

    fn do_stop_publish(&mut self, hooks: &mut dyn StageHooks) -> StageState {
        if hooks.pending_len() > 0 {
            if let Err(e) = hooks.publish_pending(self.data_pub_socket.as_ref()) {
                return self.fail(e);
            }
        }
        match self.state {
            StageState::RestartPublish => StageState::RestartStopAcq,
            _ => StageState::StopAcq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Socket, SocketRole};

    struct NoopHooks;

    impl StageHooks for NoopHooks {
        fn stage_name(&self) -> &'static str {
            "noop"
        }

        fn poll(&mut self, _data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
            Ok(PollOutcome::Idle)
        }

        fn publish_pending(&mut self, _data_pub: Option<&Socket>) -> Result<usize, StageError> {
            Ok(0)
        }
    }

    #[test]
    fn published_status_topic_matches_the_status_prefix_subscription_contract() {
        let status_address = "tcp://127.0.0.1:28761";

        let subscriber_ctx = zmq::Context::new();
        let subscriber = Socket::connect(&subscriber_ctx, SocketRole::Sub, status_address).unwrap();
        subscriber.subscribe("status_").unwrap();

        let cfg = StageConfig {
            module_name: "abcd".to_string(),
            status_bind: Some(status_address.to_string()),
            data_pub_bind: None,
            data_sub_connect: None,
            data_sub_topic: None,
            command_pull_bind: None,
            base_period: Duration::from_millis(1),
            publish_period: DEFAULT_PUBLISH_PERIOD,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            initial_config: Value::Null,
        };
        let terminate = Arc::new(AtomicBool::new(false));
        let mut stage = Stage::new(cfg, terminate);
        let mut hooks = NoopHooks;

        while stage.state() != StageState::ReceiveCommands {
            stage.tick(&mut hooks);
        }

        let mut received = None;
        for _ in 0..50 {
            if let Some(msg) = subscriber.recv_nonblocking().unwrap() {
                received = Some(msg);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let (topic, _payload) = received.expect("status message should have been published");
        assert!(
            topic.starts_with("status_abcd"),
            "expected a status_<producer> topic, got {topic}"
        );
    }
}

