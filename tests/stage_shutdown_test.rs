//! Drives a bare stage (no sockets bound) through boot, into the idle
//! control loop, and through a terminate-flag shutdown, asserting the
//! shutdown chain is traversed exactly once with no data emitted after
//! the flag is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use daqflow::runtime::{PollOutcome, Stage, StageConfig, StageError, StageHooks, StageState};
use daqflow::transport::Socket;

struct NoopHooks {
    publishes_after_terminate: usize,
    terminate: Arc<AtomicBool>,
}

impl StageHooks for NoopHooks {
    fn stage_name(&self) -> &'static str {
        "noop"
    }

    fn poll(&mut self, _data_sub: Option<&Socket>) -> Result<PollOutcome, StageError> {
        Ok(PollOutcome::Idle)
    }

    fn publish_pending(&mut self, _data_pub: Option<&Socket>) -> Result<usize, StageError> {
        if self.terminate.load(Ordering::Relaxed) {
            self.publishes_after_terminate += 1;
        }
        Ok(0)
    }
}

fn bare_config() -> StageConfig {
    StageConfig {
        module_name: "noop".to_string(),
        status_bind: None,
        data_pub_bind: None,
        data_sub_connect: None,
        data_sub_topic: None,
        command_pull_bind: None,
        base_period: Duration::from_millis(1),
        publish_period: Duration::from_secs(3),
        high_water_mark: 4096,
        initial_config: serde_json::Value::Null,
    }
}

#[test]
fn terminate_flag_drives_shutdown_chain_exactly_once() {
    let terminate = Arc::new(AtomicBool::new(false));
    let mut stage = Stage::new(bare_config(), terminate.clone());
    let mut hooks = NoopHooks {
        publishes_after_terminate: 0,
        terminate: terminate.clone(),
    };

    // Boot to the idle control loop.
    while stage.state() != StageState::ReceiveCommands {
        stage.tick(&mut hooks);
    }

    terminate.store(true, Ordering::Relaxed);

    let mut visited = Vec::new();
    while !stage.state().is_terminal() {
        stage.tick(&mut hooks);
        visited.push(stage.state());
    }

    let shutdown_chain: Vec<StageState> = visited
        .iter()
        .copied()
        .skip_while(|s| *s != StageState::ClearMemory)
        .collect();

    assert_eq!(
        shutdown_chain,
        vec![
            StageState::ClearMemory,
            StageState::DestroyDevice,
            StageState::CloseSockets,
            StageState::DestroyContext,
            StageState::Stop,
        ]
    );
    assert_eq!(
        visited.iter().filter(|s| **s == StageState::ClearMemory).count(),
        1,
        "shutdown chain must run exactly once"
    );
    assert_eq!(hooks.publishes_after_terminate, 0);
}
