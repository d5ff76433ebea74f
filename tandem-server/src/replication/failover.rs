/// Failover management - decides whether the slave serves queries
///
/// Features:
/// - Serving flag shared with the storage front end
/// - Recovery actions (failover script) on failure and resume
/// - Drives reconnect backoff accounting on resume
use super::backoff::ReconnectBackoff;
use super::config::FailoverConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Health of the master link as seen by failover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    Healthy,
    Failing,
}

/// Whether store operations are answered locally
///
/// Cloned into every storage front end; only the failover controller on the
/// slave's home task flips it.
#[derive(Debug, Clone, Default)]
pub struct ServingFlag(Arc<AtomicBool>);

impl ServingFlag {
    pub fn is_serving(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, serving: bool) {
        self.0.store(serving, Ordering::SeqCst);
    }
}

/// External best-effort notification run when the master is lost or regained
pub trait RecoveryAction: Send + Sync {
    fn on_failure(&self);
    fn on_resume(&self);
}

/// Runs the configured failover script with `down` or `up`
///
/// The child is awaited on a detached task; nothing waits for it.
pub struct ScriptRecoveryAction {
    script: Option<PathBuf>,
    args: Vec<String>,
}

impl ScriptRecoveryAction {
    pub fn new(config: &FailoverConfig) -> Self {
        Self {
            script: config.script.clone(),
            args: config.script_args.clone(),
        }
    }

    fn run(&self, event: &'static str) {
        let Some(script) = &self.script else {
            info!("Master {}, no failover script configured", event);
            return;
        };

        let mut command = Command::new(script);
        command.args(&self.args).arg(event);

        match command.spawn() {
            Ok(mut child) => {
                info!("Started failover script {:?} {}", script, event);
                let script = script.clone();
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => {
                            debug!("Failover script {:?} {} finished", script, event);
                        }
                        Ok(status) => {
                            warn!("Failover script {:?} {} exited with {}", script, event, status);
                        }
                        Err(e) => {
                            error!("Failed waiting for failover script {:?}: {}", script, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("Failed to start failover script {:?}: {}", script, e);
            }
        }
    }
}

impl RecoveryAction for ScriptRecoveryAction {
    fn on_failure(&self) {
        self.run("down");
    }

    fn on_resume(&self) {
        self.run("up");
    }
}

/// Failover controller
///
/// Starts `Healthy` but not serving: the first handshake turns serving on
/// without counting as a recovery.
pub struct FailoverController {
    state: FailoverState,
    serving: ServingFlag,
    actions: Vec<Arc<dyn RecoveryAction>>,
}

impl FailoverController {
    pub fn new(serving: ServingFlag) -> Self {
        serving.set(false);
        Self {
            state: FailoverState::Healthy,
            serving,
            actions: Vec::new(),
        }
    }

    pub fn add_action(&mut self, action: Arc<dyn RecoveryAction>) {
        self.actions.push(action);
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub fn is_serving(&self) -> bool {
        self.serving.is_serving()
    }

    /// Master lost. Idempotent while already failing.
    pub fn on_failure(&mut self) -> bool {
        if self.state == FailoverState::Failing {
            debug!("Failover already in progress");
            return false;
        }

        warn!("Master connection failed, no longer serving queries");
        self.serving.set(false);
        self.state = FailoverState::Failing;
        for action in &self.actions {
            action.on_failure();
        }
        true
    }

    /// Handshake completed after a failure. Only valid from `Failing`.
    pub fn on_resume(&mut self, backoff: &mut ReconnectBackoff, now: Instant) -> bool {
        if self.state != FailoverState::Failing {
            debug!("Resume ignored, failover is not in progress");
            return false;
        }

        info!("Master connection restored, serving queries again");
        self.serving.set(true);
        self.state = FailoverState::Healthy;
        backoff.on_reconnect(now);
        for action in &self.actions {
            action.on_resume();
        }
        true
    }

    /// Handshake completed on any connection
    pub fn on_handshake(&mut self, backoff: &mut ReconnectBackoff, now: Instant) {
        if !self.on_resume(backoff, now) {
            backoff.reset_timeout();
            self.serving.set(true);
        }
    }

    /// Stop serving without declaring a failure (graceful close, master change, shutdown)
    pub fn suspend(&mut self) {
        self.serving.set(false);
    }
}
