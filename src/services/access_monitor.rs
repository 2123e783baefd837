//! Periodic and on-demand access re-checks bound to the lifetime of an open view.
//!
//! A monitor checks once on start, on every interval tick and whenever it is
//! triggered. A check already in flight swallows overlapping triggers. Dropping
//! the [`MonitorHandle`] stops the timer; results of a check that finishes
//! after the stop are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::services::access_service::{AccessDecision, AccessError, AccessService};

const UPDATE_BUFFER: usize = 16;

/// One access check.
#[async_trait]
pub trait AccessProbe: Send + Sync {
    async fn check(&self) -> Result<AccessDecision, AccessError>;
}

/// Probe for the identity attached to one session.
pub struct SessionProbe {
    service: Arc<dyn AccessService>,
    user_id: Option<String>,
    bypass: Option<String>,
}

impl SessionProbe {
    #[must_use]
    pub fn new(
        service: Arc<dyn AccessService>,
        user_id: Option<String>,
        bypass: Option<String>,
    ) -> Self {
        Self {
            service,
            user_id,
            bypass,
        }
    }
}

#[async_trait]
impl AccessProbe for SessionProbe {
    async fn check(&self) -> Result<AccessDecision, AccessError> {
        self.service
            .evaluate_request(self.user_id.as_deref(), self.bypass.as_deref())
            .await
    }
}

#[derive(Debug, Clone)]
pub enum MonitorUpdate {
    Checking,
    Decided(AccessDecision),
    Failed(String),
}

pub struct MonitorHandle {
    trigger: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Request an immediate re-check (focus, entitlement change).
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a monitor. Updates arrive on the returned receiver until the handle
/// is stopped or the receiver is dropped.
#[must_use]
pub fn spawn(
    probe: Arc<dyn AccessProbe>,
    interval: Duration,
) -> (MonitorHandle, mpsc::Receiver<MonitorUpdate>) {
    let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
    let trigger = Arc::new(Notify::new());
    let stopped = Arc::new(AtomicBool::new(false));
    let in_flight = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(run(
        probe,
        interval,
        tx,
        trigger.clone(),
        stopped.clone(),
        in_flight,
    ));

    (
        MonitorHandle {
            trigger,
            stopped,
            task,
        },
        rx,
    )
}

async fn run(
    probe: Arc<dyn AccessProbe>,
    interval: Duration,
    tx: mpsc::Sender<MonitorUpdate>,
    trigger: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // The first tick completes immediately, giving the check on start.
        tokio::select! {
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
        }

        if stopped.load(Ordering::SeqCst) || tx.is_closed() {
            break;
        }

        if in_flight.swap(true, Ordering::SeqCst) {
            debug!("Access check already in flight, trigger skipped");
            continue;
        }

        let probe = probe.clone();
        let tx = tx.clone();
        let stopped = stopped.clone();
        let in_flight = in_flight.clone();

        // Detached so the loop keeps absorbing triggers while the check runs.
        tokio::spawn(async move {
            if tx.send(MonitorUpdate::Checking).await.is_err() {
                in_flight.store(false, Ordering::SeqCst);
                return;
            }

            let update = match probe.check().await {
                Ok(decision) => MonitorUpdate::Decided(decision),
                Err(e) => MonitorUpdate::Failed(e.to_string()),
            };

            // Cleared before publishing: a trigger reacting to this result must start a new check.
            in_flight.store(false, Ordering::SeqCst);

            if stopped.load(Ordering::SeqCst) {
                debug!("Monitor stopped, discarding late access result");
            } else {
                let _ = tx.send(update).await;
            }
        });
    }
}
