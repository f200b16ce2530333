//! Drives a backend agent-training job to completion by polling its status.
//!
//! State machine: Idle -> Starting -> Running -> Completed, with Failed reached
//! from Starting or Running on any request error. Only one job is observed at a
//! time. Polls are strictly sequential and each poll loop is bound to a child
//! of the controller's cancellation token, so teardown stops polling even when
//! a status request is in flight.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::TrainingStatus,
    error::ApiError,
    protocol::{TrainingRequest, TrainingStatusResponse},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    events::{publish, publish_notice, ClientEvent, NoticeContext},
    EnergyBackend,
};

pub const TRAINING_ACK_PROGRESS: &str = "Training in progress... This may take a minute";
pub const TRAINING_COMPLETED_ADVICE: &str = "Agent training completed! The optimized schedule respects your avoid and preferred hours while maximizing cost savings.";

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSnapshot {
    pub status: TrainingStatus,
    /// Present only while Running.
    pub progress: Option<String>,
    /// Set only on Completed.
    pub result_advice: Option<String>,
    pub failure: Option<ApiError>,
}

impl Default for TrainingSnapshot {
    fn default() -> Self {
        Self {
            status: TrainingStatus::Idle,
            progress: None,
            result_advice: None,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A job is already Starting or Running; nothing was sent.
    AlreadyActive,
    /// `cancel()` ran while the start request was in flight. The job stays
    /// Idle and is not observed.
    Cancelled,
}

struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct TrainingJobController {
    backend: Arc<dyn EnergyBackend>,
    job: Arc<Mutex<TrainingSnapshot>>,
    poll_task: Mutex<Option<PollTask>>,
    poll_interval: Duration,
    /// Bumped by every start and cancel so an in-flight start can tell it was
    /// superseded.
    attempt: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
    shutdown: CancellationToken,
}

impl TrainingJobController {
    pub fn new(
        backend: Arc<dyn EnergyBackend>,
        poll_interval: Duration,
        events: broadcast::Sender<ClientEvent>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            backend,
            job: Arc::new(Mutex::new(TrainingSnapshot::default())),
            poll_task: Mutex::new(None),
            poll_interval,
            attempt: AtomicU64::new(0),
            events,
            shutdown: parent.child_token(),
        }
    }

    pub async fn snapshot(&self) -> TrainingSnapshot {
        self.job.lock().await.clone()
    }

    /// Starts a training job unless one is already Starting or Running.
    pub async fn start(&self, request: TrainingRequest) -> Result<StartOutcome, ApiError> {
        if self.shutdown.is_cancelled() {
            return Err(ApiError::validation("training controller has been shut down"));
        }

        let (snapshot, attempt) = {
            let mut job = self.job.lock().await;
            if job.status.is_active() {
                debug!(job_status = ?job.status, "training start ignored; job already active");
                return Ok(StartOutcome::AlreadyActive);
            }
            *job = TrainingSnapshot {
                status: TrainingStatus::Starting,
                ..TrainingSnapshot::default()
            };
            (job.clone(), self.attempt.fetch_add(1, Ordering::SeqCst) + 1)
        };
        publish(&self.events, ClientEvent::TrainingChanged(snapshot));
        info!(
            avoid_hours = ?request.avoid_hours.to_vec(),
            appliances = request.appliances.len(),
            "starting agent training"
        );

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => {
                return Err(ApiError::validation("training controller has been shut down"));
            }
            result = self.backend.start_training(&request) => result,
        };

        if let Err(err) = result {
            let snapshot = {
                let mut job = self.job.lock().await;
                if !self.still_starting(&job, attempt) {
                    debug!(error = %err, "ignoring start failure for a cancelled job");
                    return Ok(StartOutcome::Cancelled);
                }
                warn!(error = %err, "agent training failed to start");
                job.status = TrainingStatus::Failed;
                job.progress = None;
                job.failure = Some(err.clone());
                job.clone()
            };
            publish(&self.events, ClientEvent::TrainingChanged(snapshot));
            publish_notice(&self.events, NoticeContext::TrainingStart, err.clone());
            return Err(err);
        }

        let snapshot = {
            let mut job = self.job.lock().await;
            if !self.still_starting(&job, attempt) {
                debug!("training start acknowledged after cancel; not observing");
                return Ok(StartOutcome::Cancelled);
            }
            job.status = TrainingStatus::Running;
            job.progress = Some(TRAINING_ACK_PROGRESS.to_string());
            job.clone()
        };
        publish(&self.events, ClientEvent::TrainingChanged(snapshot));
        self.spawn_polling().await;
        Ok(StartOutcome::Started)
    }

    /// Stops observing the current job and returns to Idle. The backend job
    /// itself keeps running.
    pub async fn cancel(&self) -> bool {
        let had_poll = self.stop_polling().await;
        let snapshot = {
            let mut job = self.job.lock().await;
            self.attempt.fetch_add(1, Ordering::SeqCst);
            if !job.status.is_active() {
                return had_poll;
            }
            *job = TrainingSnapshot::default();
            job.clone()
        };
        info!("agent training observation cancelled");
        publish(&self.events, ClientEvent::TrainingChanged(snapshot));
        true
    }

    pub async fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Cancels any pending or in-flight poll. Nothing mutates the job after
    /// this returns.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_polling().await;
        // Waits out a poll that passed its cancellation check before the token
        // flipped.
        drop(self.job.lock().await);
    }

    fn still_starting(&self, job: &TrainingSnapshot, attempt: u64) -> bool {
        job.status == TrainingStatus::Starting && self.attempt.load(Ordering::SeqCst) == attempt
    }

    async fn spawn_polling(&self) {
        let token = self.shutdown.child_token();
        let handle = tokio::spawn(poll_until_done(
            Arc::clone(&self.backend),
            Arc::clone(&self.job),
            self.events.clone(),
            self.poll_interval,
            token.clone(),
        ));
        let previous = self
            .poll_task
            .lock()
            .await
            .replace(PollTask { token, handle });
        if let Some(previous) = previous {
            previous.token.cancel();
            previous.handle.abort();
        }
    }

    async fn stop_polling(&self) -> bool {
        let Some(task) = self.poll_task.lock().await.take() else {
            return false;
        };
        task.token.cancel();
        task.handle.abort();
        true
    }
}

impl Drop for TrainingJobController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn poll_until_done(
    backend: Arc<dyn EnergyBackend>,
    job: Arc<Mutex<TrainingSnapshot>>,
    events: broadcast::Sender<ClientEvent>,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = backend.training_status() => result,
        };

        let mut guard = job.lock().await;
        if token.is_cancelled() {
            return;
        }
        match result {
            Ok(TrainingStatusResponse {
                is_training: true,
                progress,
            }) => {
                debug!(progress = %progress, "agent training still running");
                guard.progress = Some(progress);
                publish(&events, ClientEvent::TrainingChanged(guard.clone()));
            }
            Ok(_) => {
                guard.status = TrainingStatus::Completed;
                guard.progress = None;
                guard.result_advice = Some(TRAINING_COMPLETED_ADVICE.to_string());
                info!("agent training completed");
                publish(&events, ClientEvent::TrainingChanged(guard.clone()));
                return;
            }
            Err(err) => {
                warn!(error = %err, "agent training status poll failed");
                guard.status = TrainingStatus::Failed;
                guard.progress = None;
                guard.failure = Some(err.clone());
                publish(&events, ClientEvent::TrainingChanged(guard.clone()));
                publish_notice(&events, NoticeContext::TrainingPoll, err);
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/training_tests.rs"]
mod tests;
