//! Avoid-hour editing with a debounced comfort-score refresh.
//!
//! Edits apply to local state immediately. The recompute request is debounced
//! and reads the avoid-set when the timer fires, so a burst of toggles sends a
//! single request carrying the final set. A failed recompute never rolls the
//! local edit back.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{normalize_comfort_level, AvoidHours, Preferences},
    error::ApiError,
    protocol::SavePreferencesRequest,
};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    debounce::DebounceScheduler,
    events::{publish, publish_notice, ClientEvent, NoticeContext},
    EnergyBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ComfortTimer {
    Recompute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComfortSnapshot {
    pub preferences: Preferences,
    pub advice: Option<String>,
    pub calculating: bool,
    pub notice: Option<ApiError>,
}

#[derive(Default)]
struct ComfortState {
    preferences: Preferences,
    advice: Option<String>,
    calculating: bool,
    notice: Option<ApiError>,
    /// Bumped each time a recompute request is issued or the preferences are
    /// replaced from the backend; older answers are stale.
    recompute_revision: u64,
}

impl ComfortState {
    /// Drops any recompute answer still in flight.
    fn supersede_recompute(&mut self) {
        self.recompute_revision += 1;
        self.calculating = false;
    }

    fn snapshot(&self) -> ComfortSnapshot {
        ComfortSnapshot {
            preferences: self.preferences.clone(),
            advice: self.advice.clone(),
            calculating: self.calculating,
            notice: self.notice.clone(),
        }
    }
}

pub struct ComfortEstimationController {
    backend: Arc<dyn EnergyBackend>,
    state: Arc<Mutex<ComfortState>>,
    debounce: DebounceScheduler<ComfortTimer>,
    delay: Duration,
    events: broadcast::Sender<ClientEvent>,
    shutdown: CancellationToken,
}

impl ComfortEstimationController {
    pub fn new(
        backend: Arc<dyn EnergyBackend>,
        delay: Duration,
        events: broadcast::Sender<ClientEvent>,
        parent: &CancellationToken,
    ) -> Self {
        let shutdown = parent.child_token();
        Self {
            backend,
            state: Arc::new(Mutex::new(ComfortState::default())),
            debounce: DebounceScheduler::new(shutdown.child_token()),
            delay,
            events,
            shutdown,
        }
    }

    pub async fn snapshot(&self) -> ComfortSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Replaces local preferences with the stored ones.
    pub async fn load(&self) -> Result<ComfortSnapshot, ApiError> {
        match self.backend.get_preferences().await {
            Ok(stored) => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.preferences = Preferences {
                        avoid_hours: stored.avoid_hours,
                        priority_appliances: stored.priority_appliances,
                        comfort_level: normalize_comfort_level(stored.comfort_level),
                    };
                    state.supersede_recompute();
                    state.notice = None;
                    state.snapshot()
                };
                info!(
                    avoid_hours = ?snapshot.preferences.avoid_hours.to_vec(),
                    comfort_level = snapshot.preferences.comfort_level,
                    "preferences loaded"
                );
                publish(&self.events, ClientEvent::ComfortUpdated(snapshot.clone()));
                Ok(snapshot)
            }
            Err(err) => Err(self.record_failure(NoticeContext::LoadPreferences, err).await),
        }
    }

    /// Flips `hour` in the avoid-set and schedules a recompute.
    pub async fn toggle_avoid_hour(&self, hour: u8) -> Result<AvoidHours, ApiError> {
        let (avoided, snapshot) = {
            let mut state = self.state.lock().await;
            let avoided = state.preferences.avoid_hours.toggle(hour)?;
            (avoided, state.snapshot())
        };
        debug!(hour, avoided, "avoid hour toggled");
        publish(&self.events, ClientEvent::ComfortUpdated(snapshot.clone()));
        self.schedule_recompute().await;
        Ok(snapshot.preferences.avoid_hours)
    }

    /// Replaces the avoid-set wholesale (e.g. a preset) and schedules a
    /// recompute. An invalid hour rejects the whole preset locally.
    pub async fn apply_preset(
        &self,
        hours: impl IntoIterator<Item = u8>,
    ) -> Result<AvoidHours, ApiError> {
        let hours = AvoidHours::new(hours)?;
        let snapshot = {
            let mut state = self.state.lock().await;
            state.preferences.avoid_hours = hours;
            state.snapshot()
        };
        debug!(avoid_hours = ?snapshot.preferences.avoid_hours.to_vec(), "avoid hours replaced");
        publish(&self.events, ClientEvent::ComfortUpdated(snapshot.clone()));
        self.schedule_recompute().await;
        Ok(snapshot.preferences.avoid_hours)
    }

    pub async fn set_priority_appliances(&self, appliances: Vec<String>) -> Vec<String> {
        let mut state = self.state.lock().await;
        state.preferences.priority_appliances = appliances
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        state.preferences.priority_appliances.clone()
    }

    /// Persists the current preferences and refreshes the comfort score from
    /// the backend's answer.
    pub async fn save(&self) -> Result<ComfortSnapshot, ApiError> {
        let request = {
            let state = self.state.lock().await;
            SavePreferencesRequest {
                avoid_hours: state.preferences.avoid_hours.clone(),
                priority_appliances: state.preferences.priority_appliances.clone(),
            }
        };

        match self.backend.save_preferences(&request).await {
            Ok(saved) => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.preferences.comfort_level = normalize_comfort_level(saved.comfort_level);
                    state.advice = non_empty(saved.advice);
                    state.supersede_recompute();
                    state.notice = None;
                    state.snapshot()
                };
                info!(
                    comfort_level = snapshot.preferences.comfort_level,
                    "preferences saved"
                );
                publish(&self.events, ClientEvent::ComfortUpdated(snapshot.clone()));
                Ok(snapshot)
            }
            Err(err) => Err(self.record_failure(NoticeContext::SavePreferences, err).await),
        }
    }

    pub async fn dismiss_notice(&self) {
        self.state.lock().await.notice = None;
    }

    pub async fn has_pending_recompute(&self) -> bool {
        self.debounce.is_pending(&ComfortTimer::Recompute).await
    }

    /// Drops a scheduled recompute without tearing the controller down.
    pub async fn cancel_pending(&self) -> bool {
        self.debounce.cancel(&ComfortTimer::Recompute).await
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.debounce.shutdown().await;
    }

    async fn schedule_recompute(&self) {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        let superseded = self
            .debounce
            .schedule(ComfortTimer::Recompute, self.delay, move || {
                recompute_comfort(backend, state, events, shutdown)
            })
            .await;
        if superseded {
            debug!("comfort recompute rescheduled");
        }
    }

    async fn record_failure(&self, context: NoticeContext, err: ApiError) -> ApiError {
        warn!(?context, error = %err, "preferences request failed");
        self.state.lock().await.notice = Some(err.clone());
        publish_notice(&self.events, context, err.clone());
        err
    }
}

impl Drop for ComfortEstimationController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn recompute_comfort(
    backend: Arc<dyn EnergyBackend>,
    state: Arc<Mutex<ComfortState>>,
    events: broadcast::Sender<ClientEvent>,
    shutdown: CancellationToken,
) {
    let (avoid_hours, revision, snapshot) = {
        let mut guard = state.lock().await;
        guard.calculating = true;
        guard.recompute_revision += 1;
        (
            guard.preferences.avoid_hours.clone(),
            guard.recompute_revision,
            guard.snapshot(),
        )
    };
    publish(&events, ClientEvent::ComfortUpdated(snapshot));
    debug!(avoid_hours = ?avoid_hours.to_vec(), "recomputing comfort level");

    let result = backend.calculate_comfort(&avoid_hours).await;

    let snapshot = {
        let mut guard = state.lock().await;
        if shutdown.is_cancelled() || guard.recompute_revision != revision {
            return;
        }
        guard.calculating = false;
        match result {
            Ok(response) => {
                guard.preferences.comfort_level = normalize_comfort_level(response.comfort_level);
                guard.advice = non_empty(response.advice);
                guard.notice = None;
                info!(
                    comfort_level = guard.preferences.comfort_level,
                    "comfort level updated"
                );
            }
            Err(err) => {
                warn!(error = %err, "comfort recompute failed; keeping last known level");
                guard.notice = Some(err.clone());
                publish_notice(&events, NoticeContext::ComfortRecompute, err);
            }
        }
        guard.snapshot()
    };
    publish(&events, ClientEvent::ComfortUpdated(snapshot));
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
#[path = "tests/comfort_tests.rs"]
mod tests;
