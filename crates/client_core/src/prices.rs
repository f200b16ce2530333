//! Live and historical price series.
//!
//! Aggregates (min/avg/max, trend) are derived from the fetched samples rather
//! than copied from the server's summary fields. On failure the last known
//! series stays in place.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{PriceBand, PriceSample, PriceSeries, PriceStats, Trend},
    error::ApiError,
    protocol::PricePoint,
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

/// Rows shown in the history table.
pub const HISTORY_ROW_LIMIT: usize = 24;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSnapshot {
    pub live: PriceSeries,
    pub history: PriceSeries,
    pub notice: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePriceSummary {
    pub current: f64,
    pub stats: PriceStats,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub label: String,
    pub value: f64,
    /// Position between the series min and max, 0-100.
    pub relative: f64,
    pub band: PriceBand,
}

impl PriceSnapshot {
    pub fn live_summary(&self) -> Option<LivePriceSummary> {
        Some(LivePriceSummary {
            current: self.live.current()?.value,
            stats: self.live.stats()?,
            trend: self.live.trend(),
        })
    }

    pub fn history_rows(&self, limit: usize) -> Vec<HistoryRow> {
        self.history
            .samples()
            .iter()
            .take(limit)
            .map(|sample| HistoryRow {
                label: sample.label.clone(),
                value: sample.value,
                relative: self.history.relative_position(sample.value),
                band: self.history.band(sample.value),
            })
            .collect()
    }
}

/// Pairs each price with its time label, dropping values that are not valid
/// prices.
pub fn series_from_live(times: &[String], prices: &[f64]) -> PriceSeries {
    if times.len() != prices.len() {
        warn!(
            times = times.len(),
            prices = prices.len(),
            "live price labels do not line up with values"
        );
    }
    let samples = prices
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let label = times
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("{idx:02}:00"));
            PriceSample::new(label, *value)
        })
        .collect();
    PriceSeries::new(retain_valid(samples))
}

pub fn series_from_history(points: &[PricePoint]) -> PriceSeries {
    let samples = points
        .iter()
        .map(|point| PriceSample::new(point.time.clone(), point.price))
        .collect();
    PriceSeries::new(retain_valid(samples))
}

fn retain_valid(samples: Vec<PriceSample>) -> Vec<PriceSample> {
    let total = samples.len();
    let kept: Vec<PriceSample> = samples
        .into_iter()
        .filter(|sample| sample.value.is_finite() && sample.value >= 0.0)
        .collect();
    if kept.len() != total {
        warn!(dropped = total - kept.len(), "dropped invalid price samples");
    }
    kept
}

pub struct PriceMonitor {
    backend: Arc<dyn EnergyBackend>,
    state: Arc<Mutex<PriceSnapshot>>,
    refresh_interval: Duration,
    events: broadcast::Sender<ClientEvent>,
    shutdown: CancellationToken,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl PriceMonitor {
    pub fn new(
        backend: Arc<dyn EnergyBackend>,
        refresh_interval: Duration,
        events: broadcast::Sender<ClientEvent>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(PriceSnapshot::default())),
            refresh_interval,
            events,
            shutdown: parent.child_token(),
            auto_refresh: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> PriceSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn refresh_live(&self) -> Result<PriceSnapshot, ApiError> {
        refresh_live_prices(&*self.backend, &self.state, &self.events).await
    }

    pub async fn refresh_history(&self) -> Result<PriceSnapshot, ApiError> {
        match self.backend.price_history().await {
            Ok(response) => {
                let series = series_from_history(&response.history);
                if series.is_empty() {
                    debug!(message = ?response.message, "no price history available");
                }
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.history = series;
                    state.notice = None;
                    state.clone()
                };
                publish(&self.events, ClientEvent::PricesUpdated(snapshot.clone()));
                Ok(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "price history refresh failed; keeping last known series");
                self.state.lock().await.notice = Some(err.clone());
                publish_notice(&self.events, NoticeContext::PriceHistory, err.clone());
                Err(err)
            }
        }
    }

    /// Refreshes live prices immediately and then on every refresh interval
    /// until the monitor shuts down. Calling it again restarts the schedule.
    pub async fn spawn_auto_refresh(&self) {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let interval = self.refresh_interval;
        let token = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let refreshed = tokio::select! {
                    _ = token.cancelled() => return,
                    result = refresh_live_prices(&*backend, &state, &events) => result,
                };
                if refreshed.is_ok() {
                    debug!("live prices auto-refreshed");
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        if let Some(previous) = self.auto_refresh.lock().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "live price auto-refresh started");
    }

    pub async fn dismiss_notice(&self) {
        self.state.lock().await.notice = None;
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.auto_refresh.lock().await.take() {
            handle.abort();
        }
    }
}

impl Drop for PriceMonitor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn refresh_live_prices(
    backend: &dyn EnergyBackend,
    state: &Mutex<PriceSnapshot>,
    events: &broadcast::Sender<ClientEvent>,
) -> Result<PriceSnapshot, ApiError> {
    match backend.live_prices().await {
        Ok(response) => {
            let series = series_from_live(&response.times, &response.prices);
            let snapshot = {
                let mut guard = state.lock().await;
                // An empty answer keeps whatever was shown before.
                if !series.is_empty() {
                    guard.live = series;
                }
                guard.notice = None;
                guard.clone()
            };
            publish(events, ClientEvent::PricesUpdated(snapshot.clone()));
            Ok(snapshot)
        }
        Err(err) => {
            warn!(error = %err, "live price refresh failed; keeping last known series");
            state.lock().await.notice = Some(err.clone());
            publish_notice(events, NoticeContext::LivePrices, err.clone());
            Err(err)
        }
    }
}

#[cfg(test)]
#[path = "tests/prices_tests.rs"]
mod tests;
