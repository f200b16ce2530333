//! The household appliance list and the backend's cost analysis of it.

use std::sync::Arc;

use chrono::{Local, Timelike};
use shared::{
    domain::HOURS_PER_DAY,
    error::ApiError,
    protocol::{AnalysisResponse, ApplianceUsage},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    events::{publish_notice, ClientEvent, NoticeContext},
    EnergyBackend,
};

/// Known appliances and their typical draw in kW.
pub const APPLIANCE_CATALOG: &[(&str, f64)] = &[
    ("Washing Machine", 0.30),
    ("Dryer", 2.50),
    ("Dishwasher", 1.50),
    ("Microwave", 0.20),
    ("Oven", 2.30),
    ("Toaster", 0.05),
    ("Coffee Maker", 0.30),
    ("Television", 0.10),
    ("Computer", 0.10),
    ("Air Conditioner", 3.50),
    ("Heater", 1.50),
    ("Vacuum Cleaner", 0.75),
    ("Iron", 1.10),
    ("Lighting", 0.02),
];

/// Catalog power draw for `name`, matched case-insensitively.
pub fn catalog_power_kw(name: &str) -> Option<(&'static str, f64)> {
    let name = name.trim();
    APPLIANCE_CATALOG
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .copied()
}

pub struct ApplianceController {
    backend: Arc<dyn EnergyBackend>,
    appliances: Mutex<Vec<ApplianceUsage>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ApplianceController {
    pub fn new(backend: Arc<dyn EnergyBackend>, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            backend,
            appliances: Mutex::new(Vec::new()),
            events,
        }
    }

    pub async fn appliances(&self) -> Vec<ApplianceUsage> {
        self.appliances.lock().await.clone()
    }

    /// Replaces the local list with what the backend has stored.
    pub async fn load(&self) -> Result<Vec<ApplianceUsage>, ApiError> {
        let stored = self
            .backend
            .list_appliances()
            .await
            .map_err(|err| self.notice(NoticeContext::Appliances, err))?;
        let loaded: Vec<ApplianceUsage> = stored.into_iter().map(|entry| entry.usage).collect();
        info!(count = loaded.len(), "appliances loaded");
        *self.appliances.lock().await = loaded.clone();
        Ok(loaded)
    }

    /// Adds a catalog appliance starting at the current local hour.
    pub async fn add(&self, name: &str, duration_hours: f64) -> Result<ApplianceUsage, ApiError> {
        // `hour()` is always in 0..24.
        let hour = Local::now().hour() as u8;
        self.add_at(name, duration_hours, hour).await
    }

    pub async fn add_at(
        &self,
        name: &str,
        duration_hours: f64,
        start_hour: u8,
    ) -> Result<ApplianceUsage, ApiError> {
        let (canonical, power_kw) = catalog_power_kw(name)
            .ok_or_else(|| ApiError::validation(format!("unknown appliance '{}'", name.trim())))?;
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return Err(ApiError::validation("duration must be a positive number of hours"));
        }
        if start_hour >= HOURS_PER_DAY {
            return Err(ApiError::validation(format!(
                "start hour {start_hour} is outside 0-23"
            )));
        }

        let usage = ApplianceUsage {
            appliance_name: canonical.to_string(),
            power_kw,
            start_time: start_hour,
            duration_hours,
        };
        self.appliances.lock().await.push(usage.clone());
        debug!(appliance = canonical, start_hour, duration_hours, "appliance added");
        Ok(usage)
    }

    pub async fn remove(&self, index: usize) -> Result<ApplianceUsage, ApiError> {
        let mut appliances = self.appliances.lock().await;
        if index >= appliances.len() {
            return Err(ApiError::validation(format!(
                "no appliance at position {index}"
            )));
        }
        Ok(appliances.remove(index))
    }

    /// Sends the full list to the backend, replacing what it has stored.
    pub async fn save(&self) -> Result<usize, ApiError> {
        let appliances = self.appliances().await;
        if appliances.is_empty() {
            return Err(ApiError::validation("add at least one appliance before saving"));
        }
        let response = self
            .backend
            .save_appliances(&appliances)
            .await
            .map_err(|err| self.notice(NoticeContext::Appliances, err))?;
        info!(count = appliances.len(), status = %response.status, "appliances saved");
        Ok(appliances.len())
    }

    pub async fn analyze(&self) -> Result<AnalysisResponse, ApiError> {
        let analysis = self
            .backend
            .analyze()
            .await
            .map_err(|err| self.notice(NoticeContext::Analysis, err))?;
        info!(
            daily_cost = analysis.summary.estimated_daily_cost,
            appliances = analysis.appliance_breakdown.len(),
            "usage analysis received"
        );
        Ok(analysis)
    }

    fn notice(&self, context: NoticeContext, err: ApiError) -> ApiError {
        warn!(?context, error = %err, "appliance request failed");
        publish_notice(&self.events, context, err.clone());
        err
    }
}

#[cfg(test)]
#[path = "tests/appliances_tests.rs"]
mod tests;
