use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{AvoidHours, ChatRole, HOURS_PER_DAY};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesResponse {
    #[serde(default)]
    pub avoid_hours: AvoidHours,
    #[serde(default)]
    pub priority_appliances: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfort_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePreferencesRequest {
    pub avoid_hours: AvoidHours,
    pub priority_appliances: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePreferencesResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfort_level: Option<f64>,
    #[serde(default)]
    pub advice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComfortRequest {
    pub avoid_hours: AvoidHours,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComfortResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfort_level: Option<f64>,
    /// Backend-authored; displayed verbatim.
    #[serde(default)]
    pub advice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingAppliance {
    pub name: String,
    /// Hours.
    pub duration: f64,
    /// Watts.
    pub power: f64,
}

impl TrainingAppliance {
    pub fn new(name: impl Into<String>, duration: f64, power: f64) -> Self {
        Self {
            name: name.into(),
            duration,
            power,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub prices: Vec<f64>,
    pub appliances: Vec<TrainingAppliance>,
    pub avoid_hours: AvoidHours,
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

impl TrainingRequest {
    /// Default training payload: a smooth 24-hour price curve and the standard
    /// laundry/kitchen appliance set.
    pub fn for_avoid_hours(avoid_hours: AvoidHours) -> Self {
        let prices = (0..HOURS_PER_DAY)
            .map(|hour| {
                let phase = f64::from(hour) / f64::from(HOURS_PER_DAY) * std::f64::consts::TAU;
                phase.sin() * 0.5 + 0.5
            })
            .collect();
        Self {
            prices,
            appliances: vec![
                TrainingAppliance::new("Washing Machine", 2.0, 2000.0),
                TrainingAppliance::new("Dryer", 3.0, 5000.0),
                TrainingAppliance::new("Dishwasher", 2.5, 1800.0),
            ],
            avoid_hours,
            preferences: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStatusResponse {
    pub is_training: bool,
    #[serde(default)]
    pub progress: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Model,
}

impl From<ChatRole> for HistoryRole {
    fn from(value: ChatRole) -> Self {
        match value {
            ChatRole::User => HistoryRole::User,
            ChatRole::Assistant => HistoryRole::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivePricesResponse {
    #[serde(default)]
    pub prices: Vec<f64>,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceHistoryResponse {
    #[serde(default)]
    pub history: Vec<PricePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceUsage {
    pub appliance_name: String,
    pub power_kw: f64,
    /// Hour of day the appliance starts.
    pub start_time: u8,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAppliance {
    pub id: i64,
    #[serde(flatten)]
    pub usage: ApplianceUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAppliancesResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default)]
    pub total_power_kw: f64,
    #[serde(default)]
    pub estimated_daily_usage_kwh: f64,
    #[serde(default)]
    pub estimated_daily_cost: f64,
    #[serde(default)]
    pub average_price_per_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceBreakdown {
    pub name: String,
    pub power: f64,
    pub duration: f64,
    pub start_time: String,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub summary: AnalysisSummary,
    #[serde(default)]
    pub appliance_breakdown: Vec<ApplianceBreakdown>,
    #[serde(default)]
    pub peak_hours: Vec<Value>,
}

/// Error body shape used by the backend for non-2xx answers.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}
