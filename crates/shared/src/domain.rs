use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(MessageId);

pub const HOURS_PER_DAY: u8 = 24;
pub const DEFAULT_COMFORT_LEVEL: f64 = 5.0;
pub const MAX_COMFORT_LEVEL: f64 = 10.0;

/// Hours of the day (0-23) the user wants appliance usage scheduled away from.
///
/// Always sorted and free of duplicates; out-of-range hours are rejected at
/// construction and deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct AvoidHours(BTreeSet<u8>);

impl AvoidHours {
    pub fn new(hours: impl IntoIterator<Item = u8>) -> Result<Self, ApiError> {
        let mut set = BTreeSet::new();
        for hour in hours {
            validate_hour(hour)?;
            set.insert(hour);
        }
        Ok(Self(set))
    }

    pub fn contains(&self, hour: u8) -> bool {
        self.0.contains(&hour)
    }

    /// Flips membership of `hour`. Returns whether the hour is now avoided.
    pub fn toggle(&mut self, hour: u8) -> Result<bool, ApiError> {
        validate_hour(hour)?;
        if self.0.remove(&hour) {
            Ok(false)
        } else {
            self.0.insert(hour);
            Ok(true)
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

fn validate_hour(hour: u8) -> Result<(), ApiError> {
    if hour >= HOURS_PER_DAY {
        return Err(ApiError::validation(format!(
            "hour {hour} is outside 0..=23"
        )));
    }
    Ok(())
}

impl TryFrom<Vec<u8>> for AvoidHours {
    type Error = ApiError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AvoidHours> for Vec<u8> {
    fn from(value: AvoidHours) -> Self {
        value.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    NightSleeper,
    EarlyBird,
    NightOwl,
    NineToFive,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::NightSleeper,
        Preset::EarlyBird,
        Preset::NightOwl,
        Preset::NineToFive,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Preset::NightSleeper => "Night Sleeper",
            Preset::EarlyBird => "Early Bird",
            Preset::NightOwl => "Night Owl",
            Preset::NineToFive => "9-to-5",
        }
    }

    fn raw_hours(self) -> &'static [u8] {
        match self {
            Preset::NightSleeper => &[22, 23, 0, 1, 2, 3, 4, 5, 6],
            Preset::EarlyBird => &[20, 21, 22, 23],
            Preset::NightOwl => &[6, 7, 8, 9, 10, 11],
            Preset::NineToFive => &[0, 1, 2, 3, 4, 5, 6, 7, 21, 22, 23],
        }
    }

    pub fn hours(self) -> AvoidHours {
        AvoidHours(self.raw_hours().iter().copied().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub avoid_hours: AvoidHours,
    pub priority_appliances: Vec<String>,
    /// Server-computed, cached locally.
    pub comfort_level: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            avoid_hours: AvoidHours::default(),
            priority_appliances: Vec::new(),
            comfort_level: DEFAULT_COMFORT_LEVEL,
        }
    }
}

/// Normalizes a server-provided comfort score into `[0, 10]`.
pub fn normalize_comfort_level(raw: Option<f64>) -> f64 {
    match raw {
        Some(value) if value.is_finite() => value.clamp(0.0, MAX_COMFORT_LEVEL),
        _ => DEFAULT_COMFORT_LEVEL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Shown locally but never transmitted as chat history.
    #[serde(default)]
    pub local: bool,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
}

impl TrainingStatus {
    pub fn is_active(self) -> bool {
        matches!(self, TrainingStatus::Starting | TrainingStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub label: String,
    /// Currency per kWh.
    pub value: f64,
}

impl PriceSample {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBand {
    Low,
    Mid,
    High,
}

/// Ordered price samples. Aggregates are always computed from the samples so
/// they cannot drift from the source sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    samples: Vec<PriceSample>,
}

impl PriceSeries {
    pub fn new(samples: Vec<PriceSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn current(&self) -> Option<&PriceSample> {
        self.samples.last()
    }

    pub fn stats(&self) -> Option<PriceStats> {
        let first = self.samples.first()?.value;
        let (min, max, sum) = self.samples.iter().fold(
            (first, first, 0.0),
            |(min, max, sum), sample| (min.min(sample.value), max.max(sample.value), sum + sample.value),
        );
        Some(PriceStats {
            min,
            avg: sum / self.samples.len() as f64,
            max,
        })
    }

    /// Direction from the second-to-last sample to the last one.
    pub fn trend(&self) -> Trend {
        match self.samples.as_slice() {
            [.., previous, latest] if latest.value > previous.value => Trend::Up,
            [.., previous, latest] if latest.value < previous.value => Trend::Down,
            _ => Trend::Stable,
        }
    }

    /// Position of `value` between min and max as a percentage; 50 when flat.
    pub fn relative_position(&self, value: f64) -> f64 {
        match self.stats() {
            Some(stats) if stats.max > stats.min => {
                ((value - stats.min) / (stats.max - stats.min) * 100.0).clamp(0.0, 100.0)
            }
            _ => 50.0,
        }
    }

    pub fn band(&self, value: f64) -> PriceBand {
        let position = self.relative_position(value);
        if position < 33.0 {
            PriceBand::Low
        } else if position > 66.0 {
            PriceBand::High
        } else {
            PriceBand::Mid
        }
    }
}
