//! Events published by the controllers for the view layer.

use shared::{domain::ChatMessage, error::ApiError};
use tokio::sync::broadcast;

use crate::{
    comfort::ComfortSnapshot, prices::PriceSnapshot, training::TrainingSnapshot,
};

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ComfortUpdated(ComfortSnapshot),
    TrainingChanged(TrainingSnapshot),
    TranscriptAppended(ChatMessage),
    PricesUpdated(PriceSnapshot),
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeContext {
    LoadPreferences,
    SavePreferences,
    ComfortRecompute,
    TrainingStart,
    TrainingPoll,
    LivePrices,
    PriceHistory,
    Appliances,
    Analysis,
}

/// A recoverable failure the view layer may show and dismiss.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub context: NoticeContext,
    pub error: ApiError,
}

impl Notice {
    pub fn new(context: NoticeContext, error: ApiError) -> Self {
        Self { context, error }
    }
}

pub(crate) fn publish(events: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    // No subscribers is fine; the view layer may not be listening yet.
    let _ = events.send(event);
}

pub(crate) fn publish_notice(
    events: &broadcast::Sender<ClientEvent>,
    context: NoticeContext,
    error: ApiError,
) {
    publish(events, ClientEvent::Notice(Notice::new(context, error)));
}
