use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::AvoidHours,
    error::ApiError,
    protocol::{
        AnalysisResponse, ApplianceUsage, ChatRequest, ChatResponse, ComfortResponse,
        LivePricesResponse, PriceHistoryResponse, PreferencesResponse, SaveAppliancesResponse,
        SavePreferencesRequest, SavePreferencesResponse, StoredAppliance, TrainingAck,
        TrainingRequest, TrainingStatusResponse,
    },
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod appliances;
pub mod comfort;
pub mod config;
pub mod conversation;
pub mod debounce;
pub mod events;
pub mod gateway;
pub mod prices;
pub mod session;
pub mod training;

pub use appliances::{ApplianceController, APPLIANCE_CATALOG};
pub use comfort::{ComfortEstimationController, ComfortSnapshot};
pub use config::{load_settings, ClientSettings};
pub use conversation::{ConversationController, Greeting, SendOutcome};
pub use debounce::DebounceScheduler;
pub use events::{ClientEvent, Notice, NoticeContext, EVENT_CHANNEL_CAPACITY};
pub use gateway::ApiGateway;
pub use prices::{PriceMonitor, PriceSnapshot};
pub use session::{LocalStore, SessionStore, DEFAULT_SESSION_NAMESPACE};
pub use training::{StartOutcome, TrainingJobController, TrainingSnapshot};

/// Every backend call the client makes. [`ApiGateway`] is the HTTP
/// implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait EnergyBackend: Send + Sync {
    async fn get_preferences(&self) -> Result<PreferencesResponse, ApiError>;
    async fn save_preferences(
        &self,
        request: &SavePreferencesRequest,
    ) -> Result<SavePreferencesResponse, ApiError>;
    async fn calculate_comfort(&self, avoid_hours: &AvoidHours)
        -> Result<ComfortResponse, ApiError>;
    async fn start_training(&self, request: &TrainingRequest) -> Result<TrainingAck, ApiError>;
    async fn training_status(&self) -> Result<TrainingStatusResponse, ApiError>;
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;
    async fn live_prices(&self) -> Result<LivePricesResponse, ApiError>;
    async fn price_history(&self) -> Result<PriceHistoryResponse, ApiError>;
    async fn list_appliances(&self) -> Result<Vec<StoredAppliance>, ApiError>;
    async fn save_appliances(
        &self,
        appliances: &[ApplianceUsage],
    ) -> Result<SaveAppliancesResponse, ApiError>;
    async fn analyze(&self) -> Result<AnalysisResponse, ApiError>;
}

/// One client session: the controllers share a backend, an event channel and
/// a root cancellation token.
pub struct EnergyClient {
    settings: ClientSettings,
    comfort: ComfortEstimationController,
    training: TrainingJobController,
    conversation: ConversationController,
    prices: PriceMonitor,
    appliances: ApplianceController,
    session: SessionStore,
    events: broadcast::Sender<ClientEvent>,
    shutdown: CancellationToken,
}

impl EnergyClient {
    /// Builds a client talking HTTP to `settings.api_base_url`.
    pub fn connect(settings: &ClientSettings) -> Result<Self, ApiError> {
        let gateway = ApiGateway::from_settings(settings)?;
        info!(api_base_url = gateway.base_url(), "energy client configured");
        Ok(Self::with_backend(Arc::new(gateway), settings))
    }

    pub fn with_backend(backend: Arc<dyn EnergyBackend>, settings: &ClientSettings) -> Self {
        Self::with_local_store(backend, settings, LocalStore::new())
    }

    pub fn with_local_store(
        backend: Arc<dyn EnergyBackend>,
        settings: &ClientSettings,
        store: LocalStore,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        Self {
            settings: settings.clone(),
            comfort: ComfortEstimationController::new(
                Arc::clone(&backend),
                settings.comfort_debounce(),
                events.clone(),
                &shutdown,
            ),
            training: TrainingJobController::new(
                Arc::clone(&backend),
                settings.training_poll_interval(),
                events.clone(),
                &shutdown,
            ),
            conversation: ConversationController::with_greeting(
                Arc::clone(&backend),
                events.clone(),
                Greeting::default(),
            ),
            prices: PriceMonitor::new(
                Arc::clone(&backend),
                settings.live_price_refresh(),
                events.clone(),
                &shutdown,
            ),
            appliances: ApplianceController::new(backend, events.clone()),
            session: SessionStore::new(store, DEFAULT_SESSION_NAMESPACE),
            events,
            shutdown,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn comfort(&self) -> &ComfortEstimationController {
        &self.comfort
    }

    pub fn training(&self) -> &TrainingJobController {
        &self.training
    }

    pub fn conversation(&self) -> &ConversationController {
        &self.conversation
    }

    pub fn prices(&self) -> &PriceMonitor {
        &self.prices
    }

    pub fn appliances(&self) -> &ApplianceController {
        &self.appliances
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Starts agent training for the avoid-set currently being edited.
    pub async fn train_with_current_preferences(&self) -> Result<StartOutcome, ApiError> {
        let avoid_hours = self.comfort.snapshot().await.preferences.avoid_hours;
        self.training
            .start(TrainingRequest::for_avoid_hours(avoid_hours))
            .await
    }

    /// Clears this client's session keys, drops any scheduled comfort
    /// recompute and returns the chat transcript to its greeting.
    pub async fn logout(&self) {
        let removed = self.session.reset().await;
        let cancelled_recompute = self.comfort.cancel_pending().await;
        self.conversation.reset().await;
        info!(removed, cancelled_recompute, "logged out");
    }

    /// Cancels every timer and poll owned by this client. No state changes
    /// after this returns.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.comfort.shutdown().await;
        self.training.shutdown().await;
        self.prices.shutdown().await;
        info!("energy client shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for EnergyClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "tests/test_support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
