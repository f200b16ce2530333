//! Typed HTTP access to the energy backend.
//!
//! The gateway owns the base URL and timeout and normalizes every failure into
//! [`ApiError`]. It never retries; callers decide what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::AvoidHours,
    error::ApiError,
    protocol::{
        AnalysisResponse, ApplianceUsage, ChatRequest, ChatResponse, ComfortRequest,
        ComfortResponse, ErrorBody, LivePricesResponse, PriceHistoryResponse,
        PreferencesResponse, SaveAppliancesResponse, SavePreferencesRequest,
        SavePreferencesResponse, StoredAppliance, TrainingAck, TrainingRequest,
        TrainingStatusResponse,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{config::ClientSettings, EnergyBackend};

pub struct ApiGateway {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url.trim()).map_err(|err| {
            ApiError::validation(format!("invalid api base url '{base_url}': {err}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::validation(format!(
                "api base url must start with http:// or https://, got '{base_url}'"
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ApiError> {
        Self::new(&settings.api_base_url, settings.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Issues one request and returns the decoded JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let (status, bytes) = self.send(method, path, body).await?;
        decode_body(status, &bytes)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (status, bytes) = self.send(Method::GET, path, None).await?;
        decode_body(status, &bytes)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|err| ApiError::validation(format!("failed to encode request body: {err}")))?;
        let (status, bytes) = self.send(Method::POST, path, Some(body)).await?;
        decode_body(status, &bytes)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Vec<u8>), ApiError> {
        debug!(method = %method, path, "api request");

        let mut request = self.http.request(method.clone(), self.endpoint(path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|err| {
            let error = self.map_transport_error(&err);
            warn!(method = %method, path, error = %error.message, "api request failed");
            error
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| {
            let error = self.map_transport_error(&err);
            warn!(method = %method, path, error = %error.message, "api response body failed");
            error
        })?;

        if !status.is_success() {
            let error = server_error(status, &bytes);
            warn!(
                method = %method,
                path,
                status = status.as_u16(),
                error = %error.message,
                "api request rejected"
            );
            return Err(error);
        }

        Ok((status, bytes.to_vec()))
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::transport(format!(
                "request timed out after {}s",
                self.timeout.as_secs_f64()
            ))
        } else {
            ApiError::transport(err.to_string())
        }
    }
}

fn decode_body<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> Result<T, ApiError> {
    // Acknowledgement-only endpoints may answer with an empty body.
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes
    };
    serde_json::from_slice(bytes).map_err(|err| {
        ApiError::server(status.as_u16(), format!("malformed response body: {err}"))
    })
}

fn server_error(status: StatusCode, bytes: &[u8]) -> ApiError {
    let detail = serde_json::from_slice::<ErrorBody>(bytes)
        .ok()
        .and_then(|body| body.detail)
        .filter(|detail| !detail.trim().is_empty());
    let message = detail.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });
    ApiError::server(status.as_u16(), message)
}

#[async_trait]
impl EnergyBackend for ApiGateway {
    async fn get_preferences(&self) -> Result<PreferencesResponse, ApiError> {
        self.get("/preferences").await
    }

    async fn save_preferences(
        &self,
        request: &SavePreferencesRequest,
    ) -> Result<SavePreferencesResponse, ApiError> {
        self.post("/preferences", request).await
    }

    async fn calculate_comfort(&self, avoid_hours: &AvoidHours) -> Result<ComfortResponse, ApiError> {
        self.post(
            "/calculate-comfort",
            &ComfortRequest {
                avoid_hours: avoid_hours.clone(),
            },
        )
        .await
    }

    async fn start_training(&self, request: &TrainingRequest) -> Result<TrainingAck, ApiError> {
        self.post("/train-agent", request).await
    }

    async fn training_status(&self) -> Result<TrainingStatusResponse, ApiError> {
        self.get("/training-status").await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        self.post("/chat", request).await
    }

    async fn live_prices(&self) -> Result<LivePricesResponse, ApiError> {
        self.get("/live-prices").await
    }

    async fn price_history(&self) -> Result<PriceHistoryResponse, ApiError> {
        self.get("/price-history").await
    }

    async fn list_appliances(&self) -> Result<Vec<StoredAppliance>, ApiError> {
        self.get("/appliances").await
    }

    async fn save_appliances(
        &self,
        appliances: &[ApplianceUsage],
    ) -> Result<SaveAppliancesResponse, ApiError> {
        self.post("/appliances", appliances).await
    }

    async fn analyze(&self) -> Result<AnalysisResponse, ApiError> {
        self.get("/analyze").await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
