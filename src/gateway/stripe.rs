use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{CreateIntentRequest, PaymentGateway, PaymentIntent};
use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Stripe REST client for payment intents
#[derive(Clone)]
pub struct StripeGateway {
    secret_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn read_intent(
        &self,
        response: reqwest::Response,
        intent_id: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<PaymentIntent>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .map(|b| b.error);
        let (message, code) = match detail {
            Some(d) => (d.message, d.code),
            None => (None, None),
        };
        let message = message.unwrap_or_else(|| format!("status {}", status));
        warn!(status = %status, code = ?code, "Stripe API error: {}", message);

        match (status, intent_id) {
            (reqwest::StatusCode::NOT_FOUND, Some(id)) => {
                Err(ServiceError::NotFound(format!("payment intent {}", id)))
            }
            _ => Err(ServiceError::ExternalServiceError(format!(
                "Stripe error: {}",
                message
            ))),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount = request.amount_minor, currency = %request.currency))]
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency),
            ("payment_method_types[]".to_string(), "card".to_string()),
        ];
        let mut metadata: Vec<_> = request.metadata.into_iter().collect();
        metadata.sort();
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value));
        }

        let response = self
            .client
            .post(self.url("payment_intents"))
            .basic_auth(&self.secret_key, Some(""))
            .form(&params)
            .send()
            .await?;

        let intent = self.read_intent(response, None).await?;
        info!("PaymentIntent created: {}", intent.id);
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError> {
        if intent_id.is_empty() || !intent_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ServiceError::ValidationError(
                "invalid payment intent id".to_string(),
            ));
        }

        let response = self
            .client
            .get(self.url(&format!("payment_intents/{}", intent_id)))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await?;

        self.read_intent(response, Some(intent_id)).await
    }
}
