use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{CreateIntent, PaymentGateway, PaymentIntent};
use crate::config::StripeConfig;

/// Minimal Stripe PaymentIntents client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: Option<String>,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    fn secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| anyhow!("Stripe secret key is not configured"))
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let intent: PaymentIntent = serde_json::from_str(&body)?;
            return Ok(intent);
        }

        let detail = serde_json::from_str::<StripeErrorBody>(&body)
            .map(|e| {
                format!(
                    "{} - {}",
                    e.error.code.unwrap_or_else(|| "unknown".into()),
                    e.error.message.unwrap_or_default()
                )
            })
            .unwrap_or(body);
        tracing::error!(status = %status, detail = %detail, "stripe request failed");
        Err(anyhow!("Stripe error ({status}): {detail}"))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent> {
        let key = self.secret_key()?;
        let amount = request.amount.to_string();
        let order_id = request.order_id.to_string();
        let user_id = request.user_id.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("metadata[orderId]", order_id.as_str()),
            ("metadata[userId]", user_id.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_base))
            .bearer_auth(key)
            .form(&form)
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        tracing::info!(
            intent_id = %intent.id,
            amount = request.amount,
            order_id = %request.order_id,
            "stripe payment intent created"
        );
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let key = self.secret_key()?;
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(key)
            .send()
            .await?;

        Self::read_intent(response).await
    }
}
