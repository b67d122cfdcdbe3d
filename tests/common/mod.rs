#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use gift_marketplace_api::{
    config::{AppConfig, StripeConfig, parse_origins},
    db::{DbPool, orm_from_pool},
    gateway::{CreateIntent, INTENT_SUCCEEDED, PaymentGateway, PaymentIntent},
    state::AppState,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-memory card processor. Intents start unpaid until `succeed` is called.
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl FakeGateway {
    pub fn succeed(&self, intent_id: &str) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = INTENT_SUCCEEDED.to_string();
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent> {
        let id = format!("pi_test_{}", Uuid::new_v4().simple());
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            status: "requires_payment_method".to_string(),
            amount: request.amount,
            currency: request.currency,
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| anyhow!("no such intent {intent_id}"))
    }
}

pub fn test_config(database_url: &str, webhook_secret: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: JWT_SECRET.to_string(),
        frontend_origins: parse_origins(None),
        stripe: StripeConfig {
            secret_key: None,
            webhook_secret: webhook_secret.map(str::to_string),
            api_base: "http://127.0.0.1:1".to_string(),
        },
    }
}

pub fn test_state(pool: DbPool, config: AppConfig, gateway: Arc<FakeGateway>) -> AppState {
    AppState {
        orm: orm_from_pool(&pool),
        pool,
        config: Arc::new(config),
        payments: gateway,
    }
}
