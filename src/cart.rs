//! Buyer-side cart kept outside the database.
//!
//! Lines are keyed by product and customization, so the same product with
//! two different gift messages stays as two lines.

use std::{fs, path::Path};

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::orders::{CreateOrderRequest, OrderItemInput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub customized_message: Option<String>,
    #[serde(default)]
    pub customized_photo_url: Option<String>,
}

impl CartLine {
    fn same_key(&self, other: &CartLine) -> bool {
        self.matches(
            other.product_id,
            other.customized_message.as_deref(),
            other.customized_photo_url.as_deref(),
        )
    }

    fn matches(&self, product_id: Uuid, message: Option<&str>, photo_url: Option<&str>) -> bool {
        self.product_id == product_id
            && self.customized_message.as_deref() == message
            && self.customized_photo_url.as_deref() == photo_url
    }

    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line, merging quantities into an existing line with the same key.
    /// Non-positive quantities are ignored.
    pub fn add(&mut self, line: CartLine) {
        if line.quantity <= 0 {
            return;
        }
        match self.items.iter_mut().find(|l| l.same_key(&line)) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => self.items.push(line),
        }
    }

    /// Drop the line for `product_id` with exactly this customization.
    pub fn remove(&mut self, product_id: Uuid, message: Option<&str>, photo_url: Option<&str>) {
        self.items.retain(|l| !l.matches(product_id, message, photo_url));
    }

    /// Set the quantity of the line keyed by product and customization; zero or
    /// less removes it.
    pub fn update_quantity(
        &mut self,
        product_id: Uuid,
        message: Option<&str>,
        photo_url: Option<&str>,
        quantity: i32,
    ) {
        if quantity <= 0 {
            self.remove(product_id, message, photo_url);
            return;
        }
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|l| l.matches(product_id, message, photo_url))
        {
            line.quantity = quantity;
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartLine::subtotal).sum()
    }

    /// Number of units across all lines.
    pub fn count(&self) -> i64 {
        self.items.iter().map(|l| i64::from(l.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read a cart saved with [`Cart::save`]. A missing file is an empty cart.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading cart from {}", path.display()))?;
        let cart = serde_json::from_str(&raw)
            .with_context(|| format!("parsing cart in {}", path.display()))?;
        Ok(cart)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("writing cart to {}", path.display()))?;
        Ok(())
    }

    /// Checkout payload for `POST /api/orders`.
    pub fn to_order_request(&self) -> CreateOrderRequest {
        CreateOrderRequest {
            items: self
                .items
                .iter()
                .map(|l| OrderItemInput {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    price: Some(l.price),
                    customized_message: l.customized_message.clone(),
                    customized_photo_url: l.customized_photo_url.clone(),
                })
                .collect(),
            total_amount: Some(self.total()),
        }
    }
}
