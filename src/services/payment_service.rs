use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::payments::{
        CashOnDeliveryRequest, ConfirmPaymentRequest, CreateIntentRequest, CreateIntentResponse,
        PaymentResult, WebhookAck,
    },
    entity::{
        orders::{Entity as Orders, Model as OrderModel},
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel,
        },
    },
    error::{AppError, AppResult},
    gateway::{
        CreateIntent, to_minor_units,
        webhook::{self, PAYMENT_FAILED, PAYMENT_SUCCEEDED, WebhookEvent},
    },
    middleware::auth::{AuthUser, ensure_owner},
    models::{OrderStatus, Payment, PaymentProvider, PaymentStatus},
    response::ApiResponse,
    services::order_service::{find_order, transition_order},
    state::AppState,
};

/// Currency recorded on payment rows.
const STORE_CURRENCY: &str = "USD";
/// Currency code sent to the card processor.
const PROCESSOR_CURRENCY: &str = "usd";

pub async fn create_intent(
    state: &AppState,
    user: &AuthUser,
    payload: CreateIntentRequest,
) -> AppResult<ApiResponse<CreateIntentResponse>> {
    let order = find_order(&state.orm, payload.order_id).await?;
    ensure_owner(user, order.user_id, "Not authorized")?;

    if order.status != OrderStatus::Pending {
        return Err(AppError::bad_request(format!(
            "Order is {} and cannot be paid",
            order.status
        )));
    }

    let amount = to_minor_units(order.total_amount)?;
    let intent = state
        .payments
        .create_intent(CreateIntent {
            amount,
            currency: PROCESSOR_CURRENCY.to_string(),
            order_id: order.id,
            user_id: user.user_id,
        })
        .await?;

    let now = Utc::now();
    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        amount: Set(order.total_amount),
        currency: Set(STORE_CURRENCY.to_string()),
        provider: Set(PaymentProvider::Stripe),
        status: Set(PaymentStatus::Pending),
        transaction_id: Set(Some(intent.id.clone())),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(
        payment_id = %payment.id,
        order_id = %order.id,
        intent_id = %intent.id,
        "card payment started"
    );

    Ok(ApiResponse::ok(
        "Payment intent created",
        CreateIntentResponse {
            client_secret: intent.client_secret,
            payment_id: payment.id,
        },
    ))
}

pub async fn confirm_payment(
    state: &AppState,
    user: &AuthUser,
    payload: ConfirmPaymentRequest,
) -> AppResult<ApiResponse<PaymentResult>> {
    let payment = Payments::find_by_id(payload.payment_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;
    let order = find_order(&state.orm, payment.order_id).await?;
    ensure_owner(user, order.user_id, "Not authorized")?;

    if payment.transaction_id.as_deref() != Some(payload.payment_intent_id.as_str()) {
        return Err(AppError::bad_request(
            "Payment intent does not belong to this payment",
        ));
    }

    let intent = state
        .payments
        .retrieve_intent(&payload.payment_intent_id)
        .await?;
    if !intent.is_succeeded() {
        tracing::warn!(
            payment_id = %payment.id,
            intent_status = %intent.status,
            "payment confirmation before success"
        );
        return Err(AppError::bad_request("Payment not successful"));
    }

    let txn = state.orm.begin().await?;
    let payment = complete_payment(&txn, payment.id).await?;
    let order = lock_order(&txn, payment.order_id).await?;
    transition_order(&txn, order, OrderStatus::Paid).await?;
    txn.commit().await?;

    tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, "card payment confirmed");

    Ok(ApiResponse::ok(
        "Payment confirmed",
        PaymentResult {
            success: true,
            payment: Payment::from(payment),
        },
    ))
}

pub async fn cash_on_delivery(
    state: &AppState,
    user: &AuthUser,
    payload: CashOnDeliveryRequest,
) -> AppResult<ApiResponse<PaymentResult>> {
    let txn = state.orm.begin().await?;
    let order = lock_order(&txn, payload.order_id).await?;
    ensure_owner(user, order.user_id, "Not authorized")?;

    let existing = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::Provider.eq(PaymentProvider::CashOnDelivery))
        .order_by_asc(PaymentCol::CreatedAt)
        .one(&txn)
        .await?;

    let payment = match existing {
        Some(payment) => {
            tracing::debug!(payment_id = %payment.id, "cash on delivery already recorded");
            payment
        }
        None => {
            let now = Utc::now();
            let payment = PaymentActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                amount: Set(order.total_amount),
                currency: Set(STORE_CURRENCY.to_string()),
                provider: Set(PaymentProvider::CashOnDelivery),
                status: Set(PaymentStatus::Pending),
                transaction_id: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(&txn)
            .await?;
            transition_order(&txn, order, OrderStatus::Paid).await?;
            tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, "cash on delivery recorded");
            payment
        }
    };
    txn.commit().await?;

    Ok(ApiResponse::ok(
        "Cash on delivery confirmed",
        PaymentResult {
            success: true,
            payment: Payment::from(payment),
        },
    ))
}

/// Verify and apply a processor event. Events for unknown transactions and
/// unhandled event types are acknowledged without changes.
pub async fn handle_webhook(
    state: &AppState,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<WebhookAck> {
    webhook::verify_signature(
        body,
        signature,
        state.config.stripe.webhook_secret.as_deref(),
        Utc::now().timestamp(),
    )
    .map_err(|err| {
        tracing::warn!(error = %err, "webhook signature verification failed");
        AppError::bad_request(format!("Webhook Error: {err}"))
    })?;

    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("Webhook Error: {err}")))?;

    let outcome = match event.event_type.as_str() {
        PAYMENT_SUCCEEDED => Some((PaymentStatus::Completed, OrderStatus::Paid)),
        PAYMENT_FAILED => Some((PaymentStatus::Failed, OrderStatus::Cancelled)),
        other => {
            tracing::info!(event_type = other, "unhandled webhook event");
            None
        }
    };

    if let (Some((payment_status, order_status)), Some(intent_id)) = (outcome, event.intent_id()) {
        apply_event(state, intent_id, payment_status, order_status).await?;
    }

    Ok(WebhookAck { received: true })
}

async fn apply_event(
    state: &AppState,
    intent_id: &str,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
) -> AppResult<()> {
    let txn = state.orm.begin().await?;
    let payment = Payments::find()
        .filter(PaymentCol::TransactionId.eq(intent_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let Some(payment) = payment else {
        tracing::info!(intent_id, "webhook for unknown transaction ignored");
        return Ok(());
    };

    if payment.status == PaymentStatus::Completed && payment_status == PaymentStatus::Failed {
        tracing::warn!(payment_id = %payment.id, "failure event for completed payment ignored");
        return Ok(());
    }

    let order_id = payment.order_id;
    if payment.status != payment_status {
        let mut active: PaymentActive = payment.into();
        active.status = Set(payment_status);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;
    }

    let order = lock_order(&txn, order_id).await?;
    let current = order.status;
    if current.can_transition_to(order_status) {
        transition_order(&txn, order, order_status).await?;
    } else {
        tracing::warn!(
            order_id = %order_id,
            from = %current,
            to = %order_status,
            "webhook status change skipped"
        );
    }

    txn.commit().await?;
    tracing::info!(intent_id, order_id = %order_id, status = %order_status, "webhook applied");
    Ok(())
}

async fn lock_order(txn: &DatabaseTransaction, id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))
}

async fn complete_payment(txn: &DatabaseTransaction, id: Uuid) -> AppResult<PaymentModel> {
    let payment = Payments::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;
    if payment.status == PaymentStatus::Completed {
        return Ok(payment);
    }

    let mut active: PaymentActive = payment.into();
    active.status = Set(PaymentStatus::Completed);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}
