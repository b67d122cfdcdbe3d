use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::payments::{
        CashOnDeliveryRequest, ConfirmPaymentRequest, CreateIntentRequest, CreateIntentResponse,
        PaymentResult, WebhookAck,
    },
    error::{AppResult, ErrorBody},
    gateway::webhook::SIGNATURE_HEADER,
    middleware::{auth::AuthUser, extract::AppJson},
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

/// Bearer-authenticated payment endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-intent", post(create_intent))
        .route("/confirm", post(confirm))
        .route("/cod", post(cash_on_delivery))
}

/// Processor callbacks. Authenticated only by signature, so kept apart from
/// the bearer-protected routes.
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook))
}

#[utoipa::path(
    post,
    path = "/api/payments/create-intent",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Card payment started", body = ApiResponse<CreateIntentResponse>),
        (status = 400, description = "Order is not pending", body = ErrorBody),
        (status = 403, description = "Not the buyer", body = ErrorBody),
        (status = 404, description = "Order not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateIntentRequest>,
) -> AppResult<Json<ApiResponse<CreateIntentResponse>>> {
    let resp = payment_service::create_intent(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment completed and order paid", body = ApiResponse<PaymentResult>),
        (status = 400, description = "Intent mismatch or payment not successful", body = ErrorBody),
        (status = 403, description = "Not the buyer", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn confirm(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<ConfirmPaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentResult>>> {
    let resp = payment_service::confirm_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/cod",
    request_body = CashOnDeliveryRequest,
    responses(
        (status = 200, description = "Cash on delivery recorded", body = ApiResponse<PaymentResult>),
        (status = 403, description = "Not the buyer", body = ErrorBody),
        (status = 404, description = "Order not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn cash_on_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CashOnDeliveryRequest>,
) -> AppResult<Json<ApiResponse<PaymentResult>>> {
    let resp = payment_service::cash_on_delivery(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    request_body(content = String, content_type = "application/json", description = "Raw processor event"),
    params(("stripe-signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Signature verification failed", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = payment_service::handle_webhook(&state, signature, &body).await?;
    Ok(Json(ack))
}
