mod common;

use std::{str::FromStr, sync::Arc};

use gift_marketplace_api::{
    db::{create_pool, run_migrations},
    dto::{
        auth::RegisterRequest,
        orders::{CreateOrderRequest, OrderItemInput, UpdateOrderStatusRequest},
        payments::{CashOnDeliveryRequest, ConfirmPaymentRequest, CreateIntentRequest},
        products::CreateProductRequest,
        reviews::CreateReviewRequest,
        tents::CreateTentRequest,
    },
    entity::{
        orders::Entity as Orders,
        payments::{Column as PaymentCol, Entity as Payments},
        products::Entity as Products,
    },
    error::AppError,
    gateway::webhook::compute_signature,
    middleware::auth::AuthUser,
    models::{Category, OrderStatus, PaymentStatus},
    routes::params::ProductQuery,
    services::{
        auth_service, order_service, payment_service, product_service, review_service,
        tent_service,
    },
    state::AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use common::{FakeGateway, WEBHOOK_SECRET, test_config, test_state};

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

fn line(product_id: Uuid, quantity: i32) -> OrderItemInput {
    OrderItemInput {
        product_id,
        quantity,
        price: None,
        customized_message: Some("Happy birthday!".into()),
        customized_photo_url: None,
    }
}

fn order_of(product_id: Uuid, quantity: i32, total: Option<&str>) -> CreateOrderRequest {
    CreateOrderRequest {
        items: vec![line(product_id, quantity)],
        total_amount: total.map(dec),
    }
}

fn assert_bad_request(err: AppError, expected: &str) {
    match err {
        AppError::BadRequest(message) => assert!(
            message.contains(expected),
            "expected {expected:?} in {message:?}"
        ),
        other => panic!("expected bad request, got {other:?}"),
    }
}

fn signed(body: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = compute_signature(WEBHOOK_SECRET, timestamp, body.as_bytes()).unwrap();
    format!("t={timestamp},v1={signature}")
}

// Integration flow: seller opens a tent, buyer orders against limited stock,
// pays by cash and by card, then reviews; seller moves the order along.
#[tokio::test]
async fn order_payment_and_review_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let gateway = Arc::new(FakeGateway::default());
    let state = setup_state(&database_url, gateway.clone()).await?;

    let seller = register(&state, "seller@example.com", "Seller").await?;
    let buyer = register(&state, "buyer@example.com", "Buyer").await?;
    let stranger = register(&state, "stranger@example.com", "Stranger").await?;

    let tent = tent_service::create_tent(
        &state,
        &seller,
        CreateTentRequest {
            name: "Sweet Surprises".into(),
            description: None,
            banner_image: None,
        },
    )
    .await?
    .data
    .unwrap();

    let roses = create_product(&state, &seller, tent.id, "Rose Box", "15.00", 2).await?;
    let truffles = create_product(&state, &seller, tent.id, "Truffles", "9.99", 5).await?;

    // Only the tent owner may list products in it.
    let err = product_service::create_product(
        &state,
        &stranger,
        CreateProductRequest {
            tent_id: tent.id,
            name: "Intruder".into(),
            description: String::new(),
            price: dec("1.00"),
            stock: Some(1),
            category: Category::Flowers,
            details: None,
            images: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Stock 2: ordering 3 fails, ordering 2 succeeds and empties stock.
    let err = order_service::create_order(&state, &buyer, order_of(roses, 3, None))
        .await
        .unwrap_err();
    assert_bad_request(err, "Insufficient stock for Rose Box. Available: 2");

    let order = order_service::create_order(&state, &buyer, order_of(roses, 2, Some("30.00")))
        .await?
        .data
        .unwrap();
    assert_eq!(order.order.status, OrderStatus::Pending);
    assert_eq!(order.order.total_amount, dec("30.00"));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].item.price, dec("15.00"));
    assert_eq!(order.items[0].product.tent.id, tent.id);
    assert_eq!(stock_of(&state, roses).await?, 0);

    let err = order_service::create_order(&state, &buyer, order_of(roses, 1, None))
        .await
        .unwrap_err();
    assert_bad_request(err, "Available: 0");

    // A client total that disagrees with the catalog leaves stock untouched.
    let err = order_service::create_order(&state, &buyer, order_of(truffles, 1, Some("0.50")))
        .await
        .unwrap_err();
    assert_bad_request(err, "does not match");
    assert_eq!(stock_of(&state, truffles).await?, 5);

    // Duplicate lines for one product are checked against stock together.
    let err = order_service::create_order(
        &state,
        &buyer,
        CreateOrderRequest {
            items: vec![line(truffles, 3), line(truffles, 3)],
            total_amount: None,
        },
    )
    .await
    .unwrap_err();
    assert_bad_request(err, "Insufficient stock for Truffles");

    let err = order_service::create_order(&state, &buyer, order_of(Uuid::new_v4(), 1, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Visibility: buyer and supplying seller only.
    let err = order_service::get_order(&state, &stranger, order.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let seen_by_seller = order_service::get_order(&state, &seller, order.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(seen_by_seller.user.unwrap().id, buyer.user_id);

    // No review before the order is paid.
    let err = review_service::create_review(&state, &buyer, review_of(roses, 5)).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Cash on delivery marks the order paid and is idempotent.
    let err = payment_service::cash_on_delivery(
        &state,
        &stranger,
        CashOnDeliveryRequest { order_id: order.order.id },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let first = payment_service::cash_on_delivery(
        &state,
        &buyer,
        CashOnDeliveryRequest { order_id: order.order.id },
    )
    .await?
    .data
    .unwrap();
    let second = payment_service::cash_on_delivery(
        &state,
        &buyer,
        CashOnDeliveryRequest { order_id: order.order.id },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(first.payment.id, second.payment.id);
    assert_eq!(first.payment.status, PaymentStatus::Pending);
    assert_eq!(order_status(&state, order.order.id).await?, OrderStatus::Paid);
    let cod_rows = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.order.id))
        .count(&state.orm)
        .await?;
    assert_eq!(cod_rows, 1);

    // Reviews: allowed once purchased, one per buyer, rating in range.
    let err = review_service::create_review(&state, &buyer, review_of(roses, 6)).await.unwrap_err();
    assert_bad_request(err, "between 1 and 5");
    let review = review_service::create_review(&state, &buyer, review_of(roses, 5))
        .await?
        .data
        .unwrap();
    assert_eq!(review.user.id, buyer.user_id);
    let err = review_service::create_review(&state, &buyer, review_of(roses, 4)).await.unwrap_err();
    assert_bad_request(err, "already reviewed");

    // Catalog filters and rating summary.
    let rose_hits = catalog(
        &state,
        ProductQuery {
            search: Some("rose".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(rose_hits.len(), 1);
    assert_eq!(rose_hits[0].product.id, roses);
    assert_eq!(rose_hits[0].review_count, 1);
    assert!((rose_hits[0].average_rating - 5.0).abs() < f64::EPSILON);
    assert_eq!(rose_hits[0].images.len(), 1);

    for wildcard in ["%", "_"] {
        let hits = catalog(
            &state,
            ProductQuery {
                search: Some(wildcard.into()),
                ..Default::default()
            },
        )
        .await?;
        assert!(hits.is_empty(), "search {wildcard:?} matched {} products", hits.len());
    }

    let in_tent = catalog(
        &state,
        ProductQuery {
            tent_id: Some(tent.id),
            category: Some(Category::CustomGift),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(in_tent.len(), 2);
    let flowers = catalog(
        &state,
        ProductQuery {
            category: Some(Category::Flowers),
            ..Default::default()
        },
    )
    .await?;
    assert!(flowers.is_empty());

    let pricey = catalog(
        &state,
        ProductQuery {
            min_price: Some(dec("10.00")),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(pricey.len(), 1);
    assert_eq!(pricey[0].product.id, roses);
    let cheap = catalog(
        &state,
        ProductQuery {
            max_price: Some(dec("10.00")),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(cheap.len(), 1);
    assert_eq!(cheap[0].product.id, truffles);
    assert_eq!(cheap[0].review_count, 0);
    assert_eq!(cheap[0].average_rating, 0.0);

    // Lifecycle: only the seller moves the order, and only forward.
    let err = order_service::update_order_status(&state, &buyer, order.order.id, status("SHIPPED"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = order_service::update_order_status(&state, &seller, order.order.id, status("PENDING"))
        .await
        .unwrap_err();
    assert_bad_request(err, "Cannot change order status from PAID to PENDING");
    let shipped = order_service::update_order_status(&state, &seller, order.order.id, status("shipped"))
        .await?
        .data
        .unwrap();
    assert_eq!(shipped.order.status, OrderStatus::Shipped);

    let tent_orders = order_service::list_tent_orders(&state, &seller, tent.id)
        .await?
        .data
        .unwrap();
    assert!(tent_orders.items.iter().any(|o| o.order.id == order.order.id));
    let err = order_service::list_tent_orders(&state, &stranger, tent.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Card payment settled by webhook.
    let card_order = order_service::create_order(&state, &buyer, order_of(truffles, 1, None))
        .await?
        .data
        .unwrap();
    let intent = payment_service::create_intent(
        &state,
        &buyer,
        CreateIntentRequest { order_id: card_order.order.id },
    )
    .await?
    .data
    .unwrap();
    assert!(intent.client_secret.is_some());
    let payment = Payments::find_by_id(intent.payment_id).one(&state.orm).await?.unwrap();
    let intent_id = payment.transaction_id.clone().unwrap();
    let settled_payment_id = intent.payment_id;
    let settled_intent_id = intent_id.clone();

    let unknown = r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_unknown"}}}"#;
    let ack = payment_service::handle_webhook(&state, Some(&signed(unknown)), unknown.as_bytes()).await?;
    assert!(ack.received);
    assert_eq!(order_status(&state, card_order.order.id).await?, OrderStatus::Pending);

    let event = format!(
        r#"{{"id":"evt_1","type":"payment_intent.succeeded","data":{{"object":{{"id":"{intent_id}"}}}}}}"#
    );
    payment_service::handle_webhook(&state, Some(&signed(&event)), event.as_bytes()).await?;
    assert_eq!(order_status(&state, card_order.order.id).await?, OrderStatus::Paid);
    let settled = Payments::find_by_id(intent.payment_id).one(&state.orm).await?.unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);

    // Replaying the event changes nothing.
    payment_service::handle_webhook(&state, Some(&signed(&event)), event.as_bytes()).await?;
    assert_eq!(order_status(&state, card_order.order.id).await?, OrderStatus::Paid);

    // Card payment confirmed by the buyer.
    let confirm_order = order_service::create_order(&state, &buyer, order_of(truffles, 1, None))
        .await?
        .data
        .unwrap();
    let intent = payment_service::create_intent(
        &state,
        &buyer,
        CreateIntentRequest { order_id: confirm_order.order.id },
    )
    .await?
    .data
    .unwrap();
    let intent_id = Payments::find_by_id(intent.payment_id)
        .one(&state.orm)
        .await?
        .unwrap()
        .transaction_id
        .unwrap();

    let err = payment_service::confirm_payment(
        &state,
        &buyer,
        ConfirmPaymentRequest {
            payment_id: intent.payment_id,
            payment_intent_id: intent_id.clone(),
        },
    )
    .await
    .unwrap_err();
    assert_bad_request(err, "Payment not successful");

    gateway.succeed(&intent_id);
    let err = payment_service::confirm_payment(
        &state,
        &buyer,
        ConfirmPaymentRequest {
            payment_id: intent.payment_id,
            payment_intent_id: "pi_someone_else".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let err = payment_service::confirm_payment(
        &state,
        &stranger,
        ConfirmPaymentRequest {
            payment_id: intent.payment_id,
            payment_intent_id: intent_id.clone(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let confirmed = payment_service::confirm_payment(
        &state,
        &buyer,
        ConfirmPaymentRequest {
            payment_id: intent.payment_id,
            payment_intent_id: intent_id,
        },
    )
    .await?
    .data
    .unwrap();
    assert!(confirmed.success);
    assert_eq!(confirmed.payment.status, PaymentStatus::Completed);
    assert_eq!(order_status(&state, confirm_order.order.id).await?, OrderStatus::Paid);

    // Paid orders cannot start another card payment.
    let err = payment_service::create_intent(
        &state,
        &buyer,
        CreateIntentRequest { order_id: confirm_order.order.id },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mine = order_service::list_my_orders(&state, &buyer, Default::default())
        .await?
        .data
        .unwrap();
    assert_eq!(mine.items.len(), 3);
    assert_eq!(mine.items[0].order.id, confirm_order.order.id);

    // A failed card payment cancels its order.
    let failed_order = order_service::create_order(&state, &buyer, order_of(truffles, 1, None))
        .await?
        .data
        .unwrap();
    let intent = payment_service::create_intent(
        &state,
        &buyer,
        CreateIntentRequest { order_id: failed_order.order.id },
    )
    .await?
    .data
    .unwrap();
    let failed_intent_id = Payments::find_by_id(intent.payment_id)
        .one(&state.orm)
        .await?
        .unwrap()
        .transaction_id
        .unwrap();
    let event = failure_event(&failed_intent_id);
    let ack = payment_service::handle_webhook(&state, Some(&signed(&event)), event.as_bytes()).await?;
    assert!(ack.received);
    let failed = Payments::find_by_id(intent.payment_id).one(&state.orm).await?.unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(order_status(&state, failed_order.order.id).await?, OrderStatus::Cancelled);

    // A late failure for an already settled payment is ignored.
    let event = failure_event(&settled_intent_id);
    payment_service::handle_webhook(&state, Some(&signed(&event)), event.as_bytes()).await?;
    let settled = Payments::find_by_id(settled_payment_id).one(&state.orm).await?.unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert_eq!(order_status(&state, card_order.order.id).await?, OrderStatus::Paid);

    // Ordered products and their tent cannot be removed.
    let err = product_service::delete_product(&state, &seller, roses).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let err = tent_service::delete_tent(&state, &seller, tent.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

async fn setup_state(database_url: &str, gateway: Arc<FakeGateway>) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE reviews, payments, order_items, orders, product_images, products, tents, users CASCADE",
    )
    .execute(&pool)
    .await?;

    Ok(test_state(
        pool,
        test_config(database_url, Some(WEBHOOK_SECRET)),
        gateway,
    ))
}

async fn register(state: &AppState, email: &str, name: &str) -> anyhow::Result<AuthUser> {
    let resp = auth_service::register_user(
        state,
        RegisterRequest {
            email: email.into(),
            password: "password123".into(),
            name: name.into(),
        },
    )
    .await?;
    Ok(AuthUser {
        user_id: resp.data.unwrap().user.id,
    })
}

async fn create_product(
    state: &AppState,
    seller: &AuthUser,
    tent_id: Uuid,
    name: &str,
    price: &str,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let resp = product_service::create_product(
        state,
        seller,
        CreateProductRequest {
            tent_id,
            name: name.into(),
            description: "Gift".into(),
            price: dec(price),
            stock: Some(stock),
            category: Category::CustomGift,
            details: None,
            images: Some(vec![format!("https://img.example.com/{name}.jpg")]),
        },
    )
    .await?;
    Ok(resp.data.unwrap().product.id)
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id).one(&state.orm).await?.unwrap();
    Ok(product.stock)
}

async fn order_status(state: &AppState, order_id: Uuid) -> anyhow::Result<OrderStatus> {
    let order = Orders::find_by_id(order_id).one(&state.orm).await?.unwrap();
    Ok(order.status)
}

async fn catalog(
    state: &AppState,
    query: ProductQuery,
) -> anyhow::Result<Vec<gift_marketplace_api::dto::products::ProductSummary>> {
    let resp = product_service::list_products(state, query).await?;
    Ok(resp.data.unwrap().items)
}

fn failure_event(intent_id: &str) -> String {
    format!(
        r#"{{"id":"evt_failed","type":"payment_intent.payment_failed","data":{{"object":{{"id":"{intent_id}"}}}}}}"#
    )
}

fn review_of(product_id: Uuid, rating: i32) -> CreateReviewRequest {
    CreateReviewRequest {
        product_id: Some(product_id),
        rating: Some(rating),
        comment: Some("Lovely".into()),
    }
}

fn status(value: &str) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status: value.into(),
    }
}
