use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CreateOrderRequest, OrderDetail, OrderItemDetail, OrderItemInput, OrderList,
        OrderedProduct, UpdateOrderStatusRequest,
    },
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payments::{Column as PaymentCol, Entity as Payments},
        products::{self, Column as ProdCol, Entity as Products},
        tents::Column as TentCol,
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner},
    models::{Order, OrderItem, OrderStatus, OwnerSummary, Payment, Product, TentSummary},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::{
        product_service::{load_images, load_tents},
        tent_service::find_tent,
    },
    state::AppState,
};

/// Largest accepted gap between the client's total and the computed one.
const TOTAL_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let quantities = aggregate_quantities(&payload.items)?;

    let txn = state.orm.begin().await?;

    // Rows are locked in id order so concurrent checkouts cannot deadlock.
    let locked = Products::find()
        .filter(ProdCol::Id.is_in(quantities.keys().copied()))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    let locked: HashMap<Uuid, products::Model> = locked.into_iter().map(|p| (p.id, p)).collect();

    for (product_id, quantity) in &quantities {
        let product = locked
            .get(product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product {product_id} not found")))?;
        if product.stock < *quantity {
            return Err(AppError::bad_request(format!(
                "Insufficient stock for {}. Available: {}",
                product.name, product.stock
            )));
        }
    }

    let total_amount = payload
        .items
        .iter()
        .map(|item| locked[&item.product_id].price * Decimal::from(item.quantity))
        .sum::<Decimal>();
    verify_claimed_total(payload.total_amount, total_amount)?;

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    for item in &payload.items {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            price: Set(locked[&item.product_id].price),
            customized_message: Set(item.customized_message.clone()),
            customized_photo_url: Set(item.customized_photo_url.clone()),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
    }

    for (product_id, quantity) in &quantities {
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(now))
            .filter(ProdCol::Id.eq(*product_id))
            .filter(ProdCol::Stock.gte(*quantity))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            return Err(AppError::bad_request(format!(
                "Insufficient stock for product {product_id}"
            )));
        }
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        total = %order.total_amount,
        lines = payload.items.len(),
        "order created"
    );

    let mut details = build_details(&state.orm, vec![order], false).await?;
    let detail = details
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("created order vanished")))?;
    Ok(ApiResponse::ok("Order created", detail))
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let orders = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let items = build_details(&state.orm, orders, false).await?;
    let meta = Meta::unpaged(items.len());
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = find_order(&state.orm, id).await?;

    if !user.owns(order.user_id) && !supplies_order(&state.orm, order.id, user.user_id).await? {
        return Err(AppError::forbidden("Not authorized to view this order"));
    }

    let mut details = build_details(&state.orm, vec![order], true).await?;
    let detail = details.pop().ok_or_else(|| AppError::not_found("Order"))?;
    Ok(ApiResponse::ok("OK", detail))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let next: OrderStatus = payload.status.parse().map_err(AppError::BadRequest)?;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    if !supplies_order(&txn, order.id, user.user_id).await? {
        return Err(AppError::forbidden("Not authorized to update this order"));
    }

    let previous = order.status;
    let order = transition_order(&txn, order, next).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        from = %previous,
        to = %order.status,
        "order status updated"
    );

    let mut details = build_details(&state.orm, vec![order], false).await?;
    let detail = details.pop().ok_or_else(|| AppError::not_found("Order"))?;
    Ok(ApiResponse::ok("Order updated", detail))
}

pub async fn list_tent_orders(
    state: &AppState,
    user: &AuthUser,
    tent_id: Uuid,
) -> AppResult<ApiResponse<OrderList>> {
    let tent = find_tent(state, tent_id).await?;
    ensure_owner(user, tent.owner_id, "Not authorized to view these orders")?;

    let order_ids: Vec<Uuid> = OrderItems::find()
        .select_only()
        .column(OrderItemCol::OrderId)
        .distinct()
        .inner_join(Products)
        .filter(ProdCol::TentId.eq(tent.id))
        .into_tuple()
        .all(&state.orm)
        .await?;

    let orders = if order_ids.is_empty() {
        Vec::new()
    } else {
        Orders::find()
            .filter(OrderCol::Id.is_in(order_ids))
            .order_by_desc(OrderCol::CreatedAt)
            .all(&state.orm)
            .await?
    };

    let items = build_details(&state.orm, orders, true).await?;
    let meta = Meta::unpaged(items.len());
    Ok(ApiResponse::success("Tent orders", OrderList { items }, Some(meta)))
}

/// Move an order along the lifecycle table. Re-applying the current status
/// leaves the row untouched.
pub(crate) async fn transition_order<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    next: OrderStatus,
) -> AppResult<OrderModel> {
    if order.status == next {
        return Ok(order);
    }
    if !order.status.can_transition_to(next) {
        return Err(AppError::bad_request(format!(
            "Cannot change order status from {} to {}",
            order.status, next
        )));
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

pub(crate) async fn find_order<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))
}

/// Whether `user_id` owns the tent of at least one product in the order.
async fn supplies_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    user_id: Uuid,
) -> AppResult<bool> {
    let count = OrderItems::find()
        .inner_join(Products)
        .join(JoinType::InnerJoin, products::Relation::Tents.def())
        .filter(OrderItemCol::OrderId.eq(order_id))
        .filter(TentCol::OwnerId.eq(user_id))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Sum quantities per product. Keys are ordered, which fixes the lock order.
fn aggregate_quantities(items: &[OrderItemInput]) -> AppResult<BTreeMap<Uuid, i32>> {
    if items.is_empty() {
        return Err(AppError::bad_request("Order must contain at least one item"));
    }

    let mut quantities: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::bad_request("Item quantity must be positive"));
        }
        let entry = quantities.entry(item.product_id).or_insert(0);
        *entry = entry
            .checked_add(item.quantity)
            .ok_or_else(|| AppError::bad_request("Item quantity is too large"))?;
    }
    Ok(quantities)
}

fn verify_claimed_total(claimed: Option<Decimal>, computed: Decimal) -> AppResult<()> {
    match claimed {
        Some(claimed) if (claimed - computed).abs() > TOTAL_TOLERANCE => {
            Err(AppError::bad_request(format!(
                "Total amount {} does not match order items ({})",
                claimed.round_dp(2),
                computed
            )))
        }
        _ => Ok(()),
    }
}

/// Join items, products (with images and tent), payment and optionally the
/// buyer onto each order, preserving the input order.
async fn build_details<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
    include_user: bool,
) -> AppResult<Vec<OrderDetail>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }
    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids.clone()))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = items
        .iter()
        .map(|i| i.product_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let products: HashMap<Uuid, products::Model> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let images = load_images(conn, &product_ids).await?;
    let tents = load_tents(conn, products.values().map(|p| p.tent_id)).await?;

    let mut payments: HashMap<Uuid, Payment> = HashMap::new();
    for payment in Payments::find()
        .filter(PaymentCol::OrderId.is_in(order_ids))
        .order_by_asc(PaymentCol::CreatedAt)
        .all(conn)
        .await?
    {
        // Latest payment wins when a retry left more than one row.
        payments.insert(payment.order_id, Payment::from(payment));
    }

    let users: HashMap<Uuid, OwnerSummary> = if include_user {
        let user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
        Users::find()
            .filter(UserCol::Id.is_in(user_ids))
            .all(conn)
            .await?
            .iter()
            .map(|u| (u.id, OwnerSummary::from(u)))
            .collect()
    } else {
        HashMap::new()
    };

    let mut items_by_order: HashMap<Uuid, Vec<OrderItemDetail>> = HashMap::new();
    for item in items {
        let Some(product) = products.get(&item.product_id) else {
            continue;
        };
        let tent = tents
            .get(&product.tent_id)
            .map(TentSummary::from)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("product without tent")))?;
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(OrderItemDetail {
                product: OrderedProduct {
                    product: Product::from(product.clone()),
                    images: images.get(&product.id).cloned().unwrap_or_default(),
                    tent,
                },
                item: OrderItem::from(item),
            });
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderDetail {
            items: items_by_order.remove(&order.id).unwrap_or_default(),
            payment: payments.remove(&order.id),
            user: users.get(&order.user_id).cloned(),
            order: Order::from(order),
        })
        .collect())
}
