use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::{
        products::{
            CreateProductRequest, ProductDetail, ProductList, ProductSummary, ProductWithImages,
            TentWithOwner, UpdateProductRequest,
        },
        reviews::ReviewWithUser,
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        product_images::{
            ActiveModel as ImageActive, Column as ImageCol, Entity as ProductImages,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        reviews::{Column as ReviewCol, Entity as Reviews},
        tents::{Column as TentCol, Entity as Tents, Model as TentModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner},
    models::{Product, ProductImage, Review, TentSummary, UserSummary},
    response::{ApiResponse, Deleted, Meta},
    routes::params::ProductQuery,
    state::AppState,
};

/// Average rating and review count. Products without reviews average 0.
pub fn rating_summary(ratings: &[i32]) -> (f64, i64) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = ratings.iter().map(|r| *r as i64).sum();
    (sum as f64 / ratings.len() as f64, ratings.len() as i64)
}

/// `ILIKE` pattern matching `search` as a literal substring. Backslash is
/// Postgres' default LIKE escape.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for ch in search.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(category) = query.category {
        condition = condition.add(Column::Category.eq(category));
    }

    if let Some(tent_id) = query.tent_id {
        condition = condition.add(Column::TentId.eq(tent_id));
    }

    if let Some(search) = query.search_term() {
        let pattern = contains_pattern(search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let finder = Products::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let products = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let mut images = load_images(&state.orm, &ids).await?;
    let ratings = load_ratings(&state.orm, &ids).await?;
    let tents = load_tents(&state.orm, products.iter().map(|p| p.tent_id)).await?;

    let mut items = Vec::with_capacity(products.len());
    for product in products {
        let tent = tents
            .get(&product.tent_id)
            .map(TentSummary::from)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("product without tent")))?;
        let (average_rating, review_count) =
            rating_summary(ratings.get(&product.id).map(Vec::as_slice).unwrap_or_default());
        items.push(ProductSummary {
            images: images.remove(&product.id).unwrap_or_default(),
            tent,
            average_rating,
            review_count,
            product: Product::from(product),
        });
    }

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let (product, tent) = Products::find_by_id(id)
        .find_also_related(Tents)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;
    let tent = tent.ok_or_else(|| AppError::not_found("Tent"))?;

    let owner = Users::find_by_id(tent.owner_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let images = product
        .find_related(ProductImages)
        .order_by_asc(ImageCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProductImage::from)
        .collect();

    let reviews: Vec<ReviewWithUser> = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product.id))
        .order_by_desc(ReviewCol::CreatedAt)
        .find_also_related(Users)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(review, user)| {
            user.map(|u| ReviewWithUser {
                user: UserSummary::from(&u),
                review: Review::from(review),
            })
        })
        .collect();

    let ratings: Vec<i32> = reviews.iter().map(|r| r.review.rating).collect();
    let (average_rating, review_count) = rating_summary(&ratings);

    let detail = ProductDetail {
        product: Product::from(product),
        images,
        tent: TentWithOwner {
            id: tent.id,
            name: tent.name,
            owner: UserSummary::from(&owner),
        },
        reviews,
        average_rating,
        review_count,
    };

    Ok(ApiResponse::ok("Product", detail))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<ProductWithImages>> {
    let tent = Tents::find_by_id(payload.tent_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Tent"))?;
    ensure_owner(user, tent.owner_id, "Not authorized to add products to this tent")?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("Product name is required"));
    }
    let stock = payload.stock.unwrap_or(0);
    validate_price_and_stock(payload.price, stock)?;

    let txn = state.orm.begin().await?;
    let now = Utc::now();
    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        tent_id: Set(tent.id),
        name: Set(name),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(stock),
        category: Set(payload.category),
        details: Set(payload.details),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let images = insert_images(&txn, product.id, payload.images.unwrap_or_default()).await?;
    txn.commit().await?;

    tracing::info!(product_id = %product.id, tent_id = %tent.id, "product created");

    Ok(ApiResponse::ok(
        "Product created",
        ProductWithImages {
            product: Product::from(product),
            images,
        },
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<ProductWithImages>> {
    let (existing, tent) = find_with_tent(state, id).await?;
    ensure_owner(user, tent.owner_id, "Not authorized to update this product")?;

    validate_price_and_stock(
        payload.price.unwrap_or(existing.price),
        payload.stock.unwrap_or(existing.stock),
    )?;

    let txn = state.orm.begin().await?;
    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name.map(|n| n.trim().to_string()) {
        if name.is_empty() {
            return Err(AppError::bad_request("Product name is required"));
        }
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(category) = payload.category {
        active.category = Set(category);
    }
    if let Some(details) = payload.details {
        active.details = Set(Some(details));
    }
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;

    let images = match payload.images {
        Some(urls) => {
            ProductImages::delete_many()
                .filter(ImageCol::ProductId.eq(product.id))
                .exec(&txn)
                .await?;
            insert_images(&txn, product.id, urls).await?
        }
        None => product
            .find_related(ProductImages)
            .order_by_asc(ImageCol::CreatedAt)
            .all(&txn)
            .await?
            .into_iter()
            .map(ProductImage::from)
            .collect(),
    };
    txn.commit().await?;

    tracing::info!(product_id = %product.id, "product updated");

    Ok(ApiResponse::ok(
        "Updated",
        ProductWithImages {
            product: Product::from(product),
            images,
        },
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Deleted>> {
    let (existing, tent) = find_with_tent(state, id).await?;
    ensure_owner(user, tent.owner_id, "Not authorized to delete this product")?;

    let ordered = OrderItems::find()
        .filter(OrderItemCol::ProductId.eq(existing.id))
        .count(&state.orm)
        .await?;
    if ordered > 0 {
        return Err(AppError::bad_request(
            "Product has existing orders and cannot be deleted",
        ));
    }

    existing.delete(&state.orm).await?;
    tracing::info!(product_id = %id, "product deleted");

    Ok(ApiResponse::ok("Product deleted successfully", Deleted { id }))
}

async fn find_with_tent(state: &AppState, id: Uuid) -> AppResult<(ProductModel, TentModel)> {
    let (product, tent) = Products::find_by_id(id)
        .find_also_related(Tents)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;
    let tent = tent.ok_or_else(|| AppError::not_found("Tent"))?;
    Ok((product, tent))
}

fn validate_price_and_stock(price: Decimal, stock: i32) -> AppResult<()> {
    if price.is_sign_negative() {
        return Err(AppError::bad_request("Price must not be negative"));
    }
    if stock < 0 {
        return Err(AppError::bad_request("Stock must not be negative"));
    }
    Ok(())
}

async fn insert_images<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    urls: Vec<String>,
) -> AppResult<Vec<ProductImage>> {
    let mut images = Vec::with_capacity(urls.len());
    for url in urls.into_iter().filter(|u| !u.trim().is_empty()) {
        let image = ImageActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            url: Set(url),
            created_at: Set(Utc::now().into()),
        }
        .insert(conn)
        .await?;
        images.push(ProductImage::from(image));
    }
    Ok(images)
}

/// Images per product, oldest first so the cover image is stable.
pub(crate) async fn load_images<C: ConnectionTrait>(
    conn: &C,
    product_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<ProductImage>>> {
    let mut by_product: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
    if product_ids.is_empty() {
        return Ok(by_product);
    }
    let rows = ProductImages::find()
        .filter(ImageCol::ProductId.is_in(product_ids.iter().copied()))
        .order_by_asc(ImageCol::CreatedAt)
        .all(conn)
        .await?;
    for row in rows {
        by_product
            .entry(row.product_id)
            .or_default()
            .push(ProductImage::from(row));
    }
    Ok(by_product)
}

pub(crate) async fn load_tents<C: ConnectionTrait>(
    conn: &C,
    tent_ids: impl IntoIterator<Item = Uuid>,
) -> AppResult<HashMap<Uuid, TentModel>> {
    let mut ids: Vec<Uuid> = tent_ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let tents = Tents::find()
        .filter(TentCol::Id.is_in(ids))
        .all(conn)
        .await?;
    Ok(tents.into_iter().map(|t| (t.id, t)).collect())
}

async fn load_ratings<C: ConnectionTrait>(
    conn: &C,
    product_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<i32>>> {
    let mut by_product: HashMap<Uuid, Vec<i32>> = HashMap::new();
    if product_ids.is_empty() {
        return Ok(by_product);
    }
    let rows: Vec<(Uuid, i32)> = Reviews::find()
        .select_only()
        .column(ReviewCol::ProductId)
        .column(ReviewCol::Rating)
        .filter(ReviewCol::ProductId.is_in(product_ids.iter().copied()))
        .into_tuple()
        .all(conn)
        .await?;
    for (product_id, rating) in rows {
        by_product.entry(product_id).or_default().push(rating);
    }
    Ok(by_product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_summary_of_no_reviews_is_zero() {
        assert_eq!(rating_summary(&[]), (0.0, 0));
    }

    #[test]
    fn rating_summary_averages() {
        let (avg, count) = rating_summary(&[5, 4, 4]);
        assert_eq!(count, 3);
        assert!((avg - 13.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn search_pattern_escapes_like_wildcards() {
        assert_eq!(contains_pattern("rose"), "%rose%");
        assert_eq!(contains_pattern("50%"), r"%50\%%");
        assert_eq!(contains_pattern("a_b"), r"%a\_b%");
        assert_eq!(contains_pattern(r"c:\"), r"%c:\\%");
    }

    #[test]
    fn negative_price_and_stock_are_rejected() {
        assert!(validate_price_and_stock(Decimal::new(-1, 2), 0).is_err());
        assert!(validate_price_and_stock(Decimal::ZERO, -1).is_err());
        assert!(validate_price_and_stock(Decimal::new(1999, 2), 3).is_ok());
    }
}
