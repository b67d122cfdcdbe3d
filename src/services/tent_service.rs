use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    dto::{
        products::ProductWithImages,
        tents::{CreateTentRequest, TentDetail, TentList, UpdateTentRequest},
    },
    entity::{
        order_items::Entity as OrderItems,
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        tents::{ActiveModel, Column, Entity as Tents, Model as TentModel},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner},
    models::{OwnerSummary, Product, Tent},
    response::{ApiResponse, Deleted, Meta},
    services::product_service::load_images,
    state::AppState,
};

/// Products shown per tent on the public storefront listing.
const LISTING_PRODUCTS_PER_TENT: usize = 5;

pub async fn list_tents(state: &AppState) -> AppResult<ApiResponse<TentList>> {
    let tents = Tents::find()
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?;

    let owner_ids: Vec<Uuid> = tents.iter().map(|t| t.owner_id).collect();
    let owners: HashMap<Uuid, OwnerSummary> = Users::find()
        .filter(UserCol::Id.is_in(owner_ids))
        .all(&state.orm)
        .await?
        .iter()
        .map(|u| (u.id, OwnerSummary::from(u)))
        .collect();

    let mut products = products_for_tents(state, &tents, Some(LISTING_PRODUCTS_PER_TENT), true).await?;

    let items: Vec<TentDetail> = tents
        .into_iter()
        .map(|tent| TentDetail {
            owner: owners.get(&tent.owner_id).cloned(),
            products: products.remove(&tent.id).unwrap_or_default(),
            tent: Tent::from(tent),
        })
        .collect();

    let meta = Meta::unpaged(items.len());
    Ok(ApiResponse::success("Tents", TentList { items }, Some(meta)))
}

pub async fn get_tent(state: &AppState, id: Uuid) -> AppResult<ApiResponse<TentDetail>> {
    let (tent, owner) = Tents::find_by_id(id)
        .find_also_related(Users)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Tent"))?;

    let mut products = products_for_tents(state, std::slice::from_ref(&tent), None, false).await?;

    let detail = TentDetail {
        owner: owner.as_ref().map(OwnerSummary::from),
        products: products.remove(&tent.id).unwrap_or_default(),
        tent: Tent::from(tent),
    };
    Ok(ApiResponse::ok("Tent", detail))
}

pub async fn list_my_tents(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<TentList>> {
    let tents = Tents::find()
        .filter(Column::OwnerId.eq(user.user_id))
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?;

    let mut products = products_for_tents(state, &tents, None, true).await?;

    let items: Vec<TentDetail> = tents
        .into_iter()
        .map(|tent| TentDetail {
            owner: None,
            products: products.remove(&tent.id).unwrap_or_default(),
            tent: Tent::from(tent),
        })
        .collect();

    let meta = Meta::unpaged(items.len());
    Ok(ApiResponse::success("My tents", TentList { items }, Some(meta)))
}

pub async fn create_tent(
    state: &AppState,
    user: &AuthUser,
    payload: CreateTentRequest,
) -> AppResult<ApiResponse<Tent>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("Tent name is required"));
    }

    let now = Utc::now();
    let tent = ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(user.user_id),
        name: Set(name),
        description: Set(payload.description),
        banner_image: Set(payload.banner_image),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(tent_id = %tent.id, owner_id = %user.user_id, "tent created");
    Ok(ApiResponse::ok("Tent created", Tent::from(tent)))
}

pub async fn update_tent(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateTentRequest,
) -> AppResult<ApiResponse<Tent>> {
    let existing = find_tent(state, id).await?;
    ensure_owner(user, existing.owner_id, "Not authorized to update this tent")?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name.map(|n| n.trim().to_string()) {
        if name.is_empty() {
            return Err(AppError::bad_request("Tent name is required"));
        }
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(banner_image) = payload.banner_image {
        active.banner_image = Set(Some(banner_image));
    }
    active.updated_at = Set(Utc::now().into());
    let tent = active.update(&state.orm).await?;

    Ok(ApiResponse::ok("Tent updated", Tent::from(tent)))
}

pub async fn delete_tent(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Deleted>> {
    let existing = find_tent(state, id).await?;
    ensure_owner(user, existing.owner_id, "Not authorized to delete this tent")?;

    let ordered = OrderItems::find()
        .inner_join(Products)
        .filter(ProdCol::TentId.eq(existing.id))
        .count(&state.orm)
        .await?;
    if ordered > 0 {
        return Err(AppError::bad_request(
            "Tent has products with existing orders and cannot be deleted",
        ));
    }

    existing.delete(&state.orm).await?;
    tracing::info!(tent_id = %id, "tent deleted");

    Ok(ApiResponse::ok("Tent deleted successfully", Deleted { id }))
}

pub(crate) async fn find_tent(state: &AppState, id: Uuid) -> AppResult<TentModel> {
    Tents::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Tent"))
}

/// Products grouped by tent, newest first, optionally capped per tent and
/// optionally trimmed to their cover image.
async fn products_for_tents(
    state: &AppState,
    tents: &[TentModel],
    per_tent: Option<usize>,
    cover_only: bool,
) -> AppResult<HashMap<Uuid, Vec<ProductWithImages>>> {
    let tent_ids: Vec<Uuid> = tents.iter().map(|t| t.id).collect();
    if tent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let products: Vec<ProductModel> = Products::find()
        .filter(ProdCol::TentId.is_in(tent_ids))
        .order_by_desc(ProdCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<ProductModel>> = HashMap::new();
    for product in products {
        let bucket = grouped.entry(product.tent_id).or_default();
        if per_tent.is_none_or(|cap| bucket.len() < cap) {
            bucket.push(product);
        }
    }

    let ids: Vec<Uuid> = grouped.values().flatten().map(|p| p.id).collect();
    let mut images = load_images(&state.orm, &ids).await?;

    Ok(grouped
        .into_iter()
        .map(|(tent_id, products)| {
            let products = products
                .into_iter()
                .map(|p| {
                    let mut product_images = images.remove(&p.id).unwrap_or_default();
                    if cover_only {
                        product_images.truncate(1);
                    }
                    ProductWithImages {
                        product: Product::from(p),
                        images: product_images,
                    }
                })
                .collect();
            (tent_id, products)
        })
        .collect())
}
