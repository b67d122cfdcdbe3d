use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

use crate::{
    dto::reviews::{CreateReviewRequest, ReviewList, ReviewWithUser, UpdateReviewRequest},
    entity::{
        products::Entity as Products,
        reviews::{ActiveModel, Column, Entity as Reviews, Model as ReviewModel},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner},
    models::{OrderStatus, Review, UserSummary},
    response::{ApiResponse, Deleted, Meta},
    state::AppState,
};

const DUPLICATE_REVIEW: &str = "You have already reviewed this product";

pub async fn list_product_reviews(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<ReviewList>> {
    let reviews = Reviews::find()
        .filter(Column::ProductId.eq(product_id))
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?;

    let items = attach_users(state, reviews).await?;
    let meta = Meta::unpaged(items.len());
    Ok(ApiResponse::success("Reviews", ReviewList { items }, Some(meta)))
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<ReviewWithUser>> {
    let (Some(product_id), Some(rating)) = (payload.product_id, payload.rating) else {
        return Err(AppError::bad_request("Product ID and rating are required"));
    };
    validate_rating(rating)?;

    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    if !has_purchased(state, user.user_id, product_id).await? {
        return Err(AppError::forbidden(
            "You can only review products you have purchased",
        ));
    }

    let existing = Reviews::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::bad_request(DUPLICATE_REVIEW));
    }

    let now = Utc::now();
    let review = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(product_id),
        rating: Set(rating),
        comment: Set(payload.comment),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await
    .map_err(|err| match err.sql_err() {
        // Lost a race with a concurrent submission.
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::bad_request(DUPLICATE_REVIEW),
        _ => AppError::from(err),
    })?;

    tracing::info!(review_id = %review.id, product_id = %product_id, rating, "review created");
    let detail = with_user(state, review).await?;
    Ok(ApiResponse::ok("Review created", detail))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<ReviewWithUser>> {
    let existing = find_review(state, id).await?;
    ensure_owner(user, existing.user_id, "Not authorized to update this review")?;

    let mut active: ActiveModel = existing.into();
    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
        active.rating = Set(rating);
    }
    if let Some(comment) = payload.comment {
        active.comment = Set(Some(comment));
    }
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&state.orm).await?;

    let detail = with_user(state, review).await?;
    Ok(ApiResponse::ok("Review updated", detail))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Deleted>> {
    let existing = find_review(state, id).await?;
    ensure_owner(user, existing.user_id, "Not authorized to delete this review")?;

    existing.delete(&state.orm).await?;
    Ok(ApiResponse::ok("Review deleted successfully", Deleted { id }))
}

/// A buyer is eligible once any of their orders containing the product has
/// reached a purchased status.
async fn has_purchased(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
    let statuses: Vec<String> = OrderStatus::PURCHASED
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    let (eligible,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            WHERE o.user_id = $1
              AND oi.product_id = $2
              AND o.status = ANY($3)
        )
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(statuses)
    .fetch_one(&state.pool)
    .await?;
    Ok(eligible)
}

fn validate_rating(rating: i32) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::bad_request("Rating must be between 1 and 5"));
    }
    Ok(())
}

async fn find_review(state: &AppState, id: Uuid) -> AppResult<ReviewModel> {
    Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Review"))
}

async fn with_user(state: &AppState, review: ReviewModel) -> AppResult<ReviewWithUser> {
    attach_users(state, vec![review])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("review author missing")))
}

async fn attach_users(
    state: &AppState,
    reviews: Vec<ReviewModel>,
) -> AppResult<Vec<ReviewWithUser>> {
    let user_ids: Vec<Uuid> = reviews.iter().map(|r| r.user_id).collect();
    let users: HashMap<Uuid, UserSummary> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        Users::find()
            .filter(UserCol::Id.is_in(user_ids))
            .all(&state.orm)
            .await?
            .iter()
            .map(|u| (u.id, UserSummary::from(u)))
            .collect()
    };

    Ok(reviews
        .into_iter()
        .filter_map(|review| {
            let user = users.get(&review.user_id).cloned()?;
            Some(ReviewWithUser {
                review: Review::from(review),
                user,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds_are_inclusive() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }
}
