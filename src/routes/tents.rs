use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::tents::{CreateTentRequest, TentDetail, TentList, UpdateTentRequest},
    error::{AppResult, ErrorBody},
    middleware::{auth::AuthUser, extract::{AppJson, AppPath}},
    models::Tent,
    response::{ApiResponse, Created, Deleted},
    services::tent_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tents).post(create_tent))
        .route("/user/my-tents", get(my_tents))
        .route("/{id}", get(get_tent).put(update_tent).delete(delete_tent))
}

#[utoipa::path(
    get,
    path = "/api/tents",
    responses(
        (status = 200, description = "Tents with owner and a product preview", body = ApiResponse<TentList>)
    ),
    tag = "Tents"
)]
pub async fn list_tents(State(state): State<AppState>) -> AppResult<Json<ApiResponse<TentList>>> {
    let resp = tent_service::list_tents(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/tents/user/my-tents",
    responses(
        (status = 200, description = "Tents owned by the caller", body = ApiResponse<TentList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Tents"
)]
pub async fn my_tents(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<TentList>>> {
    let resp = tent_service::list_my_tents(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/tents/{id}",
    params(("id" = Uuid, Path, description = "Tent ID")),
    responses(
        (status = 200, description = "Tent with all products", body = ApiResponse<TentDetail>),
        (status = 404, description = "Tent not found", body = ErrorBody)
    ),
    tag = "Tents"
)]
pub async fn get_tent(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<TentDetail>>> {
    let resp = tent_service::get_tent(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/tents",
    request_body = CreateTentRequest,
    responses(
        (status = 201, description = "Tent created", body = ApiResponse<Tent>),
        (status = 400, description = "Missing name", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tents"
)]
pub async fn create_tent(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateTentRequest>,
) -> AppResult<Created<Tent>> {
    let resp = tent_service::create_tent(&state, &user, payload).await?;
    Ok(Created(resp))
}

#[utoipa::path(
    put,
    path = "/api/tents/{id}",
    params(("id" = Uuid, Path, description = "Tent ID")),
    request_body = UpdateTentRequest,
    responses(
        (status = 200, description = "Tent updated", body = ApiResponse<Tent>),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Tent not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tents"
)]
pub async fn update_tent(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateTentRequest>,
) -> AppResult<Json<ApiResponse<Tent>>> {
    let resp = tent_service::update_tent(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/tents/{id}",
    params(("id" = Uuid, Path, description = "Tent ID")),
    responses(
        (status = 200, description = "Tent deleted", body = ApiResponse<Deleted>),
        (status = 400, description = "Tent has ordered products", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tents"
)]
pub async fn delete_tent(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let resp = tent_service::delete_tent(&state, &user, id).await?;
    Ok(Json(resp))
}
