use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::products::ProductWithImages,
    models::{OwnerSummary, Tent},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTentRequest {
    pub name: String,
    pub description: Option<String>,
    pub banner_image: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub banner_image: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TentDetail {
    #[serde(flatten)]
    pub tent: Tent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    pub products: Vec<ProductWithImages>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct TentList {
    #[schema(value_type = Vec<TentDetail>)]
    pub items: Vec<TentDetail>,
}
