use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, RegisterRequest},
        orders::{
            CreateOrderRequest, OrderDetail, OrderItemDetail, OrderItemInput, OrderList,
            OrderedProduct, UpdateOrderStatusRequest,
        },
        payments::{
            CashOnDeliveryRequest, ConfirmPaymentRequest, CreateIntentRequest,
            CreateIntentResponse, PaymentResult, WebhookAck,
        },
        products::{
            CreateProductRequest, ProductDetail, ProductList, ProductSummary, ProductWithImages,
            TentWithOwner, UpdateProductRequest,
        },
        reviews::{CreateReviewRequest, ReviewList, ReviewWithUser, UpdateReviewRequest},
        tents::{CreateTentRequest, TentDetail, TentList, UpdateTentRequest},
    },
    error::ErrorBody,
    models::{
        Category, Order, OrderItem, OrderStatus, OwnerSummary, Payment, PaymentProvider,
        PaymentStatus, Product, ProductImage, Review, Tent, TentSummary, User, UserSummary,
    },
    response::{ApiResponse, Deleted, Meta},
    routes::{auth, health, orders, payments, products, reviews, tents},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Giftiy Marketplace API", description = "Tents, gifts, orders and payments"),
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        tents::list_tents,
        tents::my_tents,
        tents::get_tent,
        tents::create_tent,
        tents::update_tent,
        tents::delete_tent,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        orders::create_order,
        orders::my_orders,
        orders::get_order,
        orders::update_status,
        orders::tent_orders,
        payments::create_intent,
        payments::confirm,
        payments::cash_on_delivery,
        payments::webhook,
        reviews::product_reviews,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review
    ),
    components(
        schemas(
            User,
            UserSummary,
            OwnerSummary,
            Tent,
            TentSummary,
            Product,
            ProductImage,
            Category,
            Order,
            OrderItem,
            OrderStatus,
            Payment,
            PaymentProvider,
            PaymentStatus,
            Review,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            CreateTentRequest,
            UpdateTentRequest,
            TentDetail,
            TentList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductWithImages,
            ProductSummary,
            TentWithOwner,
            ProductDetail,
            ProductList,
            OrderItemInput,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderedProduct,
            OrderItemDetail,
            OrderDetail,
            OrderList,
            CreateIntentRequest,
            CreateIntentResponse,
            ConfirmPaymentRequest,
            CashOnDeliveryRequest,
            PaymentResult,
            WebhookAck,
            CreateReviewRequest,
            UpdateReviewRequest,
            ReviewWithUser,
            ReviewList,
            ErrorBody,
            Deleted,
            Meta,
            ApiResponse<OrderDetail>,
            ApiResponse<ProductDetail>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness endpoint"),
        (name = "Auth", description = "Registration, login and profile"),
        (name = "Tents", description = "Seller storefronts"),
        (name = "Products", description = "Gift catalog"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Card, cash on delivery and processor webhook"),
        (name = "Reviews", description = "Buyer reviews"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_marketplace_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/orders",
            "/api/orders/{id}/status",
            "/api/payments/webhook",
            "/api/tents/user/my-tents",
            "/api/reviews/product/{product_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
