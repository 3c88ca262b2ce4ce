use axum::response::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::{errors, handlers, services};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courseware API",
        version = "1.0.0",
        description = r#"
# Courseware Marketplace API

Order pricing, payment orchestration and settlement for an online course store.

## Flow

1. `POST /api/v1/orders` prices the cart (products, courses, bundles, optional coupon)
   and returns the pending order. Free orders are settled immediately.
2. `POST /api/v1/payments/charge` opens a hosted checkout with the chosen gateway.
3. The gateway calls `POST /api/v1/payments/webhook/{provider}`; a verified success
   event settles the order exactly once.

## Authentication

User endpoints expect the `X-User-Id` header set by the upstream auth layer.
Webhooks are authenticated by the gateway's signature headers.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "Orders", description = "Cart pricing and order reads"),
        (name = "Payments", description = "Hosted checkout and gateway webhooks"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        handlers::orders::place_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::payments::create_charge,
        handlers::payments::payment_webhook,
        handlers::health::health_check,
    ),
    components(schemas(
        services::orders::PlaceOrderRequest,
        services::orders::PlacedOrder,
        services::orders::OrderResponse,
        services::orders::OrderListResponse,
        services::order_meta::CourseLine,
        services::order_meta::BundleLine,
        services::payments::ChargeOrderRequest,
        services::payments::ChargeResponse,
        services::payments::WebhookOutcome,
        handlers::health::HealthResponse,
        errors::ErrorResponse,
    )),
    modifiers(&UserHeader)
)]
pub struct ApiDocV1;

struct UserHeader;

impl Modify for UserHeader {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "UserId",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Id"))),
            );
        }
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
