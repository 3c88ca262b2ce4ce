use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use bytes::Bytes;
use validator::Validate;

use super::validation_messages;
use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    payments::WebhookRequest,
    services::payments::{ChargeOrderRequest, ChargeResponse, WebhookOutcome},
    ApiResponse, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/payments/charge",
    summary = "Create charge",
    description = "Open a hosted checkout for a pending order and return its URL.",
    request_body = ChargeOrderRequest,
    responses(
        (status = 200, description = "Checkout created", body = ApiResponse<ChargeResponse>),
        (status = 400, description = "Unsupported payment method", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found or gateway refused the charge", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order completed or expired", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn create_charge(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ChargeOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChargeResponse>>), ServiceError> {
    if let Err(errors) = request.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::validation_errors(validation_messages(&errors))),
        ));
    }

    let charge = state.payments.create_charge(user.user_id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(charge))))
}

/// Gateways call this without user context; the signature is the credential.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook/{provider}",
    summary = "Payment webhook",
    description = "Signed gateway callback. Successful payments settle the order. Confirmations for settled or expired orders are stored and acknowledged; other events are ignored.",
    params(("provider" = String, Path, description = "Gateway name, e.g. yoco or stripe")),
    request_body(content = String, description = "Raw provider payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed", body = ApiResponse<WebhookOutcome>),
        (status = 400, description = "Unknown provider or malformed payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown charge", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookOutcome>>, ServiceError> {
    let request = WebhookRequest { headers, body };
    let outcome = state.payments.approve_order(&provider, request).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
