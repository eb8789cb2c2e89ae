//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relaybase_billing::BillingError;
use relaybase_shared::StoreError;
use serde_json::json;

use crate::membership::AdmissionError;
use crate::users::UserError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg.clone(),
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::PayloadTooLarge => "Payload too large".to_string(),
            ApiError::BadGateway(detail) => {
                tracing::warn!(error = %detail, "Upstream call failed");
                "Payment provider request failed".to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            StoreError::Database(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::WebhookSignatureInvalid
            | BillingError::InvalidPayload(_)
            | BillingError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            BillingError::PayloadTooLarge { .. } => ApiError::PayloadTooLarge,
            BillingError::RelayNotFound(_)
            | BillingError::UserNotFound(_)
            | BillingError::SubscriptionNotFound(_) => ApiError::NotFound(e.to_string()),
            BillingError::NotOwner => ApiError::Forbidden(e.to_string()),
            BillingError::ActiveSubscription(_) => ApiError::Conflict(e.to_string()),
            BillingError::StripeApi(detail) => ApiError::BadGateway(detail),
            BillingError::Config(detail) => ApiError::Internal(detail),
            BillingError::Store(store) => store.into(),
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::OwnerLimit { .. }
            | AdmissionError::SeatLimit { .. }
            | AdmissionError::NotRelayManager
            | AdmissionError::NotRelayOwner => ApiError::Forbidden(e.to_string()),
            AdmissionError::RelayNotFound(_)
            | AdmissionError::UserNotFound(_)
            | AdmissionError::InvitationNotFound => ApiError::NotFound(e.to_string()),
            AdmissionError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            AdmissionError::Billing(billing) => billing.into(),
            AdmissionError::Store(store) => store.into(),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::InvalidProfile(_) => ApiError::BadRequest(e.to_string()),
            UserError::UserNotFound(_) => ApiError::NotFound(e.to_string()),
            UserError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_internal_details_are_not_returned() {
        let response = ApiError::Internal("connection refused on 10.0.0.4".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], 500);
    }

    #[test]
    fn test_billing_status_mapping() {
        let cases = [
            (BillingError::WebhookSignatureInvalid, StatusCode::BAD_REQUEST),
            (
                BillingError::PayloadTooLarge { limit: 65536 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                BillingError::SubscriptionNotFound("sub_1".into()),
                StatusCode::NOT_FOUND,
            ),
            (BillingError::NotOwner, StatusCode::FORBIDDEN),
            (
                BillingError::ActiveSubscription("r".into()),
                StatusCode::CONFLICT,
            ),
            (BillingError::StripeApi("down".into()), StatusCode::BAD_GATEWAY),
            (
                BillingError::Store(StoreError::Database("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_admission_status_mapping() {
        assert_eq!(
            ApiError::from(AdmissionError::OwnerLimit { limit: 25 }).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AdmissionError::SeatLimit {
                relay: "r".into(),
                limit: 3
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AdmissionError::InvitationNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AdmissionError::Billing(BillingError::ActiveSubscription(
                "r".into()
            )))
            .status(),
            StatusCode::CONFLICT
        );
    }
}
