use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mercato_catalog::StockError;
use mercato_order::ServiceError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UnprocessableError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Validation(_) => AppError::ValidationError(message),
            ServiceError::Forbidden => AppError::AuthorizationError(message),
            ServiceError::NotFound(_) => AppError::NotFoundError(message),
            ServiceError::Conflict(_) => AppError::ConflictError(message),
            ServiceError::Stock(StockError::InsufficientStock(_)) => AppError::ConflictError(message),
            ServiceError::Stock(StockError::ProductNotFound(_) | StockError::InvalidQuantity { .. }) => {
                AppError::ValidationError(message)
            }
            ServiceError::Stock(StockError::Store(_)) | ServiceError::Repository(_) => {
                AppError::InternalServerError(message)
            }
            ServiceError::Transition(_) | ServiceError::Cancel(_) | ServiceError::Ineligible(_) => {
                AppError::UnprocessableError(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_order::{IneligibilityReason, TransitionError};
    use uuid::Uuid;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_service_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(status_of(ServiceError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ServiceError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_of(ServiceError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ServiceError::Conflict(id)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ServiceError::Stock(StockError::InsufficientStock(id))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Stock(StockError::ProductNotFound(id))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::Transition(TransitionError::AlreadyDelivered)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ServiceError::Ineligible(IneligibilityReason::WindowExpired)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
