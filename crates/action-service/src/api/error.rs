use crate::recognition::controller::ControllerError;
use crate::recognition::model_store::ModelStoreError;
use crate::state::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::{self, Display};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidFrame(_)
            | ServiceError::Params(_)
            | ServiceError::Model(ModelStoreError::InvalidName(_))
            | ServiceError::Controller(ControllerError::EmptyFrame { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Model(ModelStoreError::Classifier(_))
            | ServiceError::Model(ModelStoreError::NotFound { .. })
            | ServiceError::Model(ModelStoreError::Download { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Model(_)
            | ServiceError::Controller(ControllerError::Inference(_))
            | ServiceError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{}", err);
        } else {
            tracing::debug!("Rejected request: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}
