use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

/// Failure half of the response envelope. Success responses carry
/// `{success, message, data}`; errors drop the data field.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("غير مصرح لك بتنفيذ هذا الإجراء")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("تم تجاوز الحد المسموح من الطلبات، حاول لاحقاً")]
    TooManyRequests,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("السجل المطلوب غير موجود".into()),
            RepoError::Conflict => {
                ApiError::Conflict("يوجد تعارض مع بيانات محفوظة مسبقاً".into())
            }
            RepoError::Internal(detail) => {
                // Raw backend errors never reach API clients.
                log::error!("repo failure: {detail}");
                ApiError::Internal("حدث خطأ في الخادم".into())
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody {
            success: false,
            message: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::bad_request("x").error_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Forbidden.error_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::not_found("x").error_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::conflict("x").error_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::internal("x").error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_is_unsuccessful() {
        let e = ApiError::bad_request("سبب غير معروف");
        assert_eq!(e.to_string(), "سبب غير معروف");
    }
}
