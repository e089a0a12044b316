use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub trait IntoHttpError<T>: Sized {
    fn map_http_error(self, code: StatusCode) -> Result<T, HttpError>;

    fn map_500(self) -> Result<T, HttpError> {
        self.map_http_error(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl<T, E: std::fmt::Display> IntoHttpError<T> for Result<T, E> {
    fn map_http_error(self, code: StatusCode) -> Result<T, HttpError> {
        self.map_err(|e| {
            log::error!("{:#}", e);
            HttpError::new(code)
        })
    }
}

/// Failure reported to the client without internal details
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HttpError {
    code: StatusCode,
    message: &'static str,
}

impl HttpError {
    pub fn new(code: StatusCode) -> Self {
        let message = match code {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error",
            StatusCode::METHOD_NOT_ALLOWED => "Method not allowed",
            code => code.canonical_reason().unwrap_or("Error"),
        };
        Self { code, message }
    }
}

impl ResponseError for HttpError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.code).json(json!({ "message": self.message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hides_cause_behind_generic_message() {
        let result: Result<(), _> = Err(anyhow::anyhow!("redis://secret@host unreachable"));
        let error = result.map_500().unwrap_err();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_string(), "Internal server error");
    }

    #[test]
    fn other_codes_use_their_reason() {
        assert_eq!(
            HttpError::new(StatusCode::METHOD_NOT_ALLOWED).to_string(),
            "Method not allowed"
        );
        assert_eq!(HttpError::new(StatusCode::NOT_FOUND).to_string(), "Not Found");
    }
}
