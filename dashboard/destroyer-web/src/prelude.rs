use actix_web::error::ResponseError;
use actix_web::http::{header, StatusCode};
use actix_web::{body::BoxBody, web::Json, HttpResponse};
use std::fmt::Display;
use thiserror::Error;

pub type WebResult<T> = core::result::Result<T, WebError>;
pub type JsonResult<T> = WebResult<Json<T>>;

pub trait IntoHttpError<T> {
    fn http_error(self, status_code: StatusCode, message: impl Display) -> WebResult<T>;

    fn http_internal_error(self, message: impl Display) -> WebResult<T>
    where
        Self: std::marker::Sized,
    {
        self.http_error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl<T, E: std::fmt::Debug> IntoHttpError<T> for core::result::Result<T, E> {
    fn http_error(self, status_code: StatusCode, message: impl Display) -> WebResult<T> {
        match self {
            Ok(val) => Ok(val),
            Err(err) => {
                tracing::error!("http_error: {:?}", err);
                Err(WebError::new(status_code, message))
            }
        }
    }
}

impl<T> IntoHttpError<T> for Option<T> {
    fn http_error(self, status_code: StatusCode, message: impl Display) -> WebResult<T> {
        self.ok_or_else(|| WebError::new(status_code, message))
    }
}

/// An error rendered to the client as `{"error": "<message>"}`.
#[derive(Error, Debug)]
#[error("{}", .message)]
pub struct WebError {
    status_code: StatusCode,
    message: String,
    retry_after: Option<f64>,
}

impl WebError {
    pub fn new(status_code: StatusCode, message: impl Display) -> Self {
        Self {
            status_code,
            message: message.to_string(),
            retry_after: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Not authenticated")
    }

    /// Sets the `Retry-After` header, in seconds, on the rendered response.
    pub fn with_retry_after(mut self, retry_after: Option<f64>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ResponseError for WebError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        let mut response = HttpResponse::build(self.status_code());
        if let Some(retry_after) = self.retry_after {
            let seconds = retry_after.max(0.0).ceil() as u64;
            response.insert_header((header::RETRY_AFTER, seconds.to_string()));
        }
        response.json(serde_json::json!({ "error": self.message }))
    }

    fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

pub async fn method_not_allowed() -> WebResult<HttpResponse> {
    Err(WebError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"))
}
