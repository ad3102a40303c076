//! JSON result envelope.
//!
//! Every API response that carries a status code of its own uses the same
//! shape:
//!
//! ```json
//! {"code": 0, "message": "ok", "data": {...}}
//! ```
//!
//! `data` is omitted when absent. The HTTP status travels alongside the body
//! but is not serialized.

use std::fmt;

use http::StatusCode;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResult {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip)]
    http_status: u16,
}

// Error codes.
pub const CODE_OK: i64 = 0;
pub const CODE_INTERNAL_ERROR: i64 = -1;
pub const CODE_CONNECT_ERROR: i64 = 1001;
pub const CODE_SETTING_NIL_ERROR: i64 = 1002;

impl ApiResult {
    pub fn new(code: i64, message: impl Into<String>, http_status: StatusCode) -> Self {
        Self { code, message: message.into(), data: None, http_status: http_status.as_u16() }
    }

    /// `{"code":0,"message":"ok"}`, 200.
    pub fn ok_empty() -> Self {
        Self::new(CODE_OK, "ok", StatusCode::OK)
    }

    /// `{"code":0,"message":"ok","data":...}`, 200.
    pub fn ok(data: impl Serialize) -> Self {
        Self::ok_empty().with_data(data)
    }

    /// `{"code":-1,"message":"internal error"}`, 500. The payload every
    /// recovered panic answers with.
    pub fn internal_error() -> Self {
        Self::new(CODE_INTERNAL_ERROR, "internal error", StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn connect_error() -> Self {
        Self::new(CODE_CONNECT_ERROR, "connect error", StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn setting_nil_error() -> Self {
        Self::new(CODE_SETTING_NIL_ERROR, "setting is nil", StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn code(&self) -> i64 { self.code }
    pub fn message(&self) -> &str { &self.message }
    pub fn data(&self) -> Option<&serde_json::Value> { self.data.as_ref() }

    pub fn http_status(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attaches `data`. A value that cannot be represented as JSON is dropped.
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn with_http_status(mut self, status: StatusCode) -> Self {
        self.http_status = status.as_u16();
        self
    }
}

impl fmt::Display for ApiResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{{\"code\":{},\"message\":{:?}}}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiResult {}
