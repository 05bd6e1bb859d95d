//! Error taxonomy and response classification.
//!
//! The API signals failures with one of two JSON envelopes:
//! - server side (gateway): `{"fault": {"faultstring": "...", "detail": {"errorcode": "..."}}}`
//! - client side (application): `{"message": "...", "data": ...}`
//!
//! [`response_error_check`] picks the envelope, looks the code up in a static table and
//! falls back to the `Other` kind for anything unlisted.

use http::StatusCode;
use log::warn;
use serde_json::Value;

use crate::transport::HttpResponse;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    InvalidAccessToken,
    QuotaViolation,
    AccessTokenExpired,
    Other,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ClientErrorKind {
    ValidateError,
    DeviceNotFound,
    DefinitionNotFound,
    SetupNotFound,
    SiteNotFound,
    Other,
}

pub static SERVER_ERRORS: &[(&str, ServerErrorKind)] = &[
    ("oauth.v2.InvalidAccessToken", ServerErrorKind::InvalidAccessToken),
    ("policies.ratelimit.QuotaViolation", ServerErrorKind::QuotaViolation),
    ("keymanagement.service.access_token_expired", ServerErrorKind::AccessTokenExpired),
];

pub static CLIENT_ERRORS: &[(&str, ClientErrorKind)] = &[
    ("ValidateError", ClientErrorKind::ValidateError),
    ("device_not_found", ClientErrorKind::DeviceNotFound),
    ("definition_not_found", ClientErrorKind::DefinitionNotFound),
    ("setup_not_found", ClientErrorKind::SetupNotFound),
    ("site_not_found", ClientErrorKind::SiteNotFound),
];

impl ServerErrorKind {
    pub fn from_code(code: &str) -> Self {
        SERVER_ERRORS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(ServerErrorKind::Other)
    }
}

impl ClientErrorKind {
    pub fn from_message(message: &str) -> Self {
        CLIENT_ERRORS
            .iter()
            .find(|(m, _)| *m == message)
            .map(|(_, kind)| *kind)
            .unwrap_or(ClientErrorKind::Other)
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// No token is held; run the authorization flow first.
    MissingAuth,
    /// The held access token is past its expiry. Raised before anything is sent.
    TokenExpired,
    Transport(String),
    /// Non-success status whose body matched neither error envelope.
    Http { status: u16, body: String },
    /// Token endpoint or authorization redirect failure.
    Auth(String),
    Server {
        kind: ServerErrorKind,
        error_code: String,
        fault_string: String,
    },
    Client {
        kind: ClientErrorKind,
        message: String,
        data: Value,
    },
    /// Response JSON did not match the expected record shape.
    Decode { path: String, message: String },
    Json(serde_json::Error),
    Io(String),
}

impl ApiError {
    pub fn server_kind(&self) -> Option<ServerErrorKind> {
        match self {
            ApiError::Server { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn client_kind(&self) -> Option<ClientErrorKind> {
        match self {
            ApiError::Client { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            ApiError::Server { error_code, .. } => Some(error_code),
            _ => None,
        }
    }

    pub fn fault_string(&self) -> Option<&str> {
        match self {
            ApiError::Server { fault_string, .. } => Some(fault_string),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Client { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ApiError::Client { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl core::fmt::Display for ApiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ApiError::MissingAuth => write!(f, "no OAuth token available; authorize first"),
            ApiError::TokenExpired => write!(f, "access token expired"),
            ApiError::Transport(s) => write!(f, "transport error: {}", s),
            ApiError::Http { status, body } => write!(f, "http {}: {}", status, body),
            ApiError::Auth(e) => write!(f, "auth error: {}", e),
            ApiError::Server {
                kind,
                error_code,
                fault_string,
            } => write!(
                f,
                "server error ({:?}): error_code: {}, fault_string: {}",
                kind, error_code, fault_string
            ),
            ApiError::Client { kind, message, data } => {
                write!(f, "client error ({:?}): message: {}, data: {}", kind, message, data)
            }
            ApiError::Decode { path, message } => write!(f, "decode error at {}: {}", path, message),
            ApiError::Json(e) => write!(f, "json error: {}", e),
            ApiError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::Json(value)
    }
}

impl From<ureq::Error> for ApiError {
    fn from(value: ureq::Error) -> Self {
        ApiError::Transport(value.to_string())
    }
}

/// Operator hint logged alongside a failed response. Only 401 carries one.
pub(crate) fn auth_advisory(status: StatusCode) -> Option<&'static str> {
    (status == StatusCode::UNAUTHORIZED)
        .then_some("myUplink rejected the stored credentials; delete the saved token and re-authenticate")
}

/// Classify a response. Status 200 always passes, whatever the body says.
pub fn response_error_check(response: &HttpResponse) -> Result<(), ApiError> {
    if response.status == StatusCode::OK {
        return Ok(());
    }
    if let Some(advice) = auth_advisory(response.status) {
        warn!("{}", advice);
    }

    if let Ok(Value::Object(body)) = serde_json::from_str::<Value>(&response.body) {
        if let Some(fault) = body.get("fault") {
            let error_code = fault
                .pointer("/detail/errorcode")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let fault_string = fault
                .get("faultstring")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(ApiError::Server {
                kind: ServerErrorKind::from_code(&error_code),
                error_code,
                fault_string,
            });
        }
        if let Some(message) = body.get("message") {
            let message = match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(ApiError::Client {
                kind: ClientErrorKind::from_message(&message),
                message,
                data: body.get("data").cloned().unwrap_or(Value::Null),
            });
        }
    }

    if response.status.is_client_error() || response.status.is_server_error() {
        return Err(ApiError::Http {
            status: response.status.as_u16(),
            body: response.body.clone(),
        });
    }
    Ok(())
}
