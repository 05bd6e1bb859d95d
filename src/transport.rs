//! HTTP transport seam.
//!
//! The client only needs "send this request, give me status + body". [`UreqTransport`] is the
//! blocking implementation used in production; tests swap in a scripted transport.

use std::time::Duration;

use http::{Method, StatusCode};
use log::debug;

use crate::error::ApiError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Json(String),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn json_body(mut self, json: String) -> Self {
        self.body = Some(RequestBody::Json(json));
        self
    }

    pub fn form_body(mut self, form: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(form));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

pub trait Transport {
    /// Perform the request. Non-2xx statuses are returned as responses, not errors;
    /// only connectivity-level failures become [`ApiError::Transport`].
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        UreqTransport { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (k, v) in headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    builder
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<RequestBody>,
) -> Result<http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(RequestBody::Json(json)) => builder.send(json),
        Some(RequestBody::Form(form)) => builder.send_form(form),
        None => builder.send_empty(),
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        debug!("{} {}", method, url);

        let result = if method == Method::GET {
            with_headers(self.agent.get(&url), &headers).call()
        } else if method == Method::POST {
            send_with_body(with_headers(self.agent.post(&url), &headers), body)
        } else if method == Method::PUT {
            send_with_body(with_headers(self.agent.put(&url), &headers), body)
        } else if method == Method::PATCH {
            send_with_body(with_headers(self.agent.patch(&url), &headers), body)
        } else {
            return Err(ApiError::Transport(format!("unsupported method {}", method)));
        };

        let mut response = result?;
        let status = response.status();
        let body = response.body_mut().read_to_string()?;
        debug!("{} {} -> {}", method, url, status.as_u16());
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_replaces_case_insensitively() {
        let req = HttpRequest::new(Method::GET, "https://example.invalid")
            .header("Accept", "text/plain")
            .header("accept", "application/json");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header_value("ACCEPT"), Some("application/json"));
    }
}
