//! OAuth2 authorization-code grant against myUplink.
//!
//! - Builds the authorize URL and remembers the issued `state`.
//! - Exchanges the code (or the whole redirect URL) for a token.
//! - Refreshes on demand and hands every refreshed token to the caller's updater.
//! - Attaches the bearer token to outgoing requests, refusing to send once it has expired.

use std::cell::RefCell;
use std::fmt;

use chrono::Utc;
use http::Method;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::config::{EnvironmentConfig, OAUTH_AUTHORIZE, OAUTH_TOKEN};
use crate::error::ApiError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

const STATE_LEN: usize = 30;

pub type TokenUpdater = Box<dyn Fn(&Token)>;

/// Token as returned by the token endpoint, plus the computed absolute expiry.
///
/// The JSON layout matches what other myUplink tools keep in `token.json`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
    #[serde(default, deserialize_with = "scope_from_wire")]
    pub scope: Vec<String>,
}

impl Token {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    pub fn is_expired_at(&self, now: f64) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }
}

// Both tokens are bearer credentials.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

// The token endpoint sends a space-separated string; stored tokens often hold a list.
fn scope_from_wire<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Option::<Wire>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Wire::Joined(s)) => s.split_whitespace().map(str::to_owned).collect(),
        Some(Wire::List(v)) => v,
    })
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn generate_state() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

pub struct TokenSession {
    transport: Box<dyn Transport>,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    scope: Vec<String>,
    token: RefCell<Option<Token>>,
    state: RefCell<Option<String>>,
    token_updater: Option<TokenUpdater>,
}

impl TokenSession {
    pub fn new(
        env: &EnvironmentConfig,
        transport: Box<dyn Transport>,
        redirect_uri: Option<String>,
        scope: Vec<String>,
        token: Option<Token>,
        token_updater: Option<TokenUpdater>,
    ) -> Self {
        TokenSession {
            transport,
            client_id: env.client_id.clone(),
            client_secret: env.client_secret.clone(),
            redirect_uri,
            scope,
            token: RefCell::new(token),
            state: RefCell::new(None),
            token_updater,
        }
    }

    pub fn token(&self) -> Option<Token> {
        self.token.borrow().clone()
    }

    pub fn set_token(&self, token: Option<Token>) {
        *self.token.borrow_mut() = token;
    }

    /// Authorize-endpoint URL for the user to visit, and the `state` to expect back.
    pub fn get_authorization_url(&self, base_url: &str, state: Option<&str>) -> Result<(String, String), ApiError> {
        let state = state.map(str::to_owned).unwrap_or_else(generate_state);
        let mut url = Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), OAUTH_AUTHORIZE))
            .map_err(|e| ApiError::Auth(format!("invalid authorize url: {}", e)))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("response_type", "code");
            q.append_pair("client_id", &self.client_id);
            if let Some(redirect_uri) = &self.redirect_uri {
                q.append_pair("redirect_uri", redirect_uri);
            }
            if !self.scope.is_empty() {
                q.append_pair("scope", &self.scope.join(" "));
            }
            q.append_pair("state", &state);
        }
        *self.state.borrow_mut() = Some(state.clone());
        Ok((url.into(), state))
    }

    /// Exchange an authorization code for a token. Pass either the code itself or the full
    /// redirect URL the provider sent the user back to.
    pub fn request_token(
        &self,
        base_url: &str,
        authorization_response: Option<&str>,
        code: Option<&str>,
    ) -> Result<Token, ApiError> {
        let code = match (code, authorization_response) {
            (Some(code), _) => code.to_string(),
            (None, Some(redirect)) => self.code_from_redirect(redirect)?,
            (None, None) => return Err(ApiError::Auth("an authorization code or redirect url is required".into())),
        };

        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code),
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            form.push(("redirect_uri".to_string(), redirect_uri.clone()));
        }

        let token = self.token_grant(base_url, form)?;
        info!("Obtained myUplink token via authorization code");
        self.state.borrow_mut().take();
        *self.token.borrow_mut() = Some(token.clone());
        Ok(token)
    }

    /// Swap the held refresh token for a new access token, then call the token updater.
    pub fn refresh_tokens(&self, base_url: &str) -> Result<Token, ApiError> {
        let previous = self
            .token
            .borrow()
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| ApiError::Auth("no refresh token available".into()))?;

        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), previous.clone()),
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
        ];
        if !self.scope.is_empty() {
            form.push(("scope".to_string(), self.scope.join(" ")));
        }

        let mut token = self.token_grant(base_url, form)?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(previous);
        }
        info!(
            "Refreshed myUplink access token (expires in {}s)",
            token.expires_in.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())
        );

        *self.token.borrow_mut() = Some(token.clone());
        if let Some(updater) = &self.token_updater {
            updater(&token);
        }
        Ok(token)
    }

    /// Send `request` with the bearer token attached.
    ///
    /// Fails with [`ApiError::TokenExpired`] without touching the network when the held
    /// token is past its expiry.
    pub fn request(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let access_token = {
            let token = self.token.borrow();
            let token = token.as_ref().ok_or(ApiError::MissingAuth)?;
            if token.is_expired() {
                return Err(ApiError::TokenExpired);
            }
            token.access_token.clone()
        };
        self.transport
            .execute(request.header("Authorization", format!("Bearer {}", access_token)))
    }

    fn code_from_redirect(&self, redirect: &str) -> Result<String, ApiError> {
        let url = Url::parse(redirect).map_err(|e| ApiError::Auth(format!("invalid redirect url: {}", e)))?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        if let Some(error) = param("error") {
            let description = param("error_description").unwrap_or_default();
            let reason = format!("authorization denied: {} {}", error, description);
            return Err(ApiError::Auth(reason.trim_end().to_string()));
        }
        // Once a state was issued, the redirect must echo it back.
        if let Some(expected) = self.state.borrow().as_deref()
            && param("state").as_deref() != Some(expected)
        {
            return Err(ApiError::Auth("state mismatch in authorization response".into()));
        }
        param("code").ok_or_else(|| ApiError::Auth("authorization response carries no code".into()))
    }

    fn token_grant(&self, base_url: &str, form: Vec<(String, String)>) -> Result<Token, ApiError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), OAUTH_TOKEN);
        let grant = form
            .iter()
            .find(|(k, _)| k == "grant_type")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        debug!("POST {} (grant_type={})", url, grant);

        let request = HttpRequest::new(Method::POST, url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form_body(form);
        let response = self.transport.execute(request)?;
        if !response.status.is_success() {
            return Err(ApiError::Auth(format!("http {}: {}", response.status.as_u16(), response.body)));
        }

        let mut token: Token = serde_json::from_str(&response.body)?;
        if let Some(expires_in) = token.expires_in {
            token.expires_at = Some(now_secs() + expires_in as f64);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CannedToken {
        body: &'static str,
        calls: Rc<RefCell<Vec<HttpRequest>>>,
    }

    impl Transport for CannedToken {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.borrow_mut().push(request);
            Ok(HttpResponse {
                status: StatusCode::OK,
                body: self.body.to_string(),
            })
        }
    }

    fn session(body: &'static str, token: Option<Token>) -> (TokenSession, Rc<RefCell<Vec<HttpRequest>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let transport = CannedToken {
            body,
            calls: calls.clone(),
        };
        let env = EnvironmentConfig::new("https://api.myuplink.com", "my-client", "my-secret");
        let session = TokenSession::new(
            &env,
            Box::new(transport),
            Some("https://localhost/callback".into()),
            vec!["READSYSTEM".into(), "WRITESYSTEM".into(), "offline_access".into()],
            token,
            None,
        );
        (session, calls)
    }

    fn form_value<'a>(req: &'a HttpRequest, key: &str) -> Option<&'a str> {
        match &req.body {
            Some(crate::transport::RequestBody::Form(form)) => {
                form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
            }
            _ => None,
        }
    }

    fn token(expires_at: Option<f64>) -> Token {
        Token {
            access_token: "old-access".into(),
            refresh_token: Some("old-refresh".into()),
            token_type: Some("Bearer".into()),
            expires_in: Some(3600),
            expires_at,
            scope: Vec::new(),
        }
    }

    #[test]
    fn authorization_url_carries_client_and_state() {
        let (session, _) = session("{}", None);
        let (url, state) = session
            .get_authorization_url("https://api.myuplink.com", None)
            .unwrap();
        assert_eq!(state.len(), STATE_LEN);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/oauth/authorize");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("client_id".into(), "my-client".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "https://localhost/callback".into())));
        assert!(pairs.contains(&("scope".into(), "READSYSTEM WRITESYSTEM offline_access".into())));
        assert!(pairs.contains(&("state".into(), state)));
    }

    #[test]
    fn authorization_url_keeps_supplied_state() {
        let (session, _) = session("{}", None);
        let (_, state) = session
            .get_authorization_url("https://api.myuplink.com/", Some("fixed"))
            .unwrap();
        assert_eq!(state, "fixed");
    }

    #[test]
    fn request_token_from_redirect() {
        let body = r#"{"access_token":"a1","refresh_token":"r1","expires_in":3600,
            "token_type":"Bearer","scope":"READSYSTEM offline_access"}"#;
        let (session, calls) = session(body, None);
        let (_, state) = session.get_authorization_url("https://api.myuplink.com", None).unwrap();
        let redirect = format!("https://localhost/callback?code=abc123&state={}", state);

        let token = session
            .request_token("https://api.myuplink.com", Some(&redirect), None)
            .unwrap();
        assert_eq!(token.access_token, "a1");
        assert_eq!(token.scope, vec!["READSYSTEM".to_string(), "offline_access".to_string()]);
        assert!(!token.is_expired());
        assert_eq!(session.token(), Some(token));

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://api.myuplink.com/oauth/token");
        assert_eq!(form_value(&calls[0], "grant_type"), Some("authorization_code"));
        assert_eq!(form_value(&calls[0], "code"), Some("abc123"));
        assert_eq!(form_value(&calls[0], "client_secret"), Some("my-secret"));
    }

    #[test]
    fn request_token_rejects_state_mismatch_and_errors() {
        let (session, calls) = session(r#"{"access_token":"a1"}"#, None);
        session.get_authorization_url("https://api.myuplink.com", Some("expected")).unwrap();

        let err = session
            .request_token("https://api.myuplink.com", Some("https://localhost/cb?code=x&state=other"), None)
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));

        let err = session
            .request_token("https://api.myuplink.com", Some("https://localhost/cb?error=access_denied"), None)
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));

        let err = session
            .request_token("https://api.myuplink.com", Some("https://localhost/cb?code=x"), None)
            .unwrap_err();
        assert!(err.to_string().contains("state mismatch"), "{}", err);

        let err = session.request_token("https://api.myuplink.com", None, None).unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn issued_state_is_spent_by_a_successful_exchange() {
        let (session, calls) = session(r#"{"access_token":"a1"}"#, None);
        session.get_authorization_url("https://api.myuplink.com", Some("expected")).unwrap();

        session
            .request_token("https://api.myuplink.com", Some("https://localhost/cb?code=x&state=expected"), None)
            .unwrap();
        assert!(session.state.borrow().is_none());

        // A failed exchange keeps the state in place.
        session.get_authorization_url("https://api.myuplink.com", Some("second")).unwrap();
        session
            .request_token("https://api.myuplink.com", Some("https://localhost/cb?code=y&state=wrong"), None)
            .unwrap_err();
        assert_eq!(session.state.borrow().as_deref(), Some("second"));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn debug_output_hides_tokens() {
        let printed = format!("{:?}", token(Some(5.0)));
        assert!(!printed.contains("old-access"), "{}", printed);
        assert!(!printed.contains("old-refresh"), "{}", printed);
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("expires_at: Some(5.0)"));
    }

    #[test]
    fn refresh_keeps_previous_refresh_token_and_notifies() {
        let body = r#"{"access_token":"new-access","expires_in":1800}"#;
        let (mut session, calls) = session(body, Some(token(Some(0.0))));
        let notified = Rc::new(Cell::new(0));
        let seen = notified.clone();
        session.token_updater = Some(Box::new(move |t: &Token| {
            assert_eq!(t.access_token, "new-access");
            seen.set(seen.get() + 1);
        }));

        let refreshed = session.refresh_tokens("https://api.myuplink.com").unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(notified.get(), 1);
        assert_eq!(form_value(&calls.borrow()[0], "refresh_token"), Some("old-refresh"));
    }

    #[test]
    fn refresh_without_refresh_token_fails() {
        let mut t = token(None);
        t.refresh_token = None;
        let (session, calls) = session("{}", Some(t));
        assert!(matches!(session.refresh_tokens("https://api.myuplink.com"), Err(ApiError::Auth(_))));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn request_refuses_expired_or_missing_token() {
        let (session, calls) = session("{}", None);
        let req = HttpRequest::new(Method::GET, "https://api.myuplink.com/v2/systems/me");
        assert!(matches!(session.request(req.clone()), Err(ApiError::MissingAuth)));

        session.set_token(Some(token(Some(1.0))));
        assert!(matches!(session.request(req.clone()), Err(ApiError::TokenExpired)));
        assert!(calls.borrow().is_empty());

        session.set_token(Some(token(None)));
        session.request(req).unwrap();
        assert_eq!(calls.borrow()[0].header_value("authorization"), Some("Bearer old-access"));
    }

    #[test]
    fn stored_token_accepts_list_scope() {
        let stored = r#"{"access_token":"a","refresh_token":"r","expires_at":1700000000.5,
            "scope":["READSYSTEM","offline_access"]}"#;
        let t: Token = serde_json::from_str(stored).unwrap();
        assert_eq!(t.scope.len(), 2);
        assert!(t.is_expired_at(1_700_000_001.0));
        assert!(!t.is_expired_at(1_699_999_999.0));
    }
}
