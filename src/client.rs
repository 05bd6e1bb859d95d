//! Blocking client for the myUplink v2 REST API.
//!
//! - One method per endpoint; every call goes `send_request` -> `response_error_check` -> decode.
//! - Authorization-code OAuth2 via [`TokenSession`]; an expired access token is refreshed
//!   once and the call retried once. There is no further retry or backoff.
//! - Not `Sync`: the token lives in a `RefCell`, so refreshes can never race.

use std::collections::BTreeMap;
use std::time::Duration;

use http::Method;
use log::{info, warn};
use serde_json::{Value, json};

use crate::auth::{Token, TokenSession, TokenUpdater};
use crate::config::EnvironmentConfig;
use crate::error::{ApiError, response_error_check};
use crate::mapper::{self, DevicePoints};
use crate::models::myuplink::*;
use crate::transport::{DEFAULT_TIMEOUT, HttpRequest, HttpResponse, Transport, UreqTransport};

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US";

pub struct ApiClientBuilder {
    config: EnvironmentConfig,
    redirect_uri: Option<String>,
    scope: Vec<String>,
    token: Option<Token>,
    token_updater: Option<TokenUpdater>,
    transport: Option<Box<dyn Transport>>,
    accept_language: String,
    timeout: Duration,
}

impl ApiClientBuilder {
    pub fn new(config: &EnvironmentConfig) -> Self {
        ApiClientBuilder {
            config: config.clone(),
            redirect_uri: None,
            scope: Vec::new(),
            token: None,
            token_updater: None,
            transport: None,
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn token(mut self, token: Option<Token>) -> Self {
        self.token = token;
        self
    }

    /// Called with the new token after every successful refresh.
    pub fn token_updater(mut self, f: impl Fn(&Token) + 'static) -> Self {
        self.token_updater = Some(Box::new(f));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn accept_language(mut self, lang: impl Into<String>) -> Self {
        self.accept_language = lang.into();
        self
    }

    /// Request timeout for the built-in transport. Ignored when a custom transport is set.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> ApiClient {
        let transport = self
            .transport
            .unwrap_or_else(|| Box::new(UreqTransport::new(self.timeout)));
        let session = TokenSession::new(
            &self.config,
            transport,
            self.redirect_uri,
            self.scope,
            self.token,
            self.token_updater,
        );
        ApiClient {
            config: self.config,
            session,
            accept_language: self.accept_language,
        }
    }
}

pub struct ApiClient {
    config: EnvironmentConfig,
    session: TokenSession,
    accept_language: String,
}

impl ApiClient {
    pub fn new(config: &EnvironmentConfig) -> Self {
        ApiClientBuilder::new(config).build()
    }

    pub fn builder(config: &EnvironmentConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn session(&self) -> &TokenSession {
        &self.session
    }

    pub fn token(&self) -> Option<Token> {
        self.session.token()
    }

    // =====================
    // OAuth
    // =====================

    pub fn get_authorization_url(&self, state: Option<&str>) -> Result<(String, String), ApiError> {
        self.session.get_authorization_url(&self.config.base_url, state)
    }

    pub fn request_token(&self, authorization_response: Option<&str>, code: Option<&str>) -> Result<Token, ApiError> {
        self.session
            .request_token(&self.config.base_url, authorization_response, code)
    }

    pub fn refresh_tokens(&self) -> Result<Token, ApiError> {
        self.session.refresh_tokens(&self.config.base_url)
    }

    // =====================
    // Dispatch
    // =====================

    /// Issue `method base_url+path`, refreshing and retrying once if the access token has
    /// expired, then classify the response.
    pub fn send_request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        json_body: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = HttpRequest::new(method, self.config.url(path));
        for (k, v) in headers {
            request = request.header(*k, *v);
        }
        if let Some(body) = json_body {
            request = request.json_body(body);
        }

        let response = match self.session.request(request.clone()) {
            Err(ApiError::TokenExpired) => {
                info!("Access token expired; refreshing before {} {}", request.method, request.url);
                self.refresh_tokens()?;
                self.session.request(request)?
            }
            other => other?,
        };

        response_error_check(&response)?;
        Ok(response)
    }

    fn get(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.send_request(Method::GET, path, &[("Accept", "application/json")], None)
    }

    fn get_localized(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.send_request(
            Method::GET,
            path,
            &[("Accept-Language", self.accept_language.as_str()), ("Accept", "text/plain")],
            None,
        )
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.get(path)?;
        mapper::decode(mapper::parse_body(&response.body)?)
    }

    fn patch_json(&self, path: &str, settings: &BTreeMap<String, Value>) -> Result<Vec<DeviceUpdate>, ApiError> {
        let body = serde_json::to_string(settings)?;
        let response = self.send_request(
            Method::PATCH,
            path,
            &[("Accept", "application/json"), ("Content-Type", "application/json")],
            Some(body),
        )?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "updates")?;
        mapper::decode_list("updates", items)
    }

    // =====================
    // Devices
    // =====================

    pub fn get_aidmode(&self, device_id: &str) -> Result<AidMode, ApiError> {
        self.get_json(&format!("/v2/devices/{}/aidMode", device_id))
    }

    /// `Ok(None)` when the server answers with an empty body (no data for this device).
    pub fn get_device_info(&self, device_id: &str) -> Result<Option<DeviceInfo>, ApiError> {
        let response = self.get(&format!("/v2/devices/{}", device_id))?;
        if response.body.is_empty() {
            warn!("Device {} returned no device info", device_id);
            return Ok(None);
        }
        mapper::decode(mapper::parse_body(&response.body)?).map(Some)
    }

    pub fn get_smart_home_categories(&self, device_id: &str) -> Result<SmartHomeCategories, ApiError> {
        let response = self.get(&format!("/v2/devices/{}/smart-home-categories", device_id))?;
        let value = mapper::parse_body(&response.body)?;
        mapper::decode(mapper::underscore_keys(value))
    }

    pub fn get_smart_home_zones(&self, device_id: &str) -> Result<Vec<SmartHomeZone>, ApiError> {
        let response = self.get_localized(&format!("/v2/devices/{}/smart-home-zones", device_id))?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "zones")?;
        mapper::decode_list("zones", items)
    }

    /// All points of a device, decoded lazily in server order. The sequence can be consumed once.
    pub fn get_device_points(&self, device_id: &str) -> Result<DevicePoints, ApiError> {
        let response = self.get_localized(&format!("/v2/devices/{}/points", device_id))?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "points")?;
        Ok(DevicePoints::new(items))
    }

    /// Only the listed parameter ids. `parameters` is comma separated; whitespace is dropped.
    pub fn get_device_points_filtered(&self, device_id: &str, parameters: &str) -> Result<Vec<DevicePoint>, ApiError> {
        let parameters: String = parameters.chars().filter(|c| !c.is_whitespace()).collect();
        let response = self.get_localized(&format!("/v2/devices/{}/points?parameters={}", device_id, parameters))?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "points")?;
        mapper::decode_list("points", items)
    }

    /// Write parameter values, e.g. `{"47011": 2}`.
    pub fn patch_device(
        &self,
        device_id: &str,
        settings: &BTreeMap<String, Value>,
    ) -> Result<Vec<DeviceUpdate>, ApiError> {
        self.patch_json(&format!("/v2/devices/{}/points", device_id), settings)
    }

    pub fn patch_device_zones(
        &self,
        device_id: &str,
        zone_id: &str,
        settings: &BTreeMap<String, Value>,
    ) -> Result<Vec<DeviceUpdate>, ApiError> {
        self.patch_json(&format!("/v2/devices/{}/zones/{}", device_id, zone_id), settings)
    }

    // =====================
    // Notifications
    // =====================

    pub fn get_active_systems_notifications(
        &self,
        system_id: &str,
        page: u32,
        items_per_page: u32,
    ) -> Result<Vec<Notification>, ApiError> {
        self.notifications(&format!(
            "/v2/systems/{}/notifications/active?page={}&itemsPerPage={}",
            system_id, page, items_per_page
        ))
    }

    /// Active, inactive and archived alarms.
    pub fn get_all_systems_notifications(
        &self,
        system_id: &str,
        page: u32,
        items_per_page: u32,
    ) -> Result<Vec<Notification>, ApiError> {
        self.notifications(&format!(
            "/v2/systems/{}/notifications?page={}&itemsPerPage={}",
            system_id, page, items_per_page
        ))
    }

    fn notifications(&self, path: &str) -> Result<Vec<Notification>, ApiError> {
        let response = self.get_localized(path)?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "notifications")?;
        mapper::decode_list("notifications", items)
    }

    // =====================
    // Premium
    // =====================

    pub fn get_premium_subscriptions(&self, system_id: &str) -> Result<Vec<Subscription>, ApiError> {
        let response = self.get(&format!("/v2/systems/{}/subscriptions", system_id))?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "subscriptions")?;
        mapper::decode_list("subscriptions", items)
    }

    // =====================
    // Systems
    // =====================

    pub fn get_systems(&self, page: u32, items_per_page: u32) -> Result<Vec<System>, ApiError> {
        let response = self.get(&format!("/v2/systems/me?page={}&itemsPerPage={}", page, items_per_page))?;
        let items = mapper::unwrap_list(mapper::parse_body(&response.body)?, "systems")?;
        mapper::decode_list("systems", items)
    }

    pub fn get_system_smart_home_mode(&self, system_id: &str) -> Result<SmartHomeMode, ApiError> {
        self.get_json(&format!("/v2/systems/{}/smart-home-mode", system_id))
    }

    /// Modes seen in the wild: `Default`, `Normal`, `Away`, `Vacation`, `Home`.
    pub fn put_system_smart_home_mode(&self, system_id: &str, mode: &str) -> Result<(), ApiError> {
        let body = json!({ "smartHomeMode": mode }).to_string();
        self.send_request(
            Method::PUT,
            &format!("/v2/systems/{}/smart-home-mode", system_id),
            &[("Accept", "*/*"), ("Content-Type", "application/json-patch+json")],
            Some(body),
        )?;
        Ok(())
    }
}
