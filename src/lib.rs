//! Typed blocking client for the myUplink heat-pump cloud API.
//!
//! ```no_run
//! use myuplink::{ApiClient, EnvironmentConfig, config};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), myuplink::ApiError> {
//! let env = EnvironmentConfig::production("client-id", "client-secret");
//! let token = config::load_token_file(Path::new("token.json"))?;
//! let client = ApiClient::builder(&env)
//!     .redirect_uri("https://localhost/callback")
//!     .scope(["READSYSTEM", "WRITESYSTEM", "offline_access"])
//!     .token(token)
//!     .token_updater(|t| {
//!         if let Err(e) = config::save_token_file(Path::new("token.json"), t) {
//!             log::error!("saving token failed: {}", e);
//!         }
//!     })
//!     .build();
//!
//! for system in client.get_systems(1, 10)? {
//!     for device in &system.devices {
//!         for point in client.get_device_points(&device.id)? {
//!             let point = point?;
//!             println!("{} = {}", point.parameter_name, point.value);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod models {
    pub mod myuplink;
}

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod mapper;
pub mod transport;

pub use auth::{Token, TokenSession};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{Environment, EnvironmentConfig};
pub use error::{ApiError, ClientErrorKind, ServerErrorKind, response_error_check};
pub use mapper::DevicePoints;
pub use models::myuplink::*;
pub use transport::{HttpRequest, HttpResponse, RequestBody, Transport, UreqTransport};
