//! CircleCI Provider
//!
//! Manages CircleCI objects (contexts, environment variables, projects,
//! checkout keys, webhooks, schedules, pipelines, runners, policies and
//! more) as declarative resources, and exposes read-only data sources over
//! the CircleCI API v2.
//!
//! # Overview
//!
//! - **Schema types**: typed descriptions of the provider configuration,
//!   every resource and every data source
//! - **Client**: an authenticated HTTP client for the CircleCI API with
//!   cursor pagination and structured error decoding
//! - **Resources and data sources**: one typed mapping per CircleCI object
//! - **ProviderService trait**: the host boundary, implemented by
//!   [`CircleCiProvider`]
//! - **Server**: a local socket server speaking length-prefixed JSON, with
//!   a stdout handshake
//!
//! # Quick Start
//!
//! ```ignore
//! use circleci_provider::{init_logging, serve, CircleCiProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(CircleCiProvider::new()).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! On startup the server prints one line to stdout:
//!
//! ```text
//! CIRCLECI_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `CIRCLECI_PROVIDER|<protocol_version>|<address>`. The host
//! spawns the provider as a subprocess, reads this line, and connects.
//!
//! # Configuration
//!
//! | Attribute   | Environment fallback | Default                        |
//! |-------------|----------------------|--------------------------------|
//! | `api_token` | `CIRCLECI_TOKEN`     | required                       |
//! | `base_url`  |                      | `https://circleci.com/api/v2`  |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod ids;
pub mod logging;
pub mod plan;
pub mod protocol;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

pub use client::CircleCiClient;
pub use config::ProviderConfig;
pub use error::{ClientError, ProviderError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::CircleCiProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_on_listener, serve_with_options, ServeOptions};
pub use service::ProviderService;
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;
pub use serde_json;
pub use tracing;
