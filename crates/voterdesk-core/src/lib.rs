//! Core library for voterdesk.
//!
//! The session and request-security layer of the voter-record client:
//!
//! - [`auth`]: credential storage backends, the session manager and the
//!   route guard that follows session state
//! - [`api`]: the authenticated request pipeline and the feature services
//!   built on top of it
//! - [`models`]: user and voter records exchanged with the backend
//! - [`config`]: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, RequestContext, RequestOptions};
pub use auth::{CredentialStore, SessionManager, SessionStatus, StoreError};
pub use config::Config;
