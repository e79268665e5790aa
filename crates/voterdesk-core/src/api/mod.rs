//! REST client for the voter-record backend.
//!
//! `ApiClient` is the request pipeline every feature call goes through: it
//! attaches the security headers and bearer token, bounds each attempt with
//! a timeout, retries server errors with linear backoff and ends the
//! session on any 401. `UserService` and `VoterService` are thin typed
//! wrappers over it.

pub mod client;
pub mod error;
pub mod request;
pub mod users;
pub mod voters;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{backoff_delay, RequestContext, RequestOptions};
pub use users::UserService;
pub use voters::VoterService;
