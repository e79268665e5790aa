//! Data models exchanged with the voter-record backend.
//!
//! - `User`, `Role`, `AccountStatus`: staff accounts and their access role
//! - `CreateUser`, `UpdateUser`: administration payloads
//! - `VoterRecord`: a voter roll entry returned by search and detail calls

pub mod user;
pub mod voter;

pub use user::{AccountStatus, CreateUser, Role, UpdateUser, User};
pub use voter::VoterRecord;

use serde::Deserialize;

/// List endpoints answer either with a bare array or with the array
/// wrapped under `data` or under a resource-specific key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped {
        data: Option<Vec<T>>,
        #[serde(alias = "users", alias = "voters")]
        items: Option<Vec<T>>,
    },
}

impl<T> ListResponse<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) => items,
            ListResponse::Wrapped { data, items } => data.or(items).unwrap_or_default(),
        }
    }
}
