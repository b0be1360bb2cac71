//! Client-side session state for MindPal.
//!
//! This crate decides whether a user is logged in, hands out the credential
//! other client code should present to the backend, persists and clears
//! session data, and gates protected views:
//!
//! - `SessionStore`: login commit, logout, state reads, access gate, expiry
//! - `KeyValueStore`: the durable/transient persistence seam
//! - `Navigator`: the host's way of showing notices and leaving a view
//! - `LoginResponse`: the backend's login reply, unpacked for `commit_login`
//!
//! Nothing is verified or encrypted here; the backend owns credentials.

pub mod config;
pub mod error;
pub mod login;
pub mod navigation;
pub mod session;
pub mod store;

pub use config::{SessionConfig, DEFAULT_MAX_AGE_HOURS};
pub use error::{Result, SessionError};
pub use login::LoginResponse;
pub use navigation::{Navigator, NoopNavigator};
pub use session::{SessionStore, UserRecord};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
