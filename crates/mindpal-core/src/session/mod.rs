//! Session state: who is logged in, with what credential, since when.
//!
//! `SessionStore` combines the state reader, state writer, access gate and
//! expiry evaluator over one persisted `UserRecord`.

pub mod record;
pub mod store;

pub use record::UserRecord;
pub use store::SessionStore;
