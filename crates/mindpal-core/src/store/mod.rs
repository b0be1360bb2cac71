//! Key-value persistence backends.
//!
//! The session store never talks to a concrete storage medium directly; it
//! is handed two `KeyValueStore` implementations at construction time:
//!
//! - a durable store that survives across visits (user record, credential)
//! - a transient store scoped to one session (pending return destination)
//!
//! `MemoryStore` is the in-process backend used by tests and short-lived
//! hosts. `FileStore` keeps a flat string table in a single JSON file.

pub mod file;
pub mod memory;

use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {path} is not a valid key-value table: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A flat string-keyed table with string values.
///
/// Methods take `&self`; backends provide their own interior mutability so a
/// single store can be shared between a `SessionStore` and its host.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key)
    }
}
