//! # cadence-session
//!
//! Session services for the Cadence agent runtime: the storage boundary
//! ([`SessionService`]) and the in-memory backend used by tests and local
//! runs. The session data model itself ([`cadence_core::Session`]) lives in
//! cadence-core.

pub mod inmemory;
pub mod service;

pub use inmemory::InMemorySessionService;
pub use service::{CreateRequest, DeleteRequest, GetRequest, ListRequest, SessionService};

// Re-export the data model for convenience.
pub use cadence_core::{
    Event, EventActions, KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER, Session, StateMap,
};
