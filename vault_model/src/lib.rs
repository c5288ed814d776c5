//! # Vault Model
//!
//! The domain crate for a campaign vault - entity kinds, identifiers, the typed
//! entity union, structural schemas and relationship-reference normalization.
//! This crate performs no I/O and holds no process-wide state; everything that can
//! be swapped at runtime is passed around as an explicit handle.

pub mod entities;
pub mod references;
pub mod schema;

pub use entities::*;
pub use references::*;
pub use schema::*;
