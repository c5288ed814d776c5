//! # Vault Core
//!
//! The subsystem that lets many screens read, cross-reference and rewrite a vault
//! of hand-authored entity documents without corrupting them.
//!
//! ## Core Components
//!
//! - **codec**: Decodes/encodes entity documents, preserving everything not edited
//! - **index**: Resolves a stable entity id to its current file, surviving renames
//! - **markdown**: Two-phase rendering of document text into a block/inline tree
//! - **attachments**: Resolves media embeds to URLs with de-duplicated reads
//! - **context**: Holds every swappable handle, each with an explicit reset
//!
//! All I/O goes through the traits in [`ports`]; nothing here touches the file
//! system directly.

pub mod attachments;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod markdown;
pub mod ports;

pub use attachments::*;
pub use codec::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use index::*;
pub use markdown::*;
pub use ports::*;
