//! `lorekeeper-store` – The Memory Store.
//!
//! Everything between a decoded caller request and the external
//! semantic-memory store lives here.
//!
//! # Modules
//!
//! - [`codec`] – base64 transport encoding for documents and metadata that
//!   must survive a command-line or form-encoded boundary.
//! - [`filter`] – turns the optional importance / tier constraints into a
//!   single [`Predicate`][lorekeeper_types::Predicate].
//! - [`format`] – reshapes the store's columnar query response into
//!   self-contained [`QueryResultItem`][lorekeeper_types::QueryResultItem]s.
//! - [`store`] – the [`MemoryStore`] trait every backend implements.
//! - [`embedding`] – the [`Embedder`] seam and the default
//!   [`HashingEmbedder`].
//! - [`sqlite`] – [`SqliteStore`], the local-embedded backend persisting
//!   collections and records to SQLite.

pub mod codec;
pub mod embedding;
pub mod filter;
pub mod format;
pub mod sqlite;
pub mod store;

pub use embedding::{Embedder, HashingEmbedder};
pub use format::{GetColumns, QueryColumns};
pub use sqlite::SqliteStore;
pub use store::MemoryStore;
