//! `lorekeeper-bridge` – HTTP surface over a [`MemoryStore`].
//!
//! Two halves share one set of wire shapes ([`wire`]):
//!
//! - [`BridgeServer`] exposes any store as a small JSON service
//!   (default `0.0.0.0:8001`). This is what a game engine or the
//!   `lorekeeper serve` command talks to.
//! - [`RemoteStore`] implements [`MemoryStore`] by calling a running bridge,
//!   so the CLI can work against a shared store on another host.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lorekeeper_bridge::BridgeServer;
//! use lorekeeper_store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SqliteStore::open("./lorekeeper/memories.db").expect("open store");
//!     BridgeServer::new(Arc::new(store))
//!         .run()
//!         .await
//!         .expect("bridge server failed");
//! }
//! ```
//!
//! [`MemoryStore`]: lorekeeper_store::MemoryStore

pub mod client;
pub mod server;
pub mod wire;

pub use client::RemoteStore;
pub use server::{BridgeServer, DEFAULT_HOST, DEFAULT_PORT, router};
