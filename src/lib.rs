/*
 * Copyright 2023-2024 Rowan Pierce
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! `revdoc` is a client-side model of documents in a remote, revision-based
//! document database.
//!
//! The crate models a document's mutable state as an immutable chain of
//! revisions, detects conflicting concurrent edits, and resolves them by
//! producing a new authoritative revision. It builds on a small transport
//! abstraction so the same model works against any server speaking a
//! revision-tree document API:
//! - [`Database`] is the factory for interned [`Document`] instances and the
//!   entry point for external change events.
//! - [`Document`] tracks and caches the current [`Revision`], exposes property
//!   access and updates, and implements the conflict workflow.
//! - [`Transport`] is the abstract server contract; [`MemoryTransport`] is an
//!   in-process emulation for testing, and `HttpTransport` (feature
//!   `transport-http`) speaks the REST API of a real server.
//!
//! All network-touching operations are `async` and complete exactly once.
//! Concurrent updates to the same document are not serialized locally; the
//! server's parent-revision check decides the winner, and the losing writer
//! resolves the conflict through [`Document::conflicting_revisions`] and
//! [`Document::resolve_conflict`].
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//!
//! use revdoc::db::Database;
//! use revdoc::transport::MemoryTransport;
//! use serde_json::{json, Map};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> revdoc::Result<()> {
//! let database = Database::new(Arc::new(MemoryTransport::new()));
//! let document = database.document("doc1");
//!
//! // Create the document by putting its first revision.
//! let mut properties = Map::new();
//! properties.insert(String::from("name"), json!("Alice"));
//! let revision = document.put_properties(properties).await?;
//! assert_eq!(revision.generation(), 1);
//!
//! // Read it back through the cached current revision.
//! assert_eq!(document.property("name").await?, Some(json!("Alice")));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//! Some functionality is gated behind cargo features:
//!
//! Type | Cargo Feature
//! --- | ---
//! `HttpTransport` | `transport-http`
//!
//! [`Database`]: crate::db::Database
//! [`Document`]: crate::db::Document
//! [`Revision`]: crate::db::Revision
//! [`Transport`]: crate::transport::Transport
//! [`MemoryTransport`]: crate::transport::MemoryTransport
//! [`Document::conflicting_revisions`]: crate::db::Document::conflicting_revisions
//! [`Document::resolve_conflict`]: crate::db::Document::resolve_conflict

pub use uuid;

pub use error::{Error, Result};

mod error;

pub mod db;
pub mod transport;
