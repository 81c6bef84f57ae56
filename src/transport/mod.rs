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

//! Low-level backends for talking to a document database.
//!
//! This module provides the transport layer the document model is built on. A
//! transport executes only the most basic remote operations (reading a
//! revision, enumerating leaves, reading history, and writing a revision under
//! a parent precondition) and doesn't have to worry about caching, conflict
//! resolution, or change notifications. Those concerns are implemented at a
//! higher level in [`crate::db`]. Transports are meant to be easy to implement
//! so that supporting a new server is relatively painless.
//!
//! All transports implement the [`Transport`] trait. Two implementations are
//! provided out of the box:
//! - [`MemoryTransport`] emulates a server in process memory and is useful for
//!   testing.
//! - `HttpTransport` talks to a real server over its REST API (requires the
//!   `transport-http` feature).
//!
//! [`Transport`]: crate::transport::Transport
//! [`MemoryTransport`]: crate::transport::MemoryTransport

#[cfg(feature = "transport-http")]
pub use self::http::HttpTransport;
pub use self::memory::MemoryTransport;
pub use self::transport::{HistoryEntry, RevisionDoc, Transport};

#[cfg(feature = "transport-http")]
mod http;
mod memory;
mod transport;
