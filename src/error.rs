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

use std::result;

use thiserror::Error as DeriveError;

/// The error type for operations with a remote document database.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// A document or revision was not found.
    #[error("A document or revision was not found.")]
    NotFound,

    /// A write lost an optimistic-concurrency race.
    ///
    /// The parent revision supplied with a put was no longer a live leaf
    /// because another writer updated the document first. Callers should run
    /// the conflict workflow rather than retry blindly.
    #[error("The parent revision is no longer current; another write won the race.")]
    Conflict,

    /// The winning revision is not a member of the conflict set.
    #[error("The winning revision is not a member of the conflict set.")]
    NotInConflictSet,

    /// The revision's contents have not been fetched from the server.
    #[error("The revision's contents have not been fetched from the server.")]
    NotLoaded,

    /// A value could not be serialized.
    #[error("A value could not be serialized.")]
    Serialize,

    /// A value could not be deserialized.
    #[error("A value could not be deserialized.")]
    Deserialize,

    /// An error occurred in the transport.
    ///
    /// This wraps network and server failures unrelated to document
    /// semantics. They are surfaced opaquely and not interpreted by this
    /// crate.
    #[error("An error occurred in the transport: {0}")]
    Transport(#[source] anyhow::Error),
}

/// The result type for operations with a remote document database.
pub type Result<T> = result::Result<T, Error>;
