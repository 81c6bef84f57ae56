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

//! The client-side document model.
//!
//! This module provides the high-level view of a remote document database.
//! A [`Database`] hands out interned [`Document`] instances; each document
//! derives its mutable state from an immutable chain of [`Revision`]s and
//! exposes property access, updates, history, and the conflict-resolution
//! workflow.
//!
//! # Revisions
//! Every edit of a document creates a new revision identified by a
//! [`RevisionId`] of the form `{generation}-{digest}`. Concurrent,
//! non-coordinated edits create sibling branches in the document's revision
//! tree; the branch tips ("leaves") that are not tombstoned are the document's
//! live revisions. More than one live leaf means the document is in conflict.
//!
//! # Conflicts
//! A put supplies its parent revision as an optimistic-concurrency
//! precondition, and the server is the sole arbiter: exactly one of two racing
//! writes succeeds, and the loser completes with [`Error::Conflict`]. The
//! loser then enumerates the live leaves with
//! [`Document::conflicting_revisions`] and resolves them with
//! [`Document::resolve_conflict`], which creates one new winning revision and
//! tombstones the superseded branches.
//!
//! # Change notifications
//! Applications that follow the server's change feed relay events through
//! [`Database::apply_change`]; affected documents invalidate their caches and
//! notify registered [`DocumentObserver`]s. Changes that originated from this
//! process's own writes are suppressed.
//!
//! [`Error::Conflict`]: crate::Error::Conflict

pub use self::database::Database;
pub use self::document::{Document, Resolution};
pub use self::history::{RevisionHistory, RevisionStatus};
pub use self::notify::{DocumentChange, DocumentObserver};
pub use self::revision::{DocumentId, JsonMap, Revision, RevisionId, RESERVED_PREFIX};

mod database;
mod document;
mod history;
mod notify;
pub(crate) mod revision;
