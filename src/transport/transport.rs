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

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use static_assertions::assert_obj_safe;

use crate::db::{DocumentId, JsonMap, RevisionId, RevisionStatus};
use crate::Result;

/// The raw contents of one revision as returned by a [`Transport`].
///
/// The `contents` map is the full document object as known to the server,
/// including the reserved fields (`_id`, `_rev`, `_deleted`).
///
/// [`Transport`]: crate::transport::Transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionDoc {
    /// The ID of this revision.
    pub id: RevisionId,

    /// The full field map of this revision, reserved fields included.
    pub contents: JsonMap,
}

/// One entry in a document's revision history as returned by a [`Transport`].
///
/// [`Transport`]: crate::transport::Transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The ID of the revision.
    pub id: RevisionId,

    /// The availability of the revision on the server.
    pub status: RevisionStatus,
}

/// A connection to a remote document database.
///
/// A `Transport` executes the small set of remote operations the document
/// model is built on. It does not interpret document contents, own retry
/// policy, or deliver change notifications; those concerns live elsewhere.
/// Transports are meant to be easy to implement so that supporting a new
/// server is relatively painless.
///
/// All methods are asynchronous and complete exactly once. Implementations
/// must be safe to share between tasks.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Return the revision of the document `id` identified by `revision`.
    ///
    /// If `revision` is `None`, this returns the current winning revision as
    /// determined by the server. If the document does not exist, or its
    /// winning revision is a tombstone, this returns `Ok(None)`.
    ///
    /// Reading by ID works for any revision the server still has the body of,
    /// including tombstones and superseded branches.
    async fn get_revision(
        &self,
        id: &DocumentId,
        revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>>;

    /// Return all live leaf revisions of the document `id`, with contents.
    ///
    /// A leaf is a revision with no child revisions; a live leaf is one that
    /// is not a tombstone. More than one live leaf means the document is in
    /// conflict. This returns `Ok(None)` if the document does not exist.
    async fn list_leaves(&self, id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>>;

    /// Return the revision history of the document `id`, oldest first.
    ///
    /// The history covers the ancestry of the current winning revision. The
    /// sequence may contain generation gaps if the server has pruned
    /// intermediate revisions; pruned entries that are still known by ID are
    /// reported with [`RevisionStatus::Missing`]. This returns `Ok(None)` if
    /// the document does not exist.
    ///
    /// [`RevisionStatus::Missing`]: crate::db::RevisionStatus::Missing
    async fn revision_history(&self, id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>>;

    /// Write `contents` as a new revision of the document `id` and return the
    /// new revision's ID.
    ///
    /// `parent` is the optimistic-concurrency precondition: the write only
    /// succeeds if `parent` is still a live leaf of the document's revision
    /// tree (`None` asserts that the document does not exist yet). The server
    /// is the sole arbiter of this check.
    ///
    /// Reserved fields in `contents` other than `_deleted` are ignored; the
    /// server derives `_id` and `_rev` itself. A `_deleted` field of `true`
    /// makes the new revision a tombstone.
    ///
    /// # Errors
    /// - `Error::Conflict`: `parent` lost the race and is no longer a live
    ///   leaf.
    /// - `Error::Transport`: A network or server error occurred.
    async fn put_revision(
        &self,
        id: &DocumentId,
        parent: Option<&RevisionId>,
        contents: &JsonMap,
    ) -> Result<RevisionId>;
}

assert_obj_safe!(Transport);
