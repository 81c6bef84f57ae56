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

use serde::{Deserialize, Serialize};

use crate::db::{Document, DocumentId, RevisionId};

/// A capability for observing external changes to a document.
///
/// Any object implementing this single method can be registered with
/// [`Document::add_observer`]. Observers are held weakly; registering an
/// observer does not keep it alive.
///
/// Observers are only invoked for changes that originated *outside* this
/// process, and only while change tracking is enabled on the owning
/// [`Database`].
///
/// [`Document::add_observer`]: crate::db::Document::add_observer
/// [`Database`]: crate::db::Database
pub trait DocumentObserver: Send + Sync {
    /// Called after `document` changed externally.
    fn document_changed(&self, document: &Document);
}

/// An external change to a document, as delivered by a change feed.
///
/// This crate does not subscribe to a change feed itself; the surrounding
/// application receives feed events by whatever mechanism it chooses and
/// relays them through [`Database::apply_change`].
///
/// [`Database::apply_change`]: crate::db::Database::apply_change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// The ID of the changed document.
    pub id: DocumentId,

    /// The document's new winning revision.
    pub revision_id: RevisionId,

    /// Whether the new winning revision is a tombstone.
    #[serde(default)]
    pub deleted: bool,
}
