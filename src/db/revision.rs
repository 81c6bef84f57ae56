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

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::RevisionDoc;

/// A map of document fields to JSON values.
pub type JsonMap = serde_json::Map<String, Value>;

/// The prefix which marks a property name as reserved for database metadata.
///
/// Reserved properties are present in a revision's raw [`contents`] but are
/// excluded from the application-visible [`properties`] view.
///
/// [`contents`]: crate::db::Revision::contents
/// [`properties`]: crate::db::Revision::properties
pub const RESERVED_PREFIX: char = '_';

/// The reserved field holding the document ID.
pub(crate) const ID_FIELD: &str = "_id";

/// The reserved field holding the revision ID.
pub(crate) const REV_FIELD: &str = "_rev";

/// The reserved field marking a revision as a tombstone.
pub(crate) const DELETED_FIELD: &str = "_deleted";

/// Return whether `key` names a reserved, database-managed property.
pub(crate) fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Return a copy of `contents` with all reserved fields removed.
pub(crate) fn strip_reserved(contents: &JsonMap) -> JsonMap {
    contents
        .iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// The stable identifier of a document.
///
/// A document ID is assigned once and is never reassigned for the lifetime of
/// the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Return the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId(id.to_owned())
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identifier of one revision of a document.
///
/// A revision ID has the form `{generation}-{digest}`, where `generation` is
/// the integer depth of the revision in the document's edit history and
/// `digest` is a content-derived hash which guarantees that sibling revisions
/// with different contents never collide.
///
/// Construction is lenient: a `RevisionId` is a deferred reference, so any
/// string is accepted and malformed input simply reads as generation 0 with an
/// empty digest. Nothing is validated against the server until the revision is
/// fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    /// Build the ID of a revision at `generation` with the given `digest`.
    pub fn new(generation: u64, digest: &str) -> Self {
        RevisionId(format!("{}-{}", generation, digest))
    }

    /// The generation of this revision.
    ///
    /// This is 0 if the ID does not have the `{generation}-{digest}` form.
    pub fn generation(&self) -> u64 {
        match self.0.split_once('-') {
            Some((generation, _)) => generation.parse().unwrap_or(0),
            None => 0,
        }
    }

    /// The content-derived digest of this revision.
    ///
    /// This is empty if the ID does not have the `{generation}-{digest}` form.
    pub fn digest(&self) -> &str {
        match self.0.split_once('-') {
            Some((_, digest)) => digest,
            None => "",
        }
    }

    /// Return the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RevisionId {
    fn from(id: String) -> Self {
        RevisionId(id)
    }
}

impl From<&str> for RevisionId {
    fn from(id: &str) -> Self {
        RevisionId(id.to_owned())
    }
}

impl Borrow<str> for RevisionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable snapshot of a document's fields at one edit generation.
///
/// A revision is either *loaded*, carrying the full contents as last known
/// from the server, or *unloaded*, a deferred reference carrying only IDs.
/// Unloaded revisions come from [`Document::revision_with_id`]; to read their
/// fields, fetch a loaded snapshot with [`Document::fetch_revision`].
///
/// Revisions are created by their owning [`Document`] and shared read-only.
///
/// [`Document`]: crate::db::Document
/// [`Document::revision_with_id`]: crate::db::Document::revision_with_id
/// [`Document::fetch_revision`]: crate::db::Document::fetch_revision
#[derive(Debug, Clone)]
pub struct Revision {
    document_id: DocumentId,
    id: RevisionId,
    contents: Option<JsonMap>,
}

impl Revision {
    /// Create a deferred reference to a revision, with no contents.
    pub(crate) fn unloaded(document_id: DocumentId, id: RevisionId) -> Self {
        Revision {
            document_id,
            id,
            contents: None,
        }
    }

    /// Create a loaded revision from the raw contents returned by a transport.
    pub(crate) fn loaded(document_id: DocumentId, doc: RevisionDoc) -> Self {
        Revision {
            document_id,
            id: doc.id,
            contents: Some(doc.contents),
        }
    }

    /// The ID of the document this revision belongs to.
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// The ID of this revision.
    pub fn id(&self) -> &RevisionId {
        &self.id
    }

    /// The generation of this revision within its document's edit history.
    pub fn generation(&self) -> u64 {
        self.id.generation()
    }

    /// Return whether this revision's contents have been fetched.
    pub fn is_loaded(&self) -> bool {
        self.contents.is_some()
    }

    /// Return whether this revision is a tombstone.
    ///
    /// This is `false` for unloaded revisions.
    pub fn is_deleted(&self) -> bool {
        match &self.contents {
            Some(contents) => contents.get(DELETED_FIELD) == Some(&Value::Bool(true)),
            None => false,
        }
    }

    /// The full field map of this revision, reserved fields included.
    ///
    /// This is `None` if the revision is unloaded.
    pub fn contents(&self) -> Option<&JsonMap> {
        self.contents.as_ref()
    }

    /// The application-defined properties of this revision.
    ///
    /// This is a copy of [`contents`] without the reserved fields. It is
    /// `None` if the revision is unloaded.
    ///
    /// [`contents`]: Revision::contents
    pub fn properties(&self) -> Option<JsonMap> {
        self.contents.as_ref().map(strip_reserved)
    }

    /// Return the value of the application-defined property `key`.
    ///
    /// This is `None` if the key is missing, reserved, or the revision is
    /// unloaded.
    pub fn property(&self, key: &str) -> Option<&Value> {
        if is_reserved_key(key) {
            return None;
        }
        self.contents.as_ref()?.get(key)
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.document_id == other.document_id && self.id == other.id
    }
}

impl Eq for Revision {}
