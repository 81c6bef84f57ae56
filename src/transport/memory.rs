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

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::revision::{strip_reserved, DELETED_FIELD, ID_FIELD, REV_FIELD};
use crate::db::{DocumentId, JsonMap, RevisionId, RevisionStatus};
use crate::transport::{HistoryEntry, RevisionDoc, Transport};
use crate::{Error, Result};

/// One revision as stored in a [`MemoryTransport`]'s revision tree.
#[derive(Debug)]
struct StoredRevision {
    parent: Option<RevisionId>,
    /// The application-defined fields. `None` once compaction pruned the body.
    properties: Option<JsonMap>,
    deleted: bool,
    leaf: bool,
}

/// The revision tree of one document.
#[derive(Debug, Default)]
struct RevTree {
    revisions: HashMap<RevisionId, StoredRevision>,
}

impl RevTree {
    fn live_leaves(&self) -> impl Iterator<Item = (&RevisionId, &StoredRevision)> {
        self.revisions
            .iter()
            .filter(|(_, stored)| stored.leaf && !stored.deleted)
    }

    /// The current winning revision: the live leaf with the highest
    /// generation, digest as the tie-break. `None` if every branch is
    /// tombstoned.
    fn live_winner(&self) -> Option<(&RevisionId, &StoredRevision)> {
        self.live_leaves()
            .max_by(|(a, _), (b, _)| (a.generation(), a.digest()).cmp(&(b.generation(), b.digest())))
    }

    /// Like [`live_winner`], but falls back to the winning tombstone so the
    /// history of a deleted document still resolves.
    ///
    /// [`live_winner`]: RevTree::live_winner
    fn any_winner(&self) -> Option<(&RevisionId, &StoredRevision)> {
        self.live_winner().or_else(|| {
            self.revisions
                .iter()
                .filter(|(_, stored)| stored.leaf)
                .max_by(|(a, _), (b, _)| {
                    (a.generation(), a.digest()).cmp(&(b.generation(), b.digest()))
                })
        })
    }
}

/// A `Transport` which emulates a document database in memory.
///
/// Unlike other `Transport` implementations, a `MemoryTransport` talks to no
/// server: it keeps a full revision tree per document in process memory and
/// performs the server's side of the protocol itself, including the
/// optimistic-concurrency check on puts and the deterministic winner
/// arbitration among live leaves. It is useful for testing.
///
/// Revision digests are content-derived: putting the same contents under the
/// same parent yields the same revision ID, and sibling revisions with
/// different contents never collide.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    documents: Mutex<HashMap<DocumentId, RevTree>>,
}

impl MemoryTransport {
    /// Create a new empty `MemoryTransport`.
    pub fn new() -> Self {
        MemoryTransport {
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a revision with a known ID under the given parent, as
    /// replication from another server would.
    ///
    /// Unlike [`Transport::put_revision`] this bypasses the
    /// optimistic-concurrency check, so it can graft additional branches onto
    /// the tree. Conflicting trees only arise through replication in
    /// production; this is how test setups reproduce them.
    ///
    /// [`Transport::put_revision`]: crate::transport::Transport::put_revision
    pub fn put_existing_revision(
        &self,
        id: &DocumentId,
        parent: Option<&RevisionId>,
        rev_id: RevisionId,
        contents: &JsonMap,
    ) {
        let mut documents = self.documents.lock().unwrap();
        let deleted = contents.get(DELETED_FIELD) == Some(&Value::Bool(true));
        let properties = strip_reserved(contents);
        let tree = documents.entry(id.clone()).or_default();
        if let Some(parent_id) = parent {
            if let Some(stored) = tree.revisions.get_mut(parent_id) {
                stored.leaf = false;
            }
        }
        tree.revisions.insert(
            rev_id,
            StoredRevision {
                parent: parent.cloned(),
                properties: Some(properties),
                deleted,
                leaf: true,
            },
        );
    }

    /// Drop the bodies of all non-leaf revisions of the document `id`, as
    /// server-side compaction would.
    ///
    /// The pruned revisions remain known by ID and keep their place in the
    /// tree; the revision history reports them as [`RevisionStatus::Missing`]
    /// and reads of their contents return nothing.
    ///
    /// [`RevisionStatus::Missing`]: crate::db::RevisionStatus::Missing
    pub fn compact(&self, id: &DocumentId) {
        if let Some(tree) = self.documents.lock().unwrap().get_mut(id) {
            for stored in tree.revisions.values_mut() {
                if !stored.leaf {
                    stored.properties = None;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get_revision(
        &self,
        id: &DocumentId,
        revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>> {
        let documents = self.documents.lock().unwrap();
        let tree = match documents.get(id) {
            Some(tree) => tree,
            None => return Ok(None),
        };
        let (rev_id, stored) = match revision {
            Some(rev_id) => match tree.revisions.get(rev_id) {
                Some(stored) => (rev_id, stored),
                None => return Ok(None),
            },
            None => match tree.live_winner() {
                Some(winner) => winner,
                None => return Ok(None),
            },
        };
        Ok(build_doc(id, rev_id, stored))
    }

    async fn list_leaves(&self, id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>> {
        let documents = self.documents.lock().unwrap();
        let tree = match documents.get(id) {
            Some(tree) => tree,
            None => return Ok(None),
        };
        Ok(Some(
            tree.live_leaves()
                .filter_map(|(rev_id, stored)| build_doc(id, rev_id, stored))
                .collect(),
        ))
    }

    async fn revision_history(&self, id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>> {
        let documents = self.documents.lock().unwrap();
        let tree = match documents.get(id) {
            Some(tree) => tree,
            None => return Ok(None),
        };
        let winner = match tree.any_winner() {
            Some((rev_id, _)) => rev_id.clone(),
            None => return Ok(Some(Vec::new())),
        };

        let mut entries = Vec::new();
        let mut cursor = Some(winner);
        while let Some(rev_id) = cursor {
            match tree.revisions.get(&rev_id) {
                Some(stored) => {
                    let status = if stored.deleted {
                        RevisionStatus::Deleted
                    } else if stored.properties.is_none() {
                        RevisionStatus::Missing
                    } else {
                        RevisionStatus::Available
                    };
                    cursor = stored.parent.clone();
                    entries.push(HistoryEntry { id: rev_id, status });
                }
                None => {
                    entries.push(HistoryEntry {
                        id: rev_id,
                        status: RevisionStatus::Missing,
                    });
                    cursor = None;
                }
            }
        }
        entries.reverse();
        Ok(Some(entries))
    }

    async fn put_revision(
        &self,
        id: &DocumentId,
        parent: Option<&RevisionId>,
        contents: &JsonMap,
    ) -> Result<RevisionId> {
        let mut documents = self.documents.lock().unwrap();
        let deleted = contents.get(DELETED_FIELD) == Some(&Value::Bool(true));
        let properties = strip_reserved(contents);

        // Validate the precondition and resolve the effective parent before
        // touching the tree.
        let parent = match parent {
            Some(parent_id) => {
                let tree = documents.get(id).ok_or(Error::Conflict)?;
                let stored = tree.revisions.get(parent_id).ok_or(Error::Conflict)?;
                if !stored.leaf {
                    return Err(Error::Conflict);
                }
                Some(parent_id.clone())
            }
            // A parentless put asserts the document does not exist. If only
            // tombstones remain, the winning tombstone's branch is extended so
            // the document can be recreated.
            None => match documents.get(id) {
                Some(tree) => {
                    if tree.live_leaves().next().is_some() {
                        return Err(Error::Conflict);
                    }
                    tree.any_winner().map(|(rev_id, _)| rev_id.clone())
                }
                None => None,
            },
        };

        let generation = parent.as_ref().map_or(0, RevisionId::generation) + 1;
        let digest = digest_of(parent.as_ref(), deleted, &properties);
        let new_id = RevisionId::new(generation, &digest);

        let tree = documents.entry(id.clone()).or_default();
        if let Some(parent_id) = &parent {
            if let Some(stored) = tree.revisions.get_mut(parent_id) {
                stored.leaf = false;
            }
        }
        tree.revisions.insert(
            new_id.clone(),
            StoredRevision {
                parent,
                properties: Some(properties),
                deleted,
                leaf: true,
            },
        );
        Ok(new_id)
    }
}

/// Assemble the wire shape of a stored revision, reserved fields injected.
///
/// Returns `None` if the revision's body has been pruned.
fn build_doc(id: &DocumentId, rev_id: &RevisionId, stored: &StoredRevision) -> Option<RevisionDoc> {
    let mut contents = stored.properties.clone()?;
    contents.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
    contents.insert(REV_FIELD.to_owned(), Value::String(rev_id.to_string()));
    if stored.deleted {
        contents.insert(DELETED_FIELD.to_owned(), Value::Bool(true));
    }
    Some(RevisionDoc {
        id: rev_id.clone(),
        contents,
    })
}

/// Derive a revision digest from the revision's parent and contents.
///
/// `serde_json` maps serialize with sorted keys, so equal contents always
/// hash equally.
fn digest_of(parent: Option<&RevisionId>, deleted: bool, properties: &JsonMap) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Some(parent) = parent {
        hasher.update(parent.as_str().as_bytes());
    }
    hasher.update(&[u8::from(deleted)]);
    hasher.update(&serde_json::to_vec(properties).unwrap_or_default());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..32].to_owned()
}
