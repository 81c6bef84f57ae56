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

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};
use serde_json::Value;

use crate::db::notify::{DocumentChange, DocumentObserver};
use crate::db::revision::{strip_reserved, DELETED_FIELD, ID_FIELD, REV_FIELD};
use crate::db::{DocumentId, JsonMap, Revision, RevisionHistory, RevisionId};
use crate::transport::{RevisionDoc, Transport};
use crate::{Error, Result};

/// The outcome of resolving a set of conflicting revisions.
///
/// Resolution is a multi-step operation: one put creates the new winning
/// revision and one put per superseded branch tombstones it. The winning put
/// failing fails the whole operation, but tombstone failures are independent
/// and non-fatal; they are reported here so callers can re-run
/// [`Document::conflicting_revisions`] and retry the stale branches.
#[derive(Debug)]
pub struct Resolution {
    winner: Option<Arc<Revision>>,
    tombstoned: Vec<RevisionId>,
    failed: Vec<(RevisionId, Error)>,
}

impl Resolution {
    fn empty() -> Self {
        Resolution {
            winner: None,
            tombstoned: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// The new winning revision, or `None` if the conflict set was empty.
    pub fn winner(&self) -> Option<&Arc<Revision>> {
        self.winner.as_ref()
    }

    /// The IDs of the conflicting revisions that were tombstoned.
    pub fn tombstoned(&self) -> &[RevisionId] {
        &self.tombstoned
    }

    /// The conflicting revisions whose tombstone puts failed, with the error
    /// each put completed with.
    pub fn failed(&self) -> &[(RevisionId, Error)] {
        &self.failed
    }

    /// Return whether every superseded branch was tombstoned.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The mutable, cache-like state of a document.
///
/// Mutated only on successful completion of the operation that triggered the
/// change, or by an external change notification.
#[derive(Debug, Default)]
struct DocState {
    current_revision_id: Option<RevisionId>,
    current_revision: Option<Arc<Revision>>,
    is_deleted: bool,
}

/// A document in a remote document database, aka "record" aka "row".
///
/// A document's mutable state is derived from an immutable chain of
/// [`Revision`]s. The document tracks which revision is current, caches it,
/// and exposes property access, updates, and the conflict workflow on top of
/// it.
///
/// Documents are never constructed directly; get one from
/// [`Database::document`], which guarantees that the same ID always yields the
/// same instance.
///
/// Cached state is at-most-eventually consistent: concurrent updates against
/// the same document are not serialized locally, and external change
/// notifications may interleave arbitrarily with in-flight operations. The
/// server's parent-revision check is the sole write arbiter.
///
/// [`Database::document`]: crate::db::Database::document
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    transport: Arc<dyn Transport>,
    state: Mutex<DocState>,
    observers: Mutex<Vec<Weak<dyn DocumentObserver>>>,
    model_object: Mutex<Option<Weak<dyn Any + Send + Sync>>>,
}

impl Document {
    pub(crate) fn new(id: DocumentId, transport: Arc<dyn Transport>) -> Self {
        Document {
            id,
            transport,
            state: Mutex::new(DocState::default()),
            observers: Mutex::new(Vec::new()),
            model_object: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, DocState> {
        self.state.lock().unwrap()
    }

    /// The stable ID of this document.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Return whether the current revision is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.state().is_deleted
    }

    /// The ID of the current revision, if known.
    pub fn current_revision_id(&self) -> Option<RevisionId> {
        self.state().current_revision_id.clone()
    }

    /// The current revision of this document.
    ///
    /// The revision is cached: repeated calls without an intervening update or
    /// external change return the same instance without touching the
    /// transport. On a cache miss this fetches the revision identified by the
    /// last known current-revision ID, or the server's winning revision if no
    /// ID is known yet.
    ///
    /// This returns `Ok(None)` if the document does not exist remotely.
    pub async fn current_revision(&self) -> Result<Option<Arc<Revision>>> {
        let known_id = {
            let state = self.state();
            if let Some(revision) = &state.current_revision {
                return Ok(Some(Arc::clone(revision)));
            }
            state.current_revision_id.clone()
        };

        debug!("fetching current revision of document {}", self.id);
        let doc = match self
            .transport
            .get_revision(&self.id, known_id.as_ref())
            .await?
        {
            Some(doc) => doc,
            None => return Ok(None),
        };
        let revision = Arc::new(Revision::loaded(self.id.clone(), doc));

        let mut state = self.state();
        // A concurrent call may have populated the cache first; keep the
        // instance callers already hold.
        if let Some(existing) = &state.current_revision {
            return Ok(Some(Arc::clone(existing)));
        }
        state.current_revision_id = Some(revision.id().clone());
        state.is_deleted = revision.is_deleted();
        state.current_revision = Some(Arc::clone(&revision));
        Ok(Some(revision))
    }

    /// Return a deferred reference to the revision with the given ID.
    ///
    /// This is merely a factory: it performs no network access and does not
    /// verify that the ID denotes a real revision, so it never fails, even for
    /// malformed input. Use [`fetch_revision`] to get a loaded snapshot.
    ///
    /// [`fetch_revision`]: Document::fetch_revision
    pub fn revision_with_id(&self, id: impl Into<RevisionId>) -> Arc<Revision> {
        Arc::new(Revision::unloaded(self.id.clone(), id.into()))
    }

    /// Fetch a loaded snapshot of the revision with the given ID.
    ///
    /// This works for any revision the server still has the body of,
    /// including tombstones and superseded branches. It returns `Ok(None)` if
    /// the revision does not exist remotely or its body has been pruned.
    pub async fn fetch_revision(&self, id: &RevisionId) -> Result<Option<Arc<Revision>>> {
        match self.transport.get_revision(&self.id, Some(id)).await? {
            Some(doc) => Ok(Some(Arc::new(Revision::loaded(self.id.clone(), doc)))),
            None => Ok(None),
        }
    }

    /// The revision history of this document, oldest first.
    ///
    /// This returns `Ok(None)` if the document does not exist remotely.
    pub async fn revision_history(&self) -> Result<Option<RevisionHistory>> {
        Ok(self
            .transport
            .revision_history(&self.id)
            .await?
            .map(RevisionHistory::new))
    }

    /// The application-defined properties of the current revision.
    ///
    /// This is shorthand for the current revision's [`properties`], and
    /// returns an empty map if there is no current revision.
    ///
    /// [`properties`]: crate::db::Revision::properties
    pub async fn properties(&self) -> Result<JsonMap> {
        match self.current_revision().await? {
            Some(revision) => Ok(revision.properties().unwrap_or_default()),
            None => Ok(JsonMap::new()),
        }
    }

    /// Return the value of the application-defined property `key`.
    ///
    /// This is `Ok(None)` if the key is missing or there is no current
    /// revision.
    pub async fn property(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.properties().await?.remove(key))
    }

    /// Update the document with new properties.
    ///
    /// The properties are submitted as a new revision whose parent is the
    /// current revision. On success the new revision becomes current and is
    /// returned; the deletion state is recomputed from the submitted
    /// properties (a `"_deleted": true` entry makes the new revision a
    /// tombstone).
    ///
    /// If another writer updated the document first, this fails with
    /// [`Error::Conflict`] and the local current-revision state is left
    /// untouched. Callers must detect this and run the conflict workflow; see
    /// [`conflicting_revisions`].
    ///
    /// [`Error::Conflict`]: crate::Error::Conflict
    /// [`conflicting_revisions`]: Document::conflicting_revisions
    pub async fn put_properties(&self, properties: JsonMap) -> Result<Arc<Revision>> {
        let parent = self.state().current_revision_id.clone();
        let (contents, deleted) = build_contents(&properties);

        debug!(
            "putting document {} with parent {:?}",
            self.id,
            parent.as_ref().map(RevisionId::as_str),
        );
        let new_id = self
            .transport
            .put_revision(&self.id, parent.as_ref(), &contents)
            .await?;
        debug!("document {} is now at revision {}", self.id, new_id);

        Ok(self.install_current(new_id, contents, deleted))
    }

    /// Delete the document by writing a tombstone revision.
    ///
    /// This is equivalent to putting properties whose only entry is
    /// `"_deleted": true`, and fails with [`Error::Conflict`] under the same
    /// conditions as [`put_properties`].
    ///
    /// [`Error::Conflict`]: crate::Error::Conflict
    /// [`put_properties`]: Document::put_properties
    pub async fn delete(&self) -> Result<Arc<Revision>> {
        let mut tombstone = JsonMap::new();
        tombstone.insert(DELETED_FIELD.to_owned(), Value::Bool(true));
        self.put_properties(tombstone).await
    }

    /// Return the revisions that are currently in conflict, in no particular
    /// order.
    ///
    /// These are the live leaves of the document's revision tree. If there is
    /// no conflict, this returns a one-element sequence containing only the
    /// current revision. An empty sequence means the document has no live
    /// leaves at all, i.e. every branch is tombstoned.
    ///
    /// This returns `Ok(None)` if the document does not exist remotely.
    pub async fn conflicting_revisions(&self) -> Result<Option<Vec<Arc<Revision>>>> {
        let leaves = match self.transport.list_leaves(&self.id).await? {
            Some(leaves) => leaves,
            None => return Ok(None),
        };

        if leaves.len() == 1 {
            // No conflict; hand back the instance callers already hold.
            return Ok(self.current_revision().await?.map(|revision| vec![revision]));
        }

        Ok(Some(
            leaves
                .into_iter()
                .map(|doc| Arc::new(Revision::loaded(self.id.clone(), doc)))
                .collect(),
        ))
    }

    /// Resolve a conflict by choosing one existing revision as the winner.
    ///
    /// This extracts the winning revision's properties and delegates to
    /// [`resolve_conflict`]; the parent of the new revision is still the
    /// *first* entry of `conflicts`, regardless of which member won.
    ///
    /// # Errors
    /// - `Error::NotInConflictSet`: `winner` is not a member of `conflicts`.
    /// - `Error::NotLoaded`: `winner` is an unloaded reference, so its
    ///   properties cannot be extracted.
    ///
    /// Neither failure touches the cached current-revision state.
    ///
    /// [`resolve_conflict`]: Document::resolve_conflict
    pub async fn resolve_conflict_with_revision(
        &self,
        conflicts: &[Arc<Revision>],
        winner: &Arc<Revision>,
    ) -> Result<Resolution> {
        if !conflicts.iter().any(|revision| revision == winner) {
            return Err(Error::NotInConflictSet);
        }
        let properties = winner.properties().ok_or(Error::NotLoaded)?;
        self.resolve_conflict(conflicts, properties).await
    }

    /// Resolve a conflict by creating a new winning revision from the given
    /// properties.
    ///
    /// One new revision is created from `properties`, parented on the *first*
    /// entry of `conflicts`. That branch is extended, and the choice is the
    /// caller's: reorder the slice to extend a different branch. Every other
    /// member of `conflicts` is then tombstoned so it stops being a live leaf.
    ///
    /// An empty `conflicts` slice is a no-op success. If creating the winning
    /// revision fails, the whole operation fails and nothing is tombstoned.
    /// Individual tombstone failures do not fail the operation; they are
    /// reported in the returned [`Resolution`], and the affected branches
    /// remain discoverable through [`conflicting_revisions`].
    ///
    /// [`conflicting_revisions`]: Document::conflicting_revisions
    pub async fn resolve_conflict(
        &self,
        conflicts: &[Arc<Revision>],
        properties: JsonMap,
    ) -> Result<Resolution> {
        let (parent, losers) = match conflicts.split_first() {
            Some(split) => split,
            None => return Ok(Resolution::empty()),
        };

        debug!(
            "resolving {} conflicting revisions of document {} onto {}",
            conflicts.len(),
            self.id,
            parent.id(),
        );
        let (contents, deleted) = build_contents(&properties);
        let new_id = self
            .transport
            .put_revision(&self.id, Some(parent.id()), &contents)
            .await?;
        let winner = self.install_current(new_id, contents, deleted);

        let mut tombstone = JsonMap::new();
        tombstone.insert(DELETED_FIELD.to_owned(), Value::Bool(true));

        let mut tombstoned = Vec::new();
        let mut failed = Vec::new();
        for loser in losers {
            match self
                .transport
                .put_revision(&self.id, Some(loser.id()), &tombstone)
                .await
            {
                Ok(_) => tombstoned.push(loser.id().clone()),
                Err(err) => {
                    warn!(
                        "failed to tombstone conflicting revision {} of document {}: {}",
                        loser.id(),
                        self.id,
                        err,
                    );
                    failed.push((loser.id().clone(), err));
                }
            }
        }

        Ok(Resolution {
            winner: Some(winner),
            tombstoned,
            failed,
        })
    }

    /// Associate an application-defined model object with this document.
    ///
    /// The handle is not interpreted by this crate and the reference is weak:
    /// the owning application is solely responsible for the object's
    /// lifetime.
    pub fn set_model_object<M>(&self, object: &Arc<M>)
    where
        M: Any + Send + Sync,
    {
        let object: Arc<dyn Any + Send + Sync> = object.clone();
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&object);
        *self.model_object.lock().unwrap() = Some(weak);
    }

    /// Remove the associated model object, if any.
    pub fn clear_model_object(&self) {
        *self.model_object.lock().unwrap() = None;
    }

    /// The associated model object, if it is set and still alive.
    pub fn model_object(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.model_object
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Register an observer for external changes to this document.
    ///
    /// The observer is held weakly and pruned automatically once dropped. See
    /// [`DocumentObserver`] for when observers fire.
    ///
    /// [`DocumentObserver`]: crate::db::DocumentObserver
    pub fn add_observer<O>(&self, observer: &Arc<O>)
    where
        O: DocumentObserver + 'static,
    {
        let observer: Arc<dyn DocumentObserver> = observer.clone();
        let weak: Weak<dyn DocumentObserver> = Arc::downgrade(&observer);
        self.observers.lock().unwrap().push(weak);
    }

    /// Unregister a previously registered observer.
    pub fn remove_observer<O>(&self, observer: &Arc<O>)
    where
        O: DocumentObserver + 'static,
    {
        let target = Arc::as_ptr(observer) as *const ();
        self.observers.lock().unwrap().retain(|weak| match weak.upgrade() {
            Some(registered) => Arc::as_ptr(&registered) as *const () != target,
            None => false,
        });
    }

    /// React to an external change reported by the change feed.
    ///
    /// Changes caused by this process's own writes are suppressed: the cache
    /// already reflects them, and observers only care about changes made
    /// elsewhere.
    pub(crate) fn note_external_change(&self, change: &DocumentChange) {
        {
            let mut state = self.state();
            if state.current_revision_id.as_ref() == Some(&change.revision_id) {
                return;
            }
            debug!(
                "document {} changed externally to revision {}",
                self.id, change.revision_id,
            );
            state.current_revision_id = Some(change.revision_id.clone());
            state.current_revision = None;
            state.is_deleted = change.deleted;
        }
        self.notify_observers();
    }

    /// Make the revision written by a successful put the current one.
    fn install_current(&self, id: RevisionId, contents: JsonMap, deleted: bool) -> Arc<Revision> {
        let mut full = contents;
        full.insert(ID_FIELD.to_owned(), Value::String(self.id.to_string()));
        full.insert(REV_FIELD.to_owned(), Value::String(id.to_string()));
        let revision = Arc::new(Revision::loaded(
            self.id.clone(),
            RevisionDoc {
                id: id.clone(),
                contents: full,
            },
        ));

        let mut state = self.state();
        state.current_revision_id = Some(id);
        state.current_revision = Some(Arc::clone(&revision));
        state.is_deleted = deleted;
        revision
    }

    fn notify_observers(&self) {
        // Upgrade under the lock, invoke outside it.
        let observers: Vec<Arc<dyn DocumentObserver>> = {
            let mut observers = self.observers.lock().unwrap();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.document_changed(self);
        }
    }
}

/// Split caller-supplied properties into the raw contents to submit and the
/// tombstone flag they imply.
///
/// Reserved fields are dropped except `_deleted`, which callers may use to
/// mark deletion through a put.
fn build_contents(properties: &JsonMap) -> (JsonMap, bool) {
    let deleted = properties.get(DELETED_FIELD) == Some(&Value::Bool(true));
    let mut contents = strip_reserved(properties);
    if deleted {
        contents.insert(DELETED_FIELD.to_owned(), Value::Bool(true));
    }
    (contents, deleted)
}
