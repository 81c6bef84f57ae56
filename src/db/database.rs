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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::debug;
use uuid::Uuid;
use weak_table::WeakValueHashMap;

use crate::db::notify::DocumentChange;
use crate::db::{Document, DocumentId};
use crate::transport::Transport;

/// A client-side handle to one database on a remote server.
///
/// The database is the factory for [`Document`] instances. Documents are
/// interned: for as long as any strong reference to a document is alive,
/// requesting the same ID returns the identical instance, so cached state and
/// registered observers are shared by everyone addressing that document.
///
/// The database also relays external change events to its documents; see
/// [`apply_change`]. Change tracking is off by default.
///
/// [`Document`]: crate::db::Document
/// [`apply_change`]: Database::apply_change
pub struct Database {
    transport: Arc<dyn Transport>,
    documents: Mutex<WeakValueHashMap<DocumentId, Weak<Document>>>,
    change_tracking: AtomicBool,
}

impl Database {
    /// Create a database handle over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Database {
            transport,
            documents: Mutex::new(WeakValueHashMap::new()),
            change_tracking: AtomicBool::new(false),
        }
    }

    /// The transport this database talks to the server through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Return the document with the given ID.
    ///
    /// This is the only way to obtain a [`Document`]. The instance is
    /// interned: the same ID returns the same instance for as long as a strong
    /// reference to it exists. No network access happens here; the document
    /// may not exist remotely yet.
    ///
    /// [`Document`]: crate::db::Document
    pub fn document(&self, id: impl Into<DocumentId>) -> Arc<Document> {
        let id = id.into();
        let mut documents = self.documents.lock().unwrap();
        if let Some(document) = documents.get(&id) {
            return document;
        }
        let document = Arc::new(Document::new(id.clone(), Arc::clone(&self.transport)));
        documents.insert(id, Arc::clone(&document));
        document
    }

    /// Return a new document with a freshly generated ID.
    pub fn untitled_document(&self) -> Arc<Document> {
        self.document(Uuid::new_v4().to_string())
    }

    /// Enable or disable the relaying of external change events.
    pub fn set_change_tracking(&self, enabled: bool) {
        self.change_tracking.store(enabled, Ordering::SeqCst);
    }

    /// Return whether external change events are relayed.
    pub fn change_tracking(&self) -> bool {
        self.change_tracking.load(Ordering::SeqCst)
    }

    /// Relay an external change event to the document it concerns.
    ///
    /// The surrounding application calls this with events it receives from the
    /// server's change feed. The event is ignored unless change tracking is
    /// enabled. Only documents this database has already handed out can react;
    /// a change for a document nobody holds is dropped.
    pub fn apply_change(&self, change: &DocumentChange) {
        if !self.change_tracking() {
            return;
        }
        let document = self.documents.lock().unwrap().get(&change.id);
        match document {
            Some(document) => document.note_external_change(change),
            None => debug!("dropping change for untracked document {}", change.id),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("transport", &self.transport)
            .field("change_tracking", &self.change_tracking())
            .finish_non_exhaustive()
    }
}
