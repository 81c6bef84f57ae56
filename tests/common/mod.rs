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

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use revdoc::db::{Database, Document, DocumentId, DocumentObserver, JsonMap, RevisionId};
use revdoc::transport::{HistoryEntry, MemoryTransport, RevisionDoc, Transport};
use revdoc::{Error, Result};

/// Create a database backed by a fresh in-memory transport.
pub fn memory_database() -> (Arc<MemoryTransport>, Database) {
    let transport = Arc::new(MemoryTransport::new());
    let database = Database::new(Arc::clone(&transport) as Arc<dyn Transport>);
    (transport, database)
}

/// Convert a `json!` object literal into a property map.
pub fn properties(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

/// A `Transport` which panics on any use.
///
/// For asserting that an operation performs no network access.
#[derive(Debug)]
pub struct PanickingTransport;

#[async_trait]
impl Transport for PanickingTransport {
    async fn get_revision(
        &self,
        _id: &DocumentId,
        _revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>> {
        panic!("unexpected transport access");
    }

    async fn list_leaves(&self, _id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>> {
        panic!("unexpected transport access");
    }

    async fn revision_history(&self, _id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>> {
        panic!("unexpected transport access");
    }

    async fn put_revision(
        &self,
        _id: &DocumentId,
        _parent: Option<&RevisionId>,
        _contents: &JsonMap,
    ) -> Result<RevisionId> {
        panic!("unexpected transport access");
    }
}

/// A `Transport` decorator which counts reads passing through it.
#[derive(Debug)]
pub struct CountingTransport<T> {
    inner: T,
    gets: AtomicUsize,
}

impl<T> CountingTransport<T> {
    pub fn new(inner: T) -> Self {
        CountingTransport {
            inner,
            gets: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// The number of `get_revision` calls made so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Transport> Transport for CountingTransport<T> {
    async fn get_revision(
        &self,
        id: &DocumentId,
        revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_revision(id, revision).await
    }

    async fn list_leaves(&self, id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>> {
        self.inner.list_leaves(id).await
    }

    async fn revision_history(&self, id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>> {
        self.inner.revision_history(id).await
    }

    async fn put_revision(
        &self,
        id: &DocumentId,
        parent: Option<&RevisionId>,
        contents: &JsonMap,
    ) -> Result<RevisionId> {
        self.inner.put_revision(id, parent, contents).await
    }
}

/// A `Transport` decorator which fails puts against chosen parent revisions.
///
/// For reproducing partial failures during conflict resolution.
#[derive(Debug)]
pub struct FailingTransport<T> {
    inner: T,
    fail_parents: Mutex<HashSet<RevisionId>>,
}

impl<T> FailingTransport<T> {
    pub fn new(inner: T) -> Self {
        FailingTransport {
            inner,
            fail_parents: Mutex::new(HashSet::new()),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Make every put whose parent is `revision` fail with a transport error.
    pub fn fail_puts_with_parent(&self, revision: RevisionId) {
        self.fail_parents.lock().unwrap().insert(revision);
    }
}

#[async_trait]
impl<T: Transport> Transport for FailingTransport<T> {
    async fn get_revision(
        &self,
        id: &DocumentId,
        revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>> {
        self.inner.get_revision(id, revision).await
    }

    async fn list_leaves(&self, id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>> {
        self.inner.list_leaves(id).await
    }

    async fn revision_history(&self, id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>> {
        self.inner.revision_history(id).await
    }

    async fn put_revision(
        &self,
        id: &DocumentId,
        parent: Option<&RevisionId>,
        contents: &JsonMap,
    ) -> Result<RevisionId> {
        if let Some(parent) = parent {
            if self.fail_parents.lock().unwrap().contains(parent) {
                return Err(Error::Transport(anyhow!("injected put failure")));
            }
        }
        self.inner.put_revision(id, parent, contents).await
    }
}

/// An observer which records every notification it receives.
#[derive(Default)]
pub struct RecordingObserver {
    changes: Mutex<Vec<(DocumentId, Option<RevisionId>)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingObserver::default())
    }

    /// The number of notifications received.
    pub fn len(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    /// The document and current-revision ID seen by the latest notification.
    pub fn last(&self) -> Option<(DocumentId, Option<RevisionId>)> {
        self.changes.lock().unwrap().last().cloned()
    }
}

impl DocumentObserver for RecordingObserver {
    fn document_changed(&self, document: &Document) {
        self.changes
            .lock()
            .unwrap()
            .push((document.id().clone(), document.current_revision_id()));
    }
}
