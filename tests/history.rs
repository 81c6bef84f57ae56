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

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use revdoc::db::{Database, DocumentId, JsonMap, RevisionId, RevisionStatus};
use revdoc::transport::{HistoryEntry, RevisionDoc, Transport};
use revdoc::Result;
use common::{memory_database, properties};

mod common;

#[tokio::test]
async fn history_is_forward_chronological() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    let document = database.document("doc1");

    let mut ids = Vec::new();
    for name in ["Alice", "Bob", "Carol"] {
        let revision = document
            .put_properties(properties(json!({"name": name})))
            .await?;
        ids.push(revision.id().clone());
    }

    let history = document.revision_history().await?.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.oldest().unwrap().id, ids[0]);
    assert_eq!(history.latest().unwrap().id, ids[2]);
    assert!(!history.has_gaps());

    for (index, entry) in history.iter().enumerate() {
        assert_eq!(entry.id.generation(), index as u64 + 1);
        assert_eq!(entry.status, RevisionStatus::Available);
    }
    assert_eq!(history.position(&ids[1]), Some(1));
    assert!(history.contains(&ids[2]));
    Ok(())
}

#[tokio::test]
async fn history_of_a_missing_document() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    let document = database.document("missing");

    assert!(document.revision_history().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn compaction_prunes_old_bodies() -> anyhow::Result<()> {
    let (transport, database) = memory_database();
    let document = database.document("doc1");

    for name in ["Alice", "Bob", "Carol"] {
        document
            .put_properties(properties(json!({"name": name})))
            .await?;
    }
    transport.compact(&"doc1".into());

    let history = document.revision_history().await?.unwrap();
    assert_eq!(history.len(), 3);
    let statuses: Vec<RevisionStatus> = history.iter().map(|entry| entry.status).collect();
    assert_eq!(
        statuses,
        vec![
            RevisionStatus::Missing,
            RevisionStatus::Missing,
            RevisionStatus::Available,
        ]
    );

    // Pruned bodies are gone, but the current revision still reads fine.
    let pruned = history.oldest().unwrap().id.clone();
    assert!(document.fetch_revision(&pruned).await?.is_none());
    assert_eq!(document.property("name").await?, Some(json!("Carol")));
    Ok(())
}

#[tokio::test]
async fn history_ends_with_a_tombstone_after_delete() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    let document = database.document("doc1");

    document
        .put_properties(properties(json!({"name": "Alice"})))
        .await?;
    document.delete().await?;

    let history = document.revision_history().await?.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.latest().unwrap().status, RevisionStatus::Deleted);
    assert_eq!(history.oldest().unwrap().status, RevisionStatus::Available);
    Ok(())
}

/// A `Transport` which reports a fixed, pruned revision history.
///
/// Servers are allowed to forget whole generations; the history type has to
/// tolerate the gaps.
#[derive(Debug)]
struct PrunedHistoryTransport;

#[async_trait]
impl Transport for PrunedHistoryTransport {
    async fn get_revision(
        &self,
        _id: &DocumentId,
        _revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>> {
        Ok(None)
    }

    async fn list_leaves(&self, _id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>> {
        Ok(None)
    }

    async fn revision_history(&self, _id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>> {
        Ok(Some(vec![
            HistoryEntry {
                id: RevisionId::new(1, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                status: RevisionStatus::Missing,
            },
            HistoryEntry {
                id: RevisionId::new(4, "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
                status: RevisionStatus::Available,
            },
        ]))
    }

    async fn put_revision(
        &self,
        _id: &DocumentId,
        _parent: Option<&RevisionId>,
        _contents: &JsonMap,
    ) -> Result<RevisionId> {
        Ok(RevisionId::new(1, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"))
    }
}

#[tokio::test]
async fn history_tolerates_generation_gaps() -> anyhow::Result<()> {
    let database = Database::new(Arc::new(PrunedHistoryTransport));
    let document = database.document("doc1");

    let history = document.revision_history().await?.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.has_gaps());
    let latest = history.latest().unwrap().id.clone();
    assert_eq!(latest.generation(), 4);
    assert_eq!(history.position(&latest), Some(1));
    Ok(())
}
