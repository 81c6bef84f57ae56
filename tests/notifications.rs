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

use serde_json::json;

use revdoc::db::{DocumentChange, RevisionId};
use common::{memory_database, properties, RecordingObserver};

mod common;

#[tokio::test]
async fn external_changes_notify_observers() -> anyhow::Result<()> {
    let (transport, database) = memory_database();
    database.set_change_tracking(true);
    let document = database.document("doc1");

    let first = document
        .put_properties(properties(json!({"name": "Alice"})))
        .await?;
    let observer = RecordingObserver::new();
    document.add_observer(&observer);

    // Another writer's revision arrives through the change feed.
    let remote = RevisionId::new(2, "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0");
    transport.put_existing_revision(
        &"doc1".into(),
        Some(first.id()),
        remote.clone(),
        &properties(json!({"name": "Mallory"})),
    );
    database.apply_change(&DocumentChange {
        id: "doc1".into(),
        revision_id: remote.clone(),
        deleted: false,
    });

    assert_eq!(observer.len(), 1);
    let (changed_id, changed_revision) = observer.last().unwrap();
    assert_eq!(changed_id, "doc1".into());
    assert_eq!(changed_revision, Some(remote));
    Ok(())
}

#[tokio::test]
async fn own_writes_are_suppressed() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    database.set_change_tracking(true);
    let document = database.document("doc1");

    let observer = RecordingObserver::new();
    document.add_observer(&observer);

    let revision = document
        .put_properties(properties(json!({"name": "Alice"})))
        .await?;

    // The feed echoes our own write back; the cache already reflects it.
    database.apply_change(&DocumentChange {
        id: "doc1".into(),
        revision_id: revision.id().clone(),
        deleted: false,
    });

    assert_eq!(observer.len(), 0);
    Ok(())
}

#[tokio::test]
async fn changes_are_ignored_while_tracking_is_disabled() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    let document = database.document("doc1");

    let revision = document
        .put_properties(properties(json!({"name": "Alice"})))
        .await?;
    let observer = RecordingObserver::new();
    document.add_observer(&observer);

    database.apply_change(&DocumentChange {
        id: "doc1".into(),
        revision_id: RevisionId::new(2, "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0"),
        deleted: false,
    });

    assert_eq!(observer.len(), 0);
    assert_eq!(document.current_revision_id(), Some(revision.id().clone()));
    Ok(())
}

#[tokio::test]
async fn external_changes_invalidate_the_cache() -> anyhow::Result<()> {
    let (transport, database) = memory_database();
    database.set_change_tracking(true);
    let document = database.document("doc1");

    let first = document
        .put_properties(properties(json!({"name": "Alice"})))
        .await?;
    let cached = document.current_revision().await?.unwrap();

    let remote = RevisionId::new(2, "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0");
    transport.put_existing_revision(
        &"doc1".into(),
        Some(first.id()),
        remote.clone(),
        &properties(json!({"name": "Mallory"})),
    );
    database.apply_change(&DocumentChange {
        id: "doc1".into(),
        revision_id: remote.clone(),
        deleted: false,
    });

    let refreshed = document.current_revision().await?.unwrap();
    assert!(!Arc::ptr_eq(&cached, &refreshed));
    assert_eq!(refreshed.id(), &remote);
    assert_eq!(document.property("name").await?, Some(json!("Mallory")));
    Ok(())
}

#[tokio::test]
async fn deletion_changes_mark_the_document_deleted() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    database.set_change_tracking(true);
    let document = database.document("doc1");

    document
        .put_properties(properties(json!({"name": "Alice"})))
        .await?;
    assert!(!document.is_deleted());

    database.apply_change(&DocumentChange {
        id: "doc1".into(),
        revision_id: RevisionId::new(2, "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0"),
        deleted: true,
    });

    assert!(document.is_deleted());
    Ok(())
}

#[tokio::test]
async fn removed_and_dropped_observers_stop_firing() -> anyhow::Result<()> {
    let (_, database) = memory_database();
    database.set_change_tracking(true);
    let document = database.document("doc1");

    let removed = RecordingObserver::new();
    let dropped = RecordingObserver::new();
    let kept = RecordingObserver::new();
    document.add_observer(&removed);
    document.add_observer(&dropped);
    document.add_observer(&kept);

    document.remove_observer(&removed);
    drop(dropped);

    database.apply_change(&DocumentChange {
        id: "doc1".into(),
        revision_id: RevisionId::new(1, "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0"),
        deleted: false,
    });

    assert_eq!(removed.len(), 0);
    assert_eq!(kept.len(), 1);
    Ok(())
}

#[tokio::test]
async fn changes_for_unknown_documents_are_dropped() {
    let (_, database) = memory_database();
    database.set_change_tracking(true);

    // No document instance for this ID has ever been handed out.
    database.apply_change(&DocumentChange {
        id: "stranger".into(),
        revision_id: RevisionId::new(1, "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0"),
        deleted: false,
    });
}
