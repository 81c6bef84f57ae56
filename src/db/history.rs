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

use std::slice;

use serde::{Deserialize, Serialize};

use crate::db::RevisionId;
use crate::transport::HistoryEntry;

/// The availability of a revision on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    /// The revision's body is available.
    Available,

    /// The revision is a tombstone.
    Deleted,

    /// The revision is known by ID but its body has been pruned.
    Missing,
}

/// The revision history of one document, oldest first.
///
/// The history covers the ancestry of the current winning revision. Servers
/// may prune old revisions, so the sequence is not necessarily a consecutive
/// run of generations: entries can be reported as [`RevisionStatus::Missing`],
/// and whole generations can be absent. Callers must tolerate such gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionHistory {
    entries: Vec<HistoryEntry>,
}

impl RevisionHistory {
    pub(crate) fn new(entries: Vec<HistoryEntry>) -> Self {
        RevisionHistory { entries }
    }

    /// The number of entries in the history.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the history has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The history entries, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Return an iterator over the entries, oldest first.
    pub fn iter(&self) -> slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    /// The oldest known entry.
    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    /// The most recent entry, which identifies the current winning revision.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Return the position of the revision `id` in the history.
    pub fn position(&self, id: &RevisionId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.id == id)
    }

    /// Return whether the history contains the revision `id`.
    pub fn contains(&self, id: &RevisionId) -> bool {
        self.position(id).is_some()
    }

    /// Return whether generations are absent between adjacent entries.
    ///
    /// Gaps appear when the server has pruned intermediate revisions.
    pub fn has_gaps(&self) -> bool {
        self.entries
            .windows(2)
            .any(|pair| pair[1].id.generation() > pair[0].id.generation() + 1)
    }
}

impl<'a> IntoIterator for &'a RevisionHistory {
    type Item = &'a HistoryEntry;
    type IntoIter = slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
