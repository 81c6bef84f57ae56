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

use anyhow::anyhow;
use async_trait::async_trait;
use log::warn;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::db::revision::REV_FIELD;
use crate::db::{DocumentId, JsonMap, RevisionId, RevisionStatus};
use crate::transport::{HistoryEntry, RevisionDoc, Transport};
use crate::{Error, Result};

/// The query-artifact field listing non-winning leaf revisions.
const CONFLICTS_FIELD: &str = "_conflicts";

/// The query-artifact field listing revision history entries.
const REVS_INFO_FIELD: &str = "_revs_info";

/// A `Transport` which talks to a document database over its REST API.
///
/// Each transport addresses one database on one server; documents live under
/// `{base_url}/{database}/{document_id}`. Revisions are read with `GET`
/// (optionally pinned to a revision with `?rev=`), leaves are enumerated with
/// `?conflicts=true`, history with `?revs_info=true`, and writes are `PUT`s
/// carrying the parent revision as the `rev` query parameter.
///
/// Authentication, connection pooling, and TLS are the [`Client`]'s concern;
/// pass a configured client to [`with_client`] to customize them. Retry policy
/// is deliberately not implemented here.
///
/// [`Client`]: reqwest::Client
/// [`with_client`]: HttpTransport::with_client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    database_url: Url,
}

impl HttpTransport {
    /// Create a transport for `database` on the server at `base_url`.
    pub fn new(base_url: &str, database: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url, database)
    }

    /// Like [`new`], but requests are sent through the given `client`.
    ///
    /// [`new`]: HttpTransport::new
    pub fn with_client(client: Client, base_url: &str, database: &str) -> Result<Self> {
        let mut database_url =
            Url::parse(base_url).map_err(|err| Error::Transport(err.into()))?;
        database_url
            .path_segments_mut()
            .map_err(|_| Error::Transport(anyhow!("the base URL cannot be a base")))?
            .pop_if_empty()
            .push(database);
        Ok(HttpTransport {
            client,
            database_url,
        })
    }

    fn document_url(&self, id: &DocumentId) -> Url {
        let mut url = self.database_url.clone();
        // The database URL is known to be a base; `path_segments_mut` cannot
        // fail here.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id.as_str());
        }
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_revision(
        &self,
        id: &DocumentId,
        revision: Option<&RevisionId>,
    ) -> Result<Option<RevisionDoc>> {
        let mut url = self.document_url(id);
        if let Some(revision) = revision {
            url.query_pairs_mut().append_pair("rev", revision.as_str());
        }
        let response = self.client.get(url).send().await.map_err(transport_err)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let contents: JsonMap =
                    response.json().await.map_err(|_| Error::Deserialize)?;
                Ok(Some(doc_from_contents(contents)?))
            }
            status => Err(status_err(status)),
        }
    }

    async fn list_leaves(&self, id: &DocumentId) -> Result<Option<Vec<RevisionDoc>>> {
        let mut url = self.document_url(id);
        url.query_pairs_mut().append_pair("conflicts", "true");
        let response = self.client.get(url).send().await.map_err(transport_err)?;
        let mut contents: JsonMap = match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if status.is_success() => {
                response.json().await.map_err(|_| Error::Deserialize)?
            }
            status => return Err(status_err(status)),
        };

        let conflicts = match contents.remove(CONFLICTS_FIELD) {
            Some(Value::Array(revisions)) => revisions
                .into_iter()
                .filter_map(|value| match value {
                    Value::String(rev) => Some(RevisionId::from(rev)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let mut leaves = vec![doc_from_contents(contents)?];
        for revision in conflicts {
            // The conflicting leaves are fetched individually; one vanishing
            // between the two requests is skipped, and re-running conflict
            // detection will see the new state.
            match self.get_revision(id, Some(&revision)).await? {
                Some(doc) => leaves.push(doc),
                None => warn!(
                    "conflicting revision {} of document {} disappeared during enumeration",
                    revision, id,
                ),
            }
        }
        Ok(Some(leaves))
    }

    async fn revision_history(&self, id: &DocumentId) -> Result<Option<Vec<HistoryEntry>>> {
        #[derive(Deserialize)]
        struct RevInfo {
            rev: String,
            status: String,
        }

        let mut url = self.document_url(id);
        url.query_pairs_mut().append_pair("revs_info", "true");
        let response = self.client.get(url).send().await.map_err(transport_err)?;
        let mut contents: JsonMap = match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if status.is_success() => {
                response.json().await.map_err(|_| Error::Deserialize)?
            }
            status => return Err(status_err(status)),
        };

        let infos = contents.remove(REVS_INFO_FIELD).ok_or(Error::Deserialize)?;
        let infos: Vec<RevInfo> =
            serde_json::from_value(infos).map_err(|_| Error::Deserialize)?;

        // The server reports newest first; callers get forward chronological
        // order.
        let mut entries: Vec<HistoryEntry> = infos
            .into_iter()
            .map(|info| HistoryEntry {
                id: RevisionId::from(info.rev),
                status: match info.status.as_str() {
                    "available" => RevisionStatus::Available,
                    "deleted" => RevisionStatus::Deleted,
                    _ => RevisionStatus::Missing,
                },
            })
            .collect();
        entries.reverse();
        Ok(Some(entries))
    }

    async fn put_revision(
        &self,
        id: &DocumentId,
        parent: Option<&RevisionId>,
        contents: &JsonMap,
    ) -> Result<RevisionId> {
        #[derive(Deserialize)]
        struct PutResponse {
            rev: String,
        }

        let mut url = self.document_url(id);
        if let Some(parent) = parent {
            url.query_pairs_mut().append_pair("rev", parent.as_str());
        }
        let response = self
            .client
            .put(url)
            .json(contents)
            .send()
            .await
            .map_err(transport_err)?;
        match response.status() {
            StatusCode::CONFLICT => Err(Error::Conflict),
            status if status.is_success() => {
                let put: PutResponse =
                    response.json().await.map_err(|_| Error::Deserialize)?;
                Ok(RevisionId::from(put.rev))
            }
            status => Err(status_err(status)),
        }
    }
}

/// Build the wire shape of a revision from a fetched document object.
fn doc_from_contents(contents: JsonMap) -> Result<RevisionDoc> {
    let id = match contents.get(REV_FIELD) {
        Some(Value::String(rev)) => RevisionId::from(rev.as_str()),
        _ => return Err(Error::Deserialize),
    };
    Ok(RevisionDoc { id, contents })
}

fn transport_err(err: reqwest::Error) -> Error {
    Error::Transport(err.into())
}

fn status_err(status: StatusCode) -> Error {
    if status == StatusCode::CONFLICT {
        Error::Conflict
    } else {
        Error::Transport(anyhow!("the server returned {}", status))
    }
}
