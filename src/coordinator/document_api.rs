//! Raw document API: save, load and remove documents by index, type and id,
//! without going through the system of record.

use serde_json::Value;
use tracing::debug;

use crate::document::stamp_discriminator;
use crate::entity::{ID_FIELD, TYPE_FIELD};
use crate::metrics::{self, LatencyTimer};
use crate::storage::traits::{DocumentWrite, SearchError, WriteAck, WriteMode};

use super::{LoadResult, RemoveOutcome, SearchSync};

impl SearchSync {
    // ═══════════════════════════════════════════════════════════════════════════
    // Raw documents
    // ═══════════════════════════════════════════════════════════════════════════

    /// Write a document body directly.
    ///
    /// The type comes from `doc_type` or the body's `entity$` field, the id from
    /// `id` or the body's `id` field. Without an id the backend assigns one.
    /// A missing body or type is rejected before any backend call.
    #[tracing::instrument(skip(self, data))]
    pub async fn save_document(
        &self,
        index: Option<&str>,
        doc_type: Option<&str>,
        data: Value,
        id: Option<&str>,
    ) -> Result<WriteAck, SearchError> {
        let _timer = LatencyTimer::new("save");

        let Value::Object(mut body) = data else {
            return Err(SearchError::Validation("document data must be an object".into()));
        };
        let doc_type = doc_type
            .map(str::to_string)
            .or_else(|| body.get(TYPE_FIELD).and_then(Value::as_str).map(str::to_string))
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SearchError::Validation("document type is required".into()))?;
        let id = match id {
            Some(id) if !id.trim().is_empty() => Some(id.to_string()),
            Some(_) => return Err(SearchError::Validation("document id must not be empty".into())),
            None => match body.get(ID_FIELD) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        };
        let index = self.index_name(index)?;

        stamp_discriminator(&mut body, &doc_type);
        self.ensure_index(&index).await?;

        let result = self
            .client
            .write_document(DocumentWrite {
                index,
                id,
                body,
                mode: WriteMode::Create,
                refresh: self.config.refresh_on_save,
            })
            .await;

        match &result {
            Ok(ack) => {
                metrics::record_index_write("create");
                metrics::record_operation("save", "success");
                debug!(index = %ack.index, id = %ack.id, doc_type = %doc_type, "Document saved");
            }
            Err(_) => metrics::record_operation("save", "error"),
        }
        result
    }

    /// Load a document by id.
    ///
    /// A missing document, or one whose `entity$` differs from `doc_type`, is
    /// [`LoadResult::NotFound`] rather than an error.
    #[tracing::instrument(skip(self))]
    pub async fn load(
        &self,
        index: Option<&str>,
        doc_type: Option<&str>,
        id: &str,
    ) -> Result<LoadResult, SearchError> {
        let _timer = LatencyTimer::new("load");

        if id.trim().is_empty() {
            return Err(SearchError::Validation("document id is required".into()));
        }
        let index = self.index_name(index)?;
        self.ensure_index(&index).await?;

        let found = match self.client.get_document(&index, id).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                metrics::record_operation("load", "error");
                return Err(e);
            }
        };

        let result = match found {
            Some(doc) if doc_type.map_or(true, |t| doc.doc_type() == Some(t)) => LoadResult::Found(doc),
            Some(doc) => {
                debug!(index = %index, id = %id, stored = ?doc.doc_type(), "Document type differs, not found");
                LoadResult::NotFound
            }
            None => LoadResult::NotFound,
        };

        metrics::record_operation("load", if result.is_found() { "success" } else { "not_found" });
        Ok(result)
    }

    /// Remove a document by id. Removing an absent document succeeds.
    ///
    /// With a `doc_type`, a document of another type is left in place and
    /// reported as absent.
    #[tracing::instrument(skip(self))]
    pub async fn remove_document(
        &self,
        index: Option<&str>,
        doc_type: Option<&str>,
        id: &str,
    ) -> Result<RemoveOutcome, SearchError> {
        let _timer = LatencyTimer::new("remove");

        if id.trim().is_empty() {
            return Err(SearchError::Validation("document id is required".into()));
        }
        let index = self.index_name(index)?;

        if let Some(doc_type) = doc_type {
            let stored = match self.client.get_document(&index, id).await {
                Ok(doc) => doc,
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            if stored.as_ref().and_then(|d| d.doc_type()) != Some(doc_type) {
                metrics::record_operation("remove", "not_found");
                return Ok(RemoveOutcome {
                    id: id.to_string(),
                    document_existed: false,
                });
            }
        }

        let document_existed = match self
            .client
            .delete_document(&index, id, self.config.refresh_on_save)
            .await
        {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!(index = %index, id = %id, "Document already absent");
                false
            }
            Err(e) => {
                metrics::record_operation("remove", "error");
                return Err(e);
            }
        };

        metrics::record_operation("remove", if document_existed { "success" } else { "not_found" });
        Ok(RemoveOutcome {
            id: id.to_string(),
            document_existed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::SearchSyncConfig;
    use crate::storage::memory::InMemorySearchClient;

    use super::*;

    fn sync() -> SearchSync {
        SearchSync::new(SearchSyncConfig::default(), Arc::new(InMemorySearchClient::new())).unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let sync = sync();
        let ack = sync
            .save_document(Some("idx1"), Some("type1"), json!({"name": "caramel"}), Some("abcd"))
            .await
            .unwrap();
        assert_eq!(ack.id, "abcd");
        assert!(ack.created);

        let doc = sync.load(Some("idx1"), Some("type1"), "abcd").await.unwrap().document().unwrap();
        assert_eq!(doc.source["name"], "caramel");
        assert_eq!(doc.source["entity$"], "type1");
    }

    #[tokio::test]
    async fn test_type_and_id_taken_from_body() {
        let sync = sync();
        let ack = sync
            .save_document(None, None, json!({"id": 7, "entity$": "t", "v": 1}), None)
            .await
            .unwrap();
        assert_eq!(ack.index, "search");
        assert_eq!(ack.id, "7");
    }

    #[tokio::test]
    async fn test_backend_assigns_id_when_absent() {
        let sync = sync();
        let ack = sync.save_document(None, Some("t"), json!({"v": 1}), None).await.unwrap();
        assert!(!ack.id.is_empty());
        assert!(sync.load(None, Some("t"), &ack.id).await.unwrap().is_found());
    }

    #[tokio::test]
    async fn test_save_validation() {
        let sync = sync();
        let err = sync.save_document(None, None, json!({"v": 1}), None).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
        let err = sync.save_document(None, Some("t"), json!("text"), None).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
        assert!(!sync.has_index("search").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_missing_or_mistyped_is_not_found() {
        let sync = sync();
        assert_eq!(sync.load(Some("idx1"), None, "nope").await.unwrap(), LoadResult::NotFound);

        sync.save_document(Some("idx1"), Some("a"), json!({}), Some("1")).await.unwrap();
        assert_eq!(sync.load(Some("idx1"), Some("b"), "1").await.unwrap(), LoadResult::NotFound);
        assert!(sync.load(Some("idx1"), None, "1").await.unwrap().is_found());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_and_type_checked() {
        let sync = sync();
        sync.save_document(Some("idx1"), Some("a"), json!({}), Some("1")).await.unwrap();

        let wrong = sync.remove_document(Some("idx1"), Some("b"), "1").await.unwrap();
        assert!(!wrong.document_existed);
        assert!(sync.load(Some("idx1"), None, "1").await.unwrap().is_found());

        let first = sync.remove_document(Some("idx1"), Some("a"), "1").await.unwrap();
        assert!(first.document_existed);
        let again = sync.remove_document(Some("idx1"), None, "1").await.unwrap();
        assert!(!again.document_existed);
        let no_index = sync.remove_document(Some("nope"), None, "1").await.unwrap();
        assert!(!no_index.document_existed);
    }
}
