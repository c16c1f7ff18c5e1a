//! Per-user notifications and the unread counter on the user document.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use mclip_models::Notification;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::{Document, DocumentMask, FieldTransform, Precondition, ToFirestoreValue, Value, Write};

const USERS_COLLECTION: &str = "users";
const UNREAD_FIELD: &str = "unread_count";

/// Repository for `users/{uid}/notifications`.
#[derive(Clone)]
pub struct NotificationRepository {
    client: FirestoreClient,
}

impl NotificationRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn collection(user_id: &str) -> String {
        format!("{}/{}/notifications", USERS_COLLECTION, user_id)
    }

    /// Persist a notification and bump the user's unread counter in one
    /// atomic commit. Either both land or neither does.
    ///
    /// The user document is created when it does not exist yet.
    pub async fn record(&self, notification: &Notification) -> FirestoreResult<()> {
        let writes = vec![self.notification_write(notification), self.unread_write(&notification.user_id)];
        self.client.commit(writes).await?;
        debug!(
            user_id = %notification.user_id,
            notification_id = %notification.id,
            "Notification stored, unread counter incremented"
        );
        Ok(())
    }

    fn notification_write(&self, notification: &Notification) -> Write {
        let name = self
            .client
            .document_name(&Self::collection(&notification.user_id), &notification.id);
        Write {
            update: Document {
                name: Some(name),
                ..Document::new(notification_to_fields(notification))
            },
            update_mask: None,
            update_transforms: Vec::new(),
            current_document: Some(Precondition {
                exists: Some(false),
                update_time: None,
            }),
        }
    }

    fn unread_write(&self, user_id: &str) -> Write {
        let mut fields = HashMap::new();
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        Write {
            update: Document {
                name: Some(self.client.document_name(USERS_COLLECTION, user_id)),
                ..Document::new(fields)
            },
            update_mask: Some(DocumentMask {
                field_paths: vec!["updated_at".to_string()],
            }),
            update_transforms: vec![FieldTransform {
                field_path: UNREAD_FIELD.to_string(),
                increment: 1i64.to_firestore_value(),
            }],
            current_document: None,
        }
    }
}

fn notification_to_fields(n: &Notification) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), n.user_id.to_firestore_value());
    fields.insert("type".to_string(), n.notification_type.as_str().to_firestore_value());
    fields.insert("title".to_string(), n.title.to_firestore_value());
    fields.insert("message".to_string(), n.message.to_firestore_value());
    fields.insert("entity_id".to_string(), n.entity_id.to_firestore_value());
    fields.insert("entity_type".to_string(), n.entity_type.to_firestore_value());
    fields.insert("read".to_string(), n.read.to_firestore_value());
    fields.insert("created_at".to_string(), n.created_at.to_firestore_value());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::mock_client;
    use mclip_models::JobId;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "projects/test-project/databases/(default)/documents";
    const COMMIT_PATH: &str = "/v1/projects/test-project/databases/(default)/documents:commit";

    #[test]
    fn test_notification_fields() {
        let n = Notification::job_completed("u1", &JobId::from_string("j1"), 1, 2);
        let fields = notification_to_fields(&n);
        assert_eq!(fields["type"], Value::StringValue("clip_job_completed".into()));
        assert_eq!(fields["read"], Value::BooleanValue(false));
    }

    #[tokio::test]
    async fn test_record_commits_notification_and_counter_together() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .and(body_partial_json(serde_json::json!({
                "writes": [
                    {"currentDocument": {"exists": false}},
                    {
                        "updateMask": {"fieldPaths": ["updated_at"]},
                        "updateTransforms": [
                            {"fieldPath": "unread_count", "increment": {"integerValue": "1"}}
                        ]
                    }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"commitTime": "2026-01-01T00:00:00Z"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let repo = NotificationRepository::new(mock_client(&server.uri()).await);
        let n = Notification::job_completed("u1", &JobId::from_string("j1"), 2, 2);
        repo.record(&n).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let names: Vec<&str> = body["writes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["update"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                format!("{}/users/u1/notifications/{}", DOCS, n.id).as_str(),
                format!("{}/users/u1", DOCS).as_str(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing_separately() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let repo = NotificationRepository::new(mock_client(&server.uri()).await);
        let n = Notification::job_completed("u1", &JobId::from_string("j1"), 0, 1);
        assert!(repo.record(&n).await.is_err());

        // Only commit attempts; no standalone record or counter writes.
        let requests = server.received_requests().await.unwrap();
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|r| r.url.path() == COMMIT_PATH));
    }
}
