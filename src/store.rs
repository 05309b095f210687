//! Topic store: in-memory registry synchronized with SQLite.
//!
//! The store owns the authoritative index of topics and viewpoints for one
//! session. Every mutating operation persists first and updates the
//! in-memory index only after the write succeeds, so the index never gets
//! ahead of the database and no rollback is needed. `list()` returns topics
//! in insertion order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Vocabulary;
use crate::error::{Error, Result};
use crate::models::{Comment, PerspectiveCamera, Topic, TopicDraft, TopicPatch, Vec3, Viewpoint};

pub struct TopicStore {
    pool: SqlitePool,
    vocabulary: Vocabulary,
    topics: HashMap<String, Topic>,
    order: Vec<String>,
    viewpoints: HashMap<String, Viewpoint>,
}

impl TopicStore {
    /// Open the store over a connected pool, loading all persisted topics
    /// and viewpoints into the in-memory index.
    pub async fn open(pool: SqlitePool, vocabulary: Vocabulary) -> Result<Self> {
        let mut store = Self {
            pool,
            vocabulary,
            topics: HashMap::new(),
            order: Vec::new(),
            viewpoints: HashMap::new(),
        };
        store.load().await?;
        Ok(store)
    }

    async fn load(&mut self) -> Result<()> {
        let topic_rows = sqlx::query(
            "SELECT guid, title, description, topic_type, status, label, assigned_to, \
             creation_author, creation_date, due_date, current_viewpoint \
             FROM topics ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &topic_rows {
            let guid: String = row.get("guid");
            let topic = Topic {
                guid: guid.clone(),
                title: row.get("title"),
                description: row.get("description"),
                topic_type: row.get("topic_type"),
                status: row.get("status"),
                label: row.get("label"),
                assigned_to: row.get("assigned_to"),
                creation_author: row.get("creation_author"),
                creation_date: ts_to_datetime(row.get("creation_date")),
                due_date: row
                    .get::<Option<i64>, _>("due_date")
                    .map(ts_to_datetime),
                current_viewpoint: row.get("current_viewpoint"),
                viewpoints: Vec::new(),
                comments: Vec::new(),
            };
            self.order.push(guid.clone());
            self.topics.insert(guid, topic);
        }

        let link_rows = sqlx::query(
            "SELECT topic_guid, viewpoint_guid FROM topic_viewpoints ORDER BY topic_guid, position",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &link_rows {
            let topic_guid: String = row.get("topic_guid");
            if let Some(topic) = self.topics.get_mut(&topic_guid) {
                topic.viewpoints.push(row.get("viewpoint_guid"));
            }
        }

        let comment_rows = sqlx::query(
            "SELECT guid, topic_guid, author, created_at, body FROM comments ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &comment_rows {
            let topic_guid: String = row.get("topic_guid");
            if let Some(topic) = self.topics.get_mut(&topic_guid) {
                topic.comments.push(Comment {
                    guid: row.get("guid"),
                    author: row.get("author"),
                    date: ts_to_datetime(row.get("created_at")),
                    text: row.get("body"),
                });
            }
        }

        let viewpoint_rows = sqlx::query(
            "SELECT guid, title, vp_x, vp_y, vp_z, dir_x, dir_y, dir_z, up_x, up_y, up_z, \
             aspect_ratio, field_of_view, snapshot_ref FROM viewpoints",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &viewpoint_rows {
            let guid: String = row.get("guid");
            self.viewpoints.insert(
                guid.clone(),
                Viewpoint {
                    guid,
                    title: row.get("title"),
                    camera: PerspectiveCamera {
                        view_point: Vec3 {
                            x: row.get("vp_x"),
                            y: row.get("vp_y"),
                            z: row.get("vp_z"),
                        },
                        direction: Vec3 {
                            x: row.get("dir_x"),
                            y: row.get("dir_y"),
                            z: row.get("dir_z"),
                        },
                        up_vector: Vec3 {
                            x: row.get("up_x"),
                            y: row.get("up_y"),
                            z: row.get("up_z"),
                        },
                        aspect_ratio: row.get("aspect_ratio"),
                        field_of_view: row.get("field_of_view"),
                    },
                    snapshot_ref: row.get("snapshot_ref"),
                },
            );
        }

        Ok(())
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// All topics, in insertion order.
    pub fn list(&self) -> Vec<&Topic> {
        self.order
            .iter()
            .filter_map(|guid| self.topics.get(guid))
            .collect()
    }

    pub fn get(&self, guid: &str) -> Option<&Topic> {
        self.topics.get(guid)
    }

    pub fn viewpoint(&self, guid: &str) -> Option<&Viewpoint> {
        self.viewpoints.get(guid)
    }

    /// Create a topic from draft fields.
    ///
    /// Title, type, status, and due date are required; the GUID is assigned
    /// when absent and `creation_date` is stamped here. The row is persisted
    /// before the index is touched.
    pub async fn create_topic(&mut self, draft: TopicDraft, author: &str) -> Result<Topic> {
        let mut missing = Vec::new();
        if draft.title.trim().is_empty() {
            missing.push("title");
        }
        if draft.topic_type.trim().is_empty() {
            missing.push("type");
        }
        if draft.status.trim().is_empty() {
            missing.push("status");
        }
        if draft.due_date.is_none() {
            missing.push("due date");
        }
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }

        let guid = draft
            .guid
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let topic = Topic {
            guid: guid.clone(),
            title: draft.title,
            description: draft.description,
            topic_type: draft.topic_type,
            status: draft.status,
            label: draft.label,
            assigned_to: draft.assigned_to,
            creation_author: author.to_string(),
            creation_date: Utc::now(),
            due_date: draft.due_date,
            viewpoints: Vec::new(),
            current_viewpoint: None,
            comments: Vec::new(),
        };

        self.persist_topic_row(&topic).await?;

        self.order.push(guid.clone());
        self.topics.insert(guid, topic.clone());
        Ok(topic)
    }

    /// Insert a fully formed topic, preserving its creation date, comments,
    /// and viewpoint links. This is the import path; `create_topic` is the
    /// form path.
    pub async fn insert_topic(&mut self, topic: Topic) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO topics (guid, title, description, topic_type, status, label,
                                assigned_to, creation_author, creation_date, due_date,
                                current_viewpoint)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&topic.guid)
        .bind(&topic.title)
        .bind(&topic.description)
        .bind(&topic.topic_type)
        .bind(&topic.status)
        .bind(&topic.label)
        .bind(&topic.assigned_to)
        .bind(&topic.creation_author)
        .bind(topic.creation_date.timestamp())
        .bind(topic.due_date.map(|d| d.timestamp()))
        .bind(&topic.current_viewpoint)
        .execute(&mut *tx)
        .await?;

        for (position, viewpoint_guid) in topic.viewpoints.iter().enumerate() {
            sqlx::query(
                "INSERT INTO topic_viewpoints (topic_guid, viewpoint_guid, position) \
                 VALUES (?, ?, ?)",
            )
            .bind(&topic.guid)
            .bind(viewpoint_guid)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        for comment in &topic.comments {
            sqlx::query(
                "INSERT INTO comments (guid, topic_guid, author, created_at, body) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&comment.guid)
            .bind(&topic.guid)
            .bind(&comment.author)
            .bind(comment.date.timestamp())
            .bind(&comment.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.order.push(topic.guid.clone());
        self.topics.insert(topic.guid.clone(), topic);
        Ok(())
    }

    /// Merge partial fields into an existing topic. GUID and creation date
    /// are preserved unconditionally.
    pub async fn update_topic(&mut self, guid: &str, patch: TopicPatch) -> Result<Topic> {
        let mut topic = self
            .topics
            .get(guid)
            .cloned()
            .ok_or_else(|| Error::not_found("topic", guid))?;

        if let Some(title) = patch.title {
            topic.title = title;
        }
        if let Some(description) = patch.description {
            topic.description = Some(description);
        }
        if let Some(topic_type) = patch.topic_type {
            topic.topic_type = topic_type;
        }
        if let Some(status) = patch.status {
            topic.status = status;
        }
        if let Some(label) = patch.label {
            topic.label = Some(label);
        }
        if let Some(assigned_to) = patch.assigned_to {
            topic.assigned_to = Some(assigned_to);
        }
        if let Some(due_date) = patch.due_date {
            topic.due_date = Some(due_date);
        }

        sqlx::query(
            "UPDATE topics SET title = ?, description = ?, topic_type = ?, status = ?, \
             label = ?, assigned_to = ?, due_date = ? WHERE guid = ?",
        )
        .bind(&topic.title)
        .bind(&topic.description)
        .bind(&topic.topic_type)
        .bind(&topic.status)
        .bind(&topic.label)
        .bind(&topic.assigned_to)
        .bind(topic.due_date.map(|d| d.timestamp()))
        .bind(guid)
        .execute(&self.pool)
        .await?;

        self.topics.insert(guid.to_string(), topic.clone());
        Ok(topic)
    }

    /// Add a viewpoint reference to a topic and move its current-viewpoint
    /// pointer. A missing topic is logged, not an error.
    pub async fn attach_viewpoint(&mut self, topic_guid: &str, viewpoint_guid: &str) -> Result<()> {
        let Some(topic) = self.topics.get(topic_guid) else {
            tracing::warn!(
                topic = topic_guid,
                viewpoint = viewpoint_guid,
                "attach skipped: topic not in store"
            );
            return Ok(());
        };
        if topic.viewpoints.iter().any(|g| g == viewpoint_guid) {
            return Ok(());
        }
        let position = topic.viewpoints.len() as i64;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO topic_viewpoints (topic_guid, viewpoint_guid, position) VALUES (?, ?, ?)",
        )
        .bind(topic_guid)
        .bind(viewpoint_guid)
        .bind(position)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE topics SET current_viewpoint = ? WHERE guid = ?")
            .bind(viewpoint_guid)
            .bind(topic_guid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if let Some(topic) = self.topics.get_mut(topic_guid) {
            topic.viewpoints.push(viewpoint_guid.to_string());
            topic.current_viewpoint = Some(viewpoint_guid.to_string());
        }
        Ok(())
    }

    /// Persist a viewpoint and its accepted snapshot bytes. Upserts, so a
    /// recapture overwrites the camera and the snapshot blob under the same
    /// reference.
    pub async fn save_viewpoint(
        &mut self,
        viewpoint: &Viewpoint,
        snapshot: Option<&[u8]>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let camera = &viewpoint.camera;
        sqlx::query(
            r#"
            INSERT INTO viewpoints (guid, title, vp_x, vp_y, vp_z, dir_x, dir_y, dir_z,
                                    up_x, up_y, up_z, aspect_ratio, field_of_view, snapshot_ref)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO UPDATE SET
                title = excluded.title,
                vp_x = excluded.vp_x, vp_y = excluded.vp_y, vp_z = excluded.vp_z,
                dir_x = excluded.dir_x, dir_y = excluded.dir_y, dir_z = excluded.dir_z,
                up_x = excluded.up_x, up_y = excluded.up_y, up_z = excluded.up_z,
                aspect_ratio = excluded.aspect_ratio,
                field_of_view = excluded.field_of_view,
                snapshot_ref = excluded.snapshot_ref
            "#,
        )
        .bind(&viewpoint.guid)
        .bind(&viewpoint.title)
        .bind(camera.view_point.x)
        .bind(camera.view_point.y)
        .bind(camera.view_point.z)
        .bind(camera.direction.x)
        .bind(camera.direction.y)
        .bind(camera.direction.z)
        .bind(camera.up_vector.x)
        .bind(camera.up_vector.y)
        .bind(camera.up_vector.z)
        .bind(camera.aspect_ratio)
        .bind(camera.field_of_view)
        .bind(&viewpoint.snapshot_ref)
        .execute(&mut *tx)
        .await?;

        if let (Some(reference), Some(data)) = (&viewpoint.snapshot_ref, snapshot) {
            sqlx::query(
                r#"
                INSERT INTO snapshots (reference, data) VALUES (?, ?)
                ON CONFLICT(reference) DO UPDATE SET data = excluded.data
                "#,
            )
            .bind(reference)
            .bind(data)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.viewpoints
            .insert(viewpoint.guid.clone(), viewpoint.clone());
        Ok(())
    }

    /// Fetch snapshot bytes from the binary store.
    pub async fn snapshot(&self, reference: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT data FROM snapshots WHERE reference = ?")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("data")))
    }

    pub async fn add_comment(&mut self, topic_guid: &str, author: &str, text: &str) -> Result<Comment> {
        if !self.topics.contains_key(topic_guid) {
            return Err(Error::not_found("topic", topic_guid));
        }

        let comment = Comment {
            guid: Uuid::new_v4().to_string(),
            author: author.to_string(),
            date: Utc::now(),
            text: text.to_string(),
        };

        sqlx::query(
            "INSERT INTO comments (guid, topic_guid, author, created_at, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.guid)
        .bind(topic_guid)
        .bind(&comment.author)
        .bind(comment.date.timestamp())
        .bind(&comment.text)
        .execute(&self.pool)
        .await?;

        if let Some(topic) = self.topics.get_mut(topic_guid) {
            topic.comments.push(comment.clone());
        }
        Ok(comment)
    }

    /// Delete a topic, its comments, and its viewpoint links. Viewpoint rows
    /// and snapshot blobs are left in place; only `clear_all` removes them.
    pub async fn delete_topic(&mut self, guid: &str) -> Result<()> {
        if !self.topics.contains_key(guid) {
            return Err(Error::not_found("topic", guid));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM topic_viewpoints WHERE topic_guid = ?")
            .bind(guid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE topic_guid = ?")
            .bind(guid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM topics WHERE guid = ?")
            .bind(guid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.topics.remove(guid);
        self.order.retain(|g| g != guid);
        Ok(())
    }

    /// Empty every collection: topics, links, comments, viewpoints, snapshots.
    pub async fn clear_all(&mut self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "topic_viewpoints",
            "comments",
            "topics",
            "viewpoints",
            "snapshots",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.topics.clear();
        self.order.clear();
        self.viewpoints.clear();
        Ok(())
    }

    async fn persist_topic_row(&self, topic: &Topic) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topics (guid, title, description, topic_type, status, label,
                                assigned_to, creation_author, creation_date, due_date,
                                current_viewpoint)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&topic.guid)
        .bind(&topic.title)
        .bind(&topic.description)
        .bind(&topic.topic_type)
        .bind(&topic.status)
        .bind(&topic.label)
        .bind(&topic.assigned_to)
        .bind(&topic.creation_author)
        .bind(topic.creation_date.timestamp())
        .bind(topic.due_date.map(|d| d.timestamp()))
        .bind(&topic.current_viewpoint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VocabularyConfig;
    use crate::db;
    use crate::models::{EngineCamera, Vec3};
    use crate::viewpoint;

    async fn open_store() -> TopicStore {
        let pool = db::memory_pool().await;
        TopicStore::open(pool, Vocabulary::from_config(&VocabularyConfig::default()))
            .await
            .unwrap()
    }

    fn draft(title: &str, status: &str) -> TopicDraft {
        TopicDraft {
            guid: None,
            title: title.to_string(),
            topic_type: "Clash".to_string(),
            status: status.to_string(),
            due_date: Some(Utc::now()),
            description: None,
            label: None,
            assigned_to: None,
        }
    }

    fn test_camera() -> EngineCamera {
        EngineCamera {
            view_point: Vec3 { x: 1.0, y: 2.0, z: 3.0 },
            direction: Vec3 { x: 0.0, y: 0.0, z: -1.0 },
            up_vector: Vec3 { x: 0.0, y: 1.0, z: 0.0 },
            aspect_ratio: 1.25,
            field_of_view: Some(45.0),
        }
    }

    #[tokio::test]
    async fn create_then_delete_removes_from_list() {
        let mut store = open_store().await;
        let topic = store.create_topic(draft("A", "Active"), "alice").await.unwrap();

        assert!(store.list().iter().any(|t| t.guid == topic.guid));
        store.delete_topic(&topic.guid).await.unwrap();
        assert!(!store.list().iter().any(|t| t.guid == topic.guid));
        assert!(store.get(&topic.guid).is_none());
    }

    #[tokio::test]
    async fn create_rejects_missing_required_fields() {
        let mut store = open_store().await;
        let err = store
            .create_topic(draft("A", ""), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list().is_empty());

        let mut no_due = draft("A", "Active");
        no_due.due_date = None;
        let err = store.create_topic(no_due, "alice").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn update_preserves_guid_and_creation_date() {
        let mut store = open_store().await;
        let topic = store.create_topic(draft("A", "Active"), "alice").await.unwrap();

        let patch = TopicPatch {
            status: Some("Done".to_string()),
            ..TopicPatch::default()
        };
        let updated = store.update_topic(&topic.guid, patch).await.unwrap();

        assert_eq!(updated.guid, topic.guid);
        assert_eq!(updated.creation_date, topic.creation_date);
        assert_eq!(updated.status, "Done");
        assert_eq!(updated.title, "A");
    }

    #[tokio::test]
    async fn update_unknown_guid_is_not_found() {
        let mut store = open_store().await;
        let err = store
            .update_topic("no-such-guid", TopicPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn attach_to_missing_topic_is_silent() {
        let mut store = open_store().await;
        store.attach_viewpoint("ghost", "vp-1").await.unwrap();
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn attach_sets_current_viewpoint_and_keeps_order() {
        let mut store = open_store().await;
        let topic = store.create_topic(draft("A", "Active"), "alice").await.unwrap();

        let first = viewpoint::capture("v1", &test_camera(), None);
        let second = viewpoint::capture("v2", &test_camera(), None);
        store.save_viewpoint(&first.viewpoint, None).await.unwrap();
        store.save_viewpoint(&second.viewpoint, None).await.unwrap();
        store
            .attach_viewpoint(&topic.guid, &first.viewpoint.guid)
            .await
            .unwrap();
        store
            .attach_viewpoint(&topic.guid, &second.viewpoint.guid)
            .await
            .unwrap();

        let topic = store.get(&topic.guid).unwrap();
        assert_eq!(
            topic.viewpoints,
            vec![first.viewpoint.guid.clone(), second.viewpoint.guid.clone()]
        );
        assert_eq!(
            topic.current_viewpoint.as_deref(),
            Some(second.viewpoint.guid.as_str())
        );
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let mut store = open_store().await;
        let a = store.create_topic(draft("first", "Active"), "x").await.unwrap();
        let b = store.create_topic(draft("second", "Active"), "x").await.unwrap();
        let c = store.create_topic(draft("third", "Active"), "x").await.unwrap();

        let guids: Vec<&str> = store.list().iter().map(|t| t.guid.as_str()).collect();
        assert_eq!(guids, vec![&a.guid, &b.guid, &c.guid]);
    }

    #[tokio::test]
    async fn reopen_sees_persisted_state() {
        let pool = db::memory_pool().await;
        let vocab = Vocabulary::from_config(&VocabularyConfig::default());
        let mut store = TopicStore::open(pool.clone(), vocab.clone()).await.unwrap();

        let topic = store.create_topic(draft("persisted", "Active"), "alice").await.unwrap();
        let captured = viewpoint::capture("v", &test_camera(), None);
        store.save_viewpoint(&captured.viewpoint, None).await.unwrap();
        store
            .attach_viewpoint(&topic.guid, &captured.viewpoint.guid)
            .await
            .unwrap();
        store.add_comment(&topic.guid, "bob", "looks off").await.unwrap();

        let reopened = TopicStore::open(pool, vocab).await.unwrap();
        let loaded = reopened.get(&topic.guid).unwrap();
        assert_eq!(loaded.title, "persisted");
        assert_eq!(loaded.viewpoints, vec![captured.viewpoint.guid.clone()]);
        assert_eq!(loaded.comments.len(), 1);
        assert_eq!(loaded.comments[0].text, "looks off");
        assert!(reopened.viewpoint(&captured.viewpoint.guid).is_some());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_binary_store() {
        let mut store = open_store().await;
        let mut bytes = viewpoint::PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let captured = viewpoint::capture("v", &test_camera(), Some(&bytes));
        store
            .save_viewpoint(&captured.viewpoint, captured.snapshot.as_deref())
            .await
            .unwrap();

        let reference = captured.viewpoint.snapshot_ref.as_deref().unwrap();
        let stored = store.snapshot(reference).await.unwrap().unwrap();
        assert_eq!(stored, bytes);
        assert!(store.snapshot("missing-ref").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_all_empties_every_collection() {
        let mut store = open_store().await;
        let topic = store.create_topic(draft("A", "Active"), "alice").await.unwrap();
        let captured = viewpoint::capture("v", &test_camera(), None);
        store.save_viewpoint(&captured.viewpoint, None).await.unwrap();
        store
            .attach_viewpoint(&topic.guid, &captured.viewpoint.guid)
            .await
            .unwrap();

        store.clear_all().await.unwrap();
        assert!(store.list().is_empty());
        assert!(store.viewpoint(&captured.viewpoint.guid).is_none());
    }
}
