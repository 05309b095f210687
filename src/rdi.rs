//! RDI form and list controller.
//!
//! "RDI" is the user-facing name for a BCF topic. The form walks a small
//! state machine (idle → editing → submitted → idle, or cancel back to
//! idle) and gates submission on the required fields: title, type, status,
//! and due date. The store is never called while the gate fails. List
//! filters are non-destructive and recomputed per call.

use chrono::{DateTime, Utc};

use crate::config::Vocabulary;
use crate::error::{Error, Result};
use crate::models::{EngineCamera, Topic, TopicDraft, TopicPatch};
use crate::store::TopicStore;
use crate::viewpoint::{self, CapturedViewpoint};

#[derive(Debug, Clone, PartialEq)]
pub enum FormState {
    Idle,
    /// Drafting a new record.
    EditingNew,
    /// Editing the record with this GUID.
    EditingExisting(String),
}

/// Form controller mapping RDI fields onto topic store operations.
#[derive(Debug)]
pub struct RdiForm {
    state: FormState,
    vocabulary: Vocabulary,
    pub title: Option<String>,
    pub rdi_type: Option<String>,
    pub status: Option<String>,
    pub label: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    captured: Option<CapturedViewpoint>,
}

impl RdiForm {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            state: FormState::Idle,
            vocabulary,
            title: None,
            rdi_type: None,
            status: None,
            label: None,
            due_date: None,
            description: None,
            assigned_to: None,
            captured: None,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Start drafting a new RDI with empty fields.
    pub fn begin_new(&mut self) {
        self.reset_fields();
        self.state = FormState::EditingNew;
    }

    /// Start editing an existing RDI, pre-filled from the topic.
    pub fn begin_edit(&mut self, topic: &Topic) {
        self.reset_fields();
        self.title = Some(topic.title.clone());
        self.rdi_type = Some(topic.topic_type.clone());
        self.status = Some(topic.status.clone());
        self.label = topic.label.clone();
        self.due_date = topic.due_date;
        self.description = topic.description.clone();
        self.assigned_to = topic.assigned_to.clone();
        self.state = FormState::EditingExisting(topic.guid.clone());
    }

    /// Abandon the form without any store mutation.
    pub fn cancel(&mut self) {
        self.reset_fields();
        self.state = FormState::Idle;
    }

    /// Capture a viewpoint for this form from the engine camera state and
    /// optional PNG bytes. Replaces any previously captured viewpoint.
    pub fn capture_snapshot(&mut self, native: &EngineCamera, image: Option<&[u8]>) {
        let title = self.title.clone().unwrap_or_default();
        self.captured = Some(viewpoint::capture(&title, native, image));
    }

    pub fn has_snapshot(&self) -> bool {
        self.captured.is_some()
    }

    /// Submit the form: validate, write to the store, return to idle.
    ///
    /// A validation failure leaves the form open (state unchanged) and the
    /// store untouched.
    pub async fn submit(&mut self, store: &mut TopicStore, author: &str) -> Result<Topic> {
        let state = self.state.clone();
        let topic = match state {
            FormState::Idle => {
                return Err(Error::Validation("no RDI form is open".to_string()));
            }
            FormState::EditingNew => {
                let draft = self.validated_draft()?;
                self.log_vocabulary_misses();
                let topic = store.create_topic(draft, author).await?;
                self.attach_captured(store, &topic.guid).await?;
                store.get(&topic.guid).cloned().unwrap_or(topic)
            }
            FormState::EditingExisting(guid) => {
                let patch = self.validated_patch()?;
                self.log_vocabulary_misses();
                let topic = store.update_topic(&guid, patch).await?;
                self.attach_captured(store, &guid).await?;
                store.get(&guid).cloned().unwrap_or(topic)
            }
        };

        self.reset_fields();
        self.state = FormState::Idle;
        Ok(topic)
    }

    /// The required-field gate. Returns every missing field in one message.
    fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.title.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("title");
        }
        if self.rdi_type.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("type");
        }
        if self.status.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("status");
        }
        if self.due_date.is_none() {
            missing.push("due date");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "required fields missing: {}",
                missing.join(", ")
            )))
        }
    }

    fn validated_draft(&self) -> Result<TopicDraft> {
        self.validate()?;
        Ok(TopicDraft {
            guid: None,
            title: self.title.clone().unwrap_or_default(),
            topic_type: self.rdi_type.clone().unwrap_or_default(),
            status: self.status.clone().unwrap_or_default(),
            due_date: self.due_date,
            description: self.description.clone(),
            label: self.label.clone(),
            assigned_to: self.assigned_to.clone(),
        })
    }

    fn validated_patch(&self) -> Result<TopicPatch> {
        self.validate()?;
        Ok(TopicPatch {
            title: self.title.clone(),
            description: self.description.clone(),
            topic_type: self.rdi_type.clone(),
            status: self.status.clone(),
            label: self.label.clone(),
            assigned_to: self.assigned_to.clone(),
            due_date: self.due_date,
        })
    }

    async fn attach_captured(&mut self, store: &mut TopicStore, topic_guid: &str) -> Result<()> {
        let Some(captured) = self.captured.take() else {
            return Ok(());
        };
        store
            .save_viewpoint(&captured.viewpoint, captured.snapshot.as_deref())
            .await?;
        store
            .attach_viewpoint(topic_guid, &captured.viewpoint.guid)
            .await
    }

    // Out-of-vocabulary values are tolerated as free text.
    fn log_vocabulary_misses(&self) {
        if let Some(value) = &self.rdi_type {
            if !self.vocabulary.has_type(value) {
                tracing::debug!(value = value.as_str(), "type not in configured vocabulary");
            }
        }
        if let Some(value) = &self.status {
            if !self.vocabulary.has_status(value) {
                tracing::debug!(value = value.as_str(), "status not in configured vocabulary");
            }
        }
        if let Some(value) = &self.label {
            if !self.vocabulary.has_label(value) {
                tracing::debug!(value = value.as_str(), "label not in configured vocabulary");
            }
        }
    }

    fn reset_fields(&mut self) {
        self.title = None;
        self.rdi_type = None;
        self.status = None;
        self.label = None;
        self.due_date = None;
        self.description = None;
        self.assigned_to = None;
        self.captured = None;
    }
}

/// Independent type and status filters for the list view.
#[derive(Debug, Clone, Default)]
pub struct RdiFilter {
    pub rdi_type: Option<String>,
    pub status: Option<String>,
}

/// Apply filters without mutating the underlying list.
pub fn filter_topics<'a>(topics: &[&'a Topic], filter: &RdiFilter) -> Vec<&'a Topic> {
    topics
        .iter()
        .filter(|t| {
            filter
                .rdi_type
                .as_deref()
                .map(|wanted| t.topic_type == wanted)
                .unwrap_or(true)
        })
        .filter(|t| {
            filter
                .status
                .as_deref()
                .map(|wanted| t.status == wanted)
                .unwrap_or(true)
        })
        .copied()
        .collect()
}

/// Status-only update, the list view's quick action.
pub async fn set_status(store: &mut TopicStore, guid: &str, status: &str) -> Result<Topic> {
    let patch = TopicPatch {
        status: Some(status.to_string()),
        ..TopicPatch::default()
    };
    store.update_topic(guid, patch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VocabularyConfig;
    use crate::db;
    use crate::models::Vec3;
    use crate::viewpoint::PNG_SIGNATURE;

    fn vocabulary() -> Vocabulary {
        Vocabulary::from_config(&VocabularyConfig::default())
    }

    async fn open_store() -> TopicStore {
        let pool = db::memory_pool().await;
        TopicStore::open(pool, vocabulary()).await.unwrap()
    }

    fn fill_valid(form: &mut RdiForm) {
        form.title = Some("duct clash".to_string());
        form.rdi_type = Some("Clash".to_string());
        form.status = Some("Active".to_string());
        form.due_date = Some(Utc::now());
    }

    fn test_camera() -> EngineCamera {
        EngineCamera {
            view_point: Vec3 { x: 4.0, y: 1.5, z: -2.0 },
            direction: Vec3 { x: 0.0, y: 0.0, z: 1.0 },
            up_vector: Vec3 { x: 0.0, y: 1.0, z: 0.0 },
            aspect_ratio: 1.6,
            field_of_view: None,
        }
    }

    #[tokio::test]
    async fn empty_status_blocks_submission_and_store_stays_empty() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());
        form.begin_new();
        fill_valid(&mut form);
        form.status = Some("".to_string());

        let err = form.submit(&mut store, "alice").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // Form stays open, nothing was created
        assert_eq!(form.state(), &FormState::EditingNew);
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn submit_without_open_form_is_rejected() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());
        let err = form.submit(&mut store, "alice").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn cancel_returns_to_idle_without_mutation() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());
        form.begin_new();
        fill_valid(&mut form);
        form.cancel();

        assert_eq!(form.state(), &FormState::Idle);
        assert!(store.list().is_empty());
        // Submitting after cancel is a state error, not a create
        assert!(form.submit(&mut store, "alice").await.is_err());
    }

    #[tokio::test]
    async fn new_submission_with_snapshot_creates_and_attaches() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());
        form.begin_new();
        fill_valid(&mut form);

        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&[1, 2, 3]);
        form.capture_snapshot(&test_camera(), Some(&png));

        let topic = form.submit(&mut store, "alice").await.unwrap();
        assert_eq!(form.state(), &FormState::Idle);
        assert_eq!(topic.viewpoints.len(), 1);
        assert_eq!(
            topic.current_viewpoint.as_deref(),
            Some(topic.viewpoints[0].as_str())
        );
        assert_eq!(topic.creation_author, "alice");

        let viewpoint = store.viewpoint(&topic.viewpoints[0]).unwrap();
        // Captured camera was converted to BCF space exactly once
        assert_eq!(viewpoint.camera.view_point, Vec3 { x: 4.0, y: -2.0, z: -1.5 });
    }

    #[tokio::test]
    async fn edit_with_new_snapshot_keeps_old_viewpoint_and_moves_pointer() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());

        form.begin_new();
        fill_valid(&mut form);
        form.capture_snapshot(&test_camera(), None);
        let topic = form.submit(&mut store, "alice").await.unwrap();
        let first_vp = topic.viewpoints[0].clone();

        form.begin_edit(store.get(&topic.guid).unwrap());
        form.status = Some("Review".to_string());
        form.capture_snapshot(&test_camera(), None);
        let updated = form.submit(&mut store, "alice").await.unwrap();

        assert_eq!(updated.status, "Review");
        assert_eq!(updated.viewpoints.len(), 2);
        assert_eq!(updated.viewpoints[0], first_vp);
        assert_eq!(
            updated.current_viewpoint.as_deref(),
            Some(updated.viewpoints[1].as_str())
        );
    }

    #[tokio::test]
    async fn filters_are_independent_and_non_destructive() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());

        for (title, rdi_type, status) in [
            ("a", "Clash", "Active"),
            ("b", "Clash", "Done"),
            ("c", "Request", "Active"),
        ] {
            form.begin_new();
            form.title = Some(title.to_string());
            form.rdi_type = Some(rdi_type.to_string());
            form.status = Some(status.to_string());
            form.due_date = Some(Utc::now());
            form.submit(&mut store, "alice").await.unwrap();
        }

        let all = store.list();
        let clashes = filter_topics(
            &all,
            &RdiFilter {
                rdi_type: Some("Clash".to_string()),
                status: None,
            },
        );
        assert_eq!(clashes.len(), 2);

        let active_clashes = filter_topics(
            &all,
            &RdiFilter {
                rdi_type: Some("Clash".to_string()),
                status: Some("Active".to_string()),
            },
        );
        assert_eq!(active_clashes.len(), 1);
        assert_eq!(active_clashes[0].title, "a");

        // Underlying list is untouched
        assert_eq!(store.list().len(), 3);
    }

    #[tokio::test]
    async fn set_status_changes_only_status() {
        let mut store = open_store().await;
        let mut form = RdiForm::new(vocabulary());
        form.begin_new();
        fill_valid(&mut form);
        let topic = form.submit(&mut store, "alice").await.unwrap();

        let updated = set_status(&mut store, &topic.guid, "Done").await.unwrap();
        assert_eq!(updated.status, "Done");
        assert_eq!(updated.title, topic.title);
        assert_eq!(updated.topic_type, topic.topic_type);
    }
}
