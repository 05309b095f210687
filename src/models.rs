//! Core data models used throughout BCF Workbench.
//!
//! These types represent the topics, viewpoints, and camera states that flow
//! through the store, the RDI controller, and the BCF package codec.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A 3D vector component triple.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Camera state as reported by the 3D engine, in its native Y-up frame.
///
/// This is the capture-side input: it only exists at the boundary and is
/// converted to BCF Z-up space exactly once, by [`crate::camera::to_bcf`].
#[derive(Debug, Clone, Deserialize)]
pub struct EngineCamera {
    pub view_point: Vec3,
    pub direction: Vec3,
    pub up_vector: Vec3,
    pub aspect_ratio: f64,
    #[serde(default)]
    pub field_of_view: Option<f64>,
}

/// Perspective camera stored on a viewpoint, always in BCF Z-up space.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub view_point: Vec3,
    pub direction: Vec3,
    pub up_vector: Vec3,
    pub aspect_ratio: f64,
    pub field_of_view: Option<f64>,
}

/// A saved camera state plus optional snapshot, associated with a topic.
///
/// `snapshot_ref` keys the PNG bytes in the snapshot binary store. A
/// viewpoint without a snapshot reference is valid; its image was either
/// never captured or rejected by the PNG signature check.
#[derive(Debug, Clone)]
pub struct Viewpoint {
    pub guid: String,
    pub title: String,
    pub camera: PerspectiveCamera,
    pub snapshot_ref: Option<String>,
}

/// A free-text comment on a topic, ordered by creation.
#[derive(Debug, Clone)]
pub struct Comment {
    pub guid: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub text: String,
}

/// One BCF issue thread ("RDI" in the user-facing vocabulary).
///
/// The GUID is immutable once assigned, as is `creation_date`. Viewpoint
/// ownership is by reference: `viewpoints` holds GUIDs in attach order, and
/// `current_viewpoint` points at the most recently attached one.
#[derive(Debug, Clone)]
pub struct Topic {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub topic_type: String,
    pub status: String,
    pub label: Option<String>,
    pub assigned_to: Option<String>,
    pub creation_author: String,
    pub creation_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub viewpoints: Vec<String>,
    pub current_viewpoint: Option<String>,
    pub comments: Vec<Comment>,
}

/// Fields for creating a new topic through the store.
///
/// `guid` is assigned at creation when absent. Title, type, status, and due
/// date are the required set enforced by [`crate::store::TopicStore::create_topic`].
#[derive(Debug, Clone)]
pub struct TopicDraft {
    pub guid: Option<String>,
    pub title: String,
    pub topic_type: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub label: Option<String>,
    pub assigned_to: Option<String>,
}

/// Partial update applied to an existing topic. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TopicPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub topic_type: Option<String>,
    pub status: Option<String>,
    pub label: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}
