//! BCF 3.0 package writer.
//!
//! Serializes topics with their viewpoints and snapshot images into the BCF
//! wire format: a ZIP archive holding one GUID-named folder per topic
//! (`markup.bcf`, `viewpoint.bcfv`, `snapshot.png`) plus a top-level
//! `bcf.version` file. Camera vectors are written as stored — they are
//! already in BCF space, and float fields use shortest round-trip
//! formatting so a re-import reproduces them exactly.

use std::collections::HashMap;
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{Error, Result};
use crate::models::{Topic, Vec3, Viewpoint};
use crate::store::TopicStore;

pub const BCF_VERSION: &str = "3.0";

/// One topic's worth of export data: the topic, its resolvable viewpoints
/// (primary first), and snapshot bytes keyed by snapshot reference.
#[derive(Debug)]
pub struct ExportEntry {
    pub topic: Topic,
    pub viewpoints: Vec<Viewpoint>,
    pub snapshots: HashMap<String, Vec<u8>>,
}

/// Resolve the given topics out of the store and package them.
///
/// A topic with zero resolvable viewpoints cannot be exported; unresolvable
/// viewpoint references and missing snapshot blobs are logged and skipped.
pub async fn export_topics(store: &TopicStore, guids: &[String]) -> Result<Vec<u8>> {
    let mut entries = Vec::new();

    for guid in guids {
        let topic = store
            .get(guid)
            .ok_or_else(|| Error::not_found("topic", guid.clone()))?;

        let viewpoints = resolve_viewpoints(store, topic);
        if viewpoints.is_empty() {
            return Err(Error::Validation(format!(
                "topic {} has no viewpoint to export",
                guid
            )));
        }

        let mut snapshots = HashMap::new();
        for viewpoint in &viewpoints {
            let Some(reference) = &viewpoint.snapshot_ref else {
                continue;
            };
            match store.snapshot(reference).await? {
                Some(bytes) => {
                    snapshots.insert(reference.clone(), bytes);
                }
                None => tracing::warn!(
                    topic = guid.as_str(),
                    reference = reference.as_str(),
                    "snapshot blob missing, exporting viewpoint without image"
                ),
            }
        }

        entries.push(ExportEntry {
            topic: topic.clone(),
            viewpoints,
            snapshots,
        });
    }

    write_package(&entries)
}

/// Order a topic's viewpoints for export: the current viewpoint first,
/// then the rest in attach order. References that no longer resolve are
/// logged and dropped.
fn resolve_viewpoints(store: &TopicStore, topic: &Topic) -> Vec<Viewpoint> {
    let mut ordered: Vec<Viewpoint> = Vec::new();

    if let Some(current) = &topic.current_viewpoint {
        if let Some(viewpoint) = store.viewpoint(current) {
            ordered.push(viewpoint.clone());
        }
    }

    for guid in &topic.viewpoints {
        if ordered.iter().any(|v| &v.guid == guid) {
            continue;
        }
        match store.viewpoint(guid) {
            Some(viewpoint) => ordered.push(viewpoint.clone()),
            None => tracing::warn!(
                topic = topic.guid.as_str(),
                viewpoint = guid.as_str(),
                "viewpoint reference does not resolve, skipping"
            ),
        }
    }

    ordered
}

/// Serialize entries into a complete `.bcf` ZIP package.
pub fn write_package(entries: &[ExportEntry]) -> Result<Vec<u8>> {
    let mut archive = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    archive
        .start_file("bcf.version", options)
        .map_err(package_err)?;
    archive.write_all(&version_xml()?).map_err(package_err)?;

    for entry in entries {
        let folder = &entry.topic.guid;
        let file_names = viewpoint_file_names(&entry.viewpoints);

        archive
            .start_file(format!("{}/markup.bcf", folder), options)
            .map_err(package_err)?;
        archive
            .write_all(&markup_xml(entry, &file_names)?)
            .map_err(package_err)?;

        for (viewpoint, names) in entry.viewpoints.iter().zip(&file_names) {
            archive
                .start_file(format!("{}/{}", folder, names.viewpoint), options)
                .map_err(package_err)?;
            archive
                .write_all(&visualization_xml(viewpoint)?)
                .map_err(package_err)?;

            if let Some(bytes) = snapshot_bytes(entry, viewpoint) {
                archive
                    .start_file(format!("{}/{}", folder, names.snapshot), options)
                    .map_err(package_err)?;
                archive.write_all(bytes).map_err(package_err)?;
            }
        }
    }

    let cursor = archive.finish().map_err(package_err)?;
    Ok(cursor.into_inner())
}

/// Download name for a package: the topic title with every non-alphanumeric
/// character replaced, plus the `.bcf` extension.
pub fn sanitize_filename(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}.bcf", stem)
}

struct ViewpointFileNames {
    viewpoint: String,
    snapshot: String,
}

// First viewpoint gets the canonical names; the rest are numbered.
fn viewpoint_file_names(viewpoints: &[Viewpoint]) -> Vec<ViewpointFileNames> {
    viewpoints
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i == 0 {
                ViewpointFileNames {
                    viewpoint: "viewpoint.bcfv".to_string(),
                    snapshot: "snapshot.png".to_string(),
                }
            } else {
                ViewpointFileNames {
                    viewpoint: format!("viewpoint-{}.bcfv", i + 1),
                    snapshot: format!("snapshot-{}.png", i + 1),
                }
            }
        })
        .collect()
}

fn snapshot_bytes<'a>(entry: &'a ExportEntry, viewpoint: &Viewpoint) -> Option<&'a [u8]> {
    let reference = viewpoint.snapshot_ref.as_ref()?;
    entry.snapshots.get(reference).map(|b| b.as_slice())
}

fn markup_xml(entry: &ExportEntry, file_names: &[ViewpointFileNames]) -> Result<Vec<u8>> {
    let topic = &entry.topic;
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(package_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("Markup")))
        .map_err(package_err)?;

    let mut topic_start = BytesStart::new("Topic");
    topic_start.push_attribute(("Guid", topic.guid.as_str()));
    topic_start.push_attribute(("TopicType", topic.topic_type.as_str()));
    topic_start.push_attribute(("TopicStatus", topic.status.as_str()));
    writer
        .write_event(Event::Start(topic_start))
        .map_err(package_err)?;

    text_element(&mut writer, "Title", &topic.title)?;
    text_element(&mut writer, "CreationAuthor", &topic.creation_author)?;
    text_element(&mut writer, "CreationDate", &iso_date(topic.creation_date))?;
    if let Some(due) = topic.due_date {
        text_element(&mut writer, "DueDate", &iso_date(due))?;
    }
    if let Some(assigned) = &topic.assigned_to {
        text_element(&mut writer, "AssignedTo", assigned)?;
    }
    if let Some(description) = &topic.description {
        text_element(&mut writer, "Description", description)?;
    }
    if let Some(label) = &topic.label {
        writer
            .write_event(Event::Start(BytesStart::new("Labels")))
            .map_err(package_err)?;
        text_element(&mut writer, "Label", label)?;
        writer
            .write_event(Event::End(BytesEnd::new("Labels")))
            .map_err(package_err)?;
    }

    for comment in &topic.comments {
        let mut comment_start = BytesStart::new("Comment");
        comment_start.push_attribute(("Guid", comment.guid.as_str()));
        writer
            .write_event(Event::Start(comment_start))
            .map_err(package_err)?;
        text_element(&mut writer, "Date", &iso_date(comment.date))?;
        text_element(&mut writer, "Author", &comment.author)?;
        text_element(&mut writer, "Comment", &comment.text)?;
        writer
            .write_event(Event::End(BytesEnd::new("Comment")))
            .map_err(package_err)?;
    }

    writer
        .write_event(Event::Start(BytesStart::new("Viewpoints")))
        .map_err(package_err)?;
    for (viewpoint, names) in entry.viewpoints.iter().zip(file_names) {
        let mut vp_start = BytesStart::new("ViewPoint");
        vp_start.push_attribute(("Guid", viewpoint.guid.as_str()));
        writer
            .write_event(Event::Start(vp_start))
            .map_err(package_err)?;
        text_element(&mut writer, "Viewpoint", &names.viewpoint)?;
        if snapshot_bytes(entry, viewpoint).is_some() {
            text_element(&mut writer, "Snapshot", &names.snapshot)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("ViewPoint")))
            .map_err(package_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("Viewpoints")))
        .map_err(package_err)?;

    writer
        .write_event(Event::End(BytesEnd::new("Topic")))
        .map_err(package_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("Markup")))
        .map_err(package_err)?;

    Ok(writer.into_inner())
}

fn visualization_xml(viewpoint: &Viewpoint) -> Result<Vec<u8>> {
    let camera = &viewpoint.camera;
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(package_err)?;

    let mut info_start = BytesStart::new("VisualizationInfo");
    info_start.push_attribute(("Guid", viewpoint.guid.as_str()));
    writer
        .write_event(Event::Start(info_start))
        .map_err(package_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("PerspectiveCamera")))
        .map_err(package_err)?;

    vector_element(&mut writer, "CameraViewPoint", camera.view_point)?;
    vector_element(&mut writer, "CameraDirection", camera.direction)?;
    vector_element(&mut writer, "CameraUpVector", camera.up_vector)?;
    text_element(&mut writer, "AspectRatio", &camera.aspect_ratio.to_string())?;
    if let Some(fov) = camera.field_of_view {
        text_element(&mut writer, "FieldOfView", &fov.to_string())?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("PerspectiveCamera")))
        .map_err(package_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("VisualizationInfo")))
        .map_err(package_err)?;

    Ok(writer.into_inner())
}

fn version_xml() -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(package_err)?;

    let mut version_start = BytesStart::new("Version");
    version_start.push_attribute(("VersionId", BCF_VERSION));
    writer
        .write_event(Event::Start(version_start))
        .map_err(package_err)?;
    text_element(&mut writer, "DetailedVersion", BCF_VERSION)?;
    writer
        .write_event(Event::End(BytesEnd::new("Version")))
        .map_err(package_err)?;

    Ok(writer.into_inner())
}

fn vector_element(writer: &mut Writer<Vec<u8>>, name: &str, v: Vec3) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(package_err)?;
    text_element(writer, "X", &v.x.to_string())?;
    text_element(writer, "Y", &v.y.to_string())?;
    text_element(writer, "Z", &v.z.to_string())?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(package_err)?;
    Ok(())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(package_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(package_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(package_err)?;
    Ok(())
}

fn iso_date(date: chrono::DateTime<chrono::Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn package_err(e: impl std::fmt::Display) -> Error {
    Error::Parse(e.to_string())
}
