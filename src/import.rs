//! BCF package reader and store merge.
//!
//! Parses a `.bcf` ZIP archive back into topic and viewpoint entities. The
//! whole archive is parsed before the store is touched, so a malformed
//! package rejects with `Error::Parse` and leaves existing data unchanged.
//! Merging skips topic GUIDs already present — the existing entity wins.

use std::io::Read;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::models::{Comment, PerspectiveCamera, Topic, Vec3, Viewpoint};
use crate::store::TopicStore;
use crate::viewpoint::is_png;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// One topic reconstructed from a package folder.
#[derive(Debug)]
pub struct ImportedTopic {
    pub topic: Topic,
    pub viewpoints: Vec<Viewpoint>,
    pub snapshots: Vec<(String, Vec<u8>)>,
}

/// Outcome of a merge: how many topics landed, how many were duplicates.
#[derive(Debug, Clone, Copy)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Parse a complete BCF package without touching any store.
pub fn read_package(bytes: &[u8]) -> Result<Vec<ImportedTopic>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec()))
        .map_err(|e| Error::Parse(e.to_string()))?;

    let mut markup_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.ends_with("/markup.bcf"))
        .map(|s| s.to_string())
        .collect();
    markup_names.sort();

    if markup_names.is_empty() {
        return Err(Error::Parse("package contains no markup.bcf".to_string()));
    }

    let mut imported = Vec::new();
    for markup_name in markup_names {
        let folder = markup_name
            .strip_suffix("/markup.bcf")
            .unwrap_or_default()
            .to_string();
        let markup_xml = read_entry(&mut archive, &markup_name)?;
        let markup = parse_markup(&markup_xml)?;

        let mut viewpoints = Vec::new();
        let mut snapshots = Vec::new();
        for reference in &markup.viewpoints {
            let Some(file) = &reference.viewpoint_file else {
                continue;
            };
            let bcfv_xml = read_entry(&mut archive, &format!("{}/{}", folder, file))?;
            let (info_guid, camera) = parse_visualization(&bcfv_xml)?;
            let guid = reference
                .guid
                .clone()
                .or(info_guid)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let mut snapshot_ref = None;
            if let Some(snapshot_file) = &reference.snapshot_file {
                let data = read_entry(&mut archive, &format!("{}/{}", folder, snapshot_file))?;
                if is_png(&data) {
                    snapshot_ref = Some(guid.clone());
                    snapshots.push((guid.clone(), data));
                } else {
                    tracing::warn!(
                        topic = folder.as_str(),
                        file = snapshot_file.as_str(),
                        "snapshot in package is not a PNG, importing viewpoint without it"
                    );
                }
            }

            viewpoints.push(Viewpoint {
                guid,
                title: markup.title.clone(),
                camera,
                snapshot_ref,
            });
        }

        let viewpoint_guids: Vec<String> = viewpoints.iter().map(|v| v.guid.clone()).collect();
        let topic = Topic {
            guid: markup.guid,
            title: markup.title,
            description: markup.description,
            topic_type: markup.topic_type,
            status: markup.status,
            label: markup.labels.into_iter().next(),
            assigned_to: markup.assigned_to,
            creation_author: markup.creation_author,
            creation_date: markup.creation_date,
            due_date: markup.due_date,
            current_viewpoint: viewpoint_guids.first().cloned(),
            viewpoints: viewpoint_guids,
            comments: markup.comments,
        };

        imported.push(ImportedTopic {
            topic,
            viewpoints,
            snapshots,
        });
    }

    Ok(imported)
}

/// Merge a parsed package into the store. Topics whose GUID already exists
/// are skipped; viewpoints are only written when unknown.
pub async fn import_package(store: &mut TopicStore, bytes: &[u8]) -> Result<ImportSummary> {
    let parsed = read_package(bytes)?;

    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
    };

    for item in parsed {
        if store.get(&item.topic.guid).is_some() {
            summary.skipped += 1;
            continue;
        }

        for viewpoint in &item.viewpoints {
            if store.viewpoint(&viewpoint.guid).is_some() {
                continue;
            }
            let snapshot = item
                .snapshots
                .iter()
                .find(|(reference, _)| Some(reference.as_str()) == viewpoint.snapshot_ref.as_deref())
                .map(|(_, data)| data.as_slice());
            store.save_viewpoint(viewpoint, snapshot).await?;
        }

        store.insert_topic(item.topic).await?;
        summary.imported += 1;
    }

    Ok(summary)
}

fn read_entry(
    archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| Error::Parse(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| Error::Parse(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= MAX_ENTRY_BYTES {
        return Err(Error::Parse(format!(
            "entry {} exceeds size limit ({} bytes)",
            name, MAX_ENTRY_BYTES
        )));
    }
    Ok(out)
}

#[derive(Debug)]
struct ParsedMarkup {
    guid: String,
    topic_type: String,
    status: String,
    title: String,
    creation_author: String,
    creation_date: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    assigned_to: Option<String>,
    description: Option<String>,
    labels: Vec<String>,
    comments: Vec<Comment>,
    viewpoints: Vec<ViewpointRef>,
}

#[derive(Debug, Default)]
struct ViewpointRef {
    guid: Option<String>,
    viewpoint_file: Option<String>,
    snapshot_file: Option<String>,
}

#[derive(Debug, Default)]
struct PartialComment {
    guid: Option<String>,
    author: Option<String>,
    date: Option<String>,
    text: Option<String>,
}

fn parse_markup(xml: &[u8]) -> Result<ParsedMarkup> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();

    let mut guid = None;
    let mut topic_type = None;
    let mut status = None;
    let mut title = None;
    let mut creation_author = None;
    let mut creation_date = None;
    let mut due_date = None;
    let mut assigned_to = None;
    let mut description = None;
    let mut labels = Vec::new();
    let mut comments = Vec::new();
    let mut viewpoints: Vec<ViewpointRef> = Vec::new();
    let mut comment: Option<PartialComment> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "Topic" => {
                        guid = attr(&e, b"Guid")?;
                        topic_type = attr(&e, b"TopicType")?;
                        status = attr(&e, b"TopicStatus")?;
                    }
                    "Comment" if path.last().map(String::as_str) == Some("Topic") => {
                        comment = Some(PartialComment {
                            guid: attr(&e, b"Guid")?,
                            ..PartialComment::default()
                        });
                    }
                    "ViewPoint" => {
                        viewpoints.push(ViewpointRef {
                            guid: attr(&e, b"Guid")?,
                            ..ViewpointRef::default()
                        });
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| Error::Parse(e.to_string()))?
                    .into_owned();
                let last = path.last().map(String::as_str).unwrap_or_default();
                let parent = path
                    .len()
                    .checked_sub(2)
                    .map(|i| path[i].as_str())
                    .unwrap_or_default();

                match (parent, last) {
                    ("Topic", "Title") => title = Some(value),
                    ("Topic", "CreationAuthor") => creation_author = Some(value),
                    ("Topic", "CreationDate") => creation_date = Some(value),
                    ("Topic", "DueDate") => due_date = Some(value),
                    ("Topic", "AssignedTo") => assigned_to = Some(value),
                    ("Topic", "Description") => description = Some(value),
                    ("Labels", "Label") => labels.push(value),
                    ("Comment", "Author") => {
                        if let Some(c) = comment.as_mut() {
                            c.author = Some(value);
                        }
                    }
                    ("Comment", "Date") => {
                        if let Some(c) = comment.as_mut() {
                            c.date = Some(value);
                        }
                    }
                    ("Comment", "Comment") => {
                        if let Some(c) = comment.as_mut() {
                            c.text = Some(value);
                        }
                    }
                    ("ViewPoint", "Viewpoint") => {
                        if let Some(v) = viewpoints.last_mut() {
                            v.viewpoint_file = Some(value);
                        }
                    }
                    ("ViewPoint", "Snapshot") => {
                        if let Some(v) = viewpoints.last_mut() {
                            v.snapshot_file = Some(value);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                // The comment body element is also named Comment; only the
                // outer element (child of Topic) finalizes the record.
                let parent = path
                    .len()
                    .checked_sub(2)
                    .map(|i| path[i].as_str())
                    .unwrap_or_default();
                if name == "Comment" && parent == "Topic" {
                    if let Some(partial) = comment.take() {
                        comments.push(Comment {
                            guid: partial
                                .guid
                                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                            author: partial.author.unwrap_or_default(),
                            date: partial
                                .date
                                .as_deref()
                                .map(parse_date)
                                .transpose()?
                                .unwrap_or(DateTime::UNIX_EPOCH),
                            text: partial.text.unwrap_or_default(),
                        });
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let guid = guid.ok_or_else(|| Error::Parse("Topic element is missing Guid".to_string()))?;
    let title = title.ok_or_else(|| Error::Parse(format!("topic {} has no Title", guid)))?;
    let creation_date = creation_date
        .ok_or_else(|| Error::Parse(format!("topic {} has no CreationDate", guid)))?;

    Ok(ParsedMarkup {
        guid,
        topic_type: topic_type.unwrap_or_default(),
        status: status.unwrap_or_default(),
        title,
        creation_author: creation_author.unwrap_or_default(),
        creation_date: parse_date(&creation_date)?,
        due_date: due_date.as_deref().map(parse_date).transpose()?,
        assigned_to,
        description,
        labels,
        comments,
        viewpoints,
    })
}

/// Parse a viewpoint.bcfv: `VisualizationInfo` GUID and the perspective
/// camera triple. Vectors are taken as-is — they are already BCF Z-up.
fn parse_visualization(xml: &[u8]) -> Result<(Option<String>, PerspectiveCamera)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();

    let mut guid = None;
    let mut view_point = [None; 3];
    let mut direction = [None; 3];
    let mut up_vector = [None; 3];
    let mut aspect_ratio = None;
    let mut field_of_view = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if name == "VisualizationInfo" {
                    guid = attr(&e, b"Guid")?;
                }
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let raw = t.unescape().map_err(|e| Error::Parse(e.to_string()))?;
                let last = path.last().map(String::as_str).unwrap_or_default();
                let parent = path
                    .len()
                    .checked_sub(2)
                    .map(|i| path[i].as_str())
                    .unwrap_or_default();

                let target = match parent {
                    "CameraViewPoint" => Some(&mut view_point),
                    "CameraDirection" => Some(&mut direction),
                    "CameraUpVector" => Some(&mut up_vector),
                    _ => None,
                };

                if let Some(vector) = target {
                    let axis = match last {
                        "X" => 0,
                        "Y" => 1,
                        "Z" => 2,
                        _ => continue,
                    };
                    vector[axis] = Some(parse_float(&raw)?);
                } else if parent == "PerspectiveCamera" && last == "AspectRatio" {
                    aspect_ratio = Some(parse_float(&raw)?);
                } else if parent == "PerspectiveCamera" && last == "FieldOfView" {
                    field_of_view = Some(parse_float(&raw)?);
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let camera = PerspectiveCamera {
        view_point: require_vector("CameraViewPoint", view_point)?,
        direction: require_vector("CameraDirection", direction)?,
        up_vector: require_vector("CameraUpVector", up_vector)?,
        aspect_ratio: aspect_ratio
            .ok_or_else(|| Error::Parse("PerspectiveCamera has no AspectRatio".to_string()))?,
        field_of_view,
    };

    Ok((guid, camera))
}

fn require_vector(name: &str, components: [Option<f64>; 3]) -> Result<Vec3> {
    match components {
        [Some(x), Some(y), Some(z)] => Ok(Vec3 { x, y, z }),
        _ => Err(Error::Parse(format!("{} is missing a component", name))),
    }
}

fn parse_float(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| Error::Parse(format!("invalid number '{}': {}", raw, e)))
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("invalid date '{}': {}", raw, e)))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|e| Error::Parse(e.to_string()))?;
        if a.key.as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|e| Error::Parse(e.to_string()))?
                .into_owned();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::config::{Vocabulary, VocabularyConfig};
    use crate::db;
    use crate::export::{write_package, ExportEntry};
    use crate::models::Topic;
    use crate::viewpoint::PNG_SIGNATURE;

    fn package_with_one_topic() -> (Vec<u8>, Topic, Viewpoint) {
        let viewpoint = Viewpoint {
            guid: "vp-1".to_string(),
            title: "duct clash".to_string(),
            camera: PerspectiveCamera {
                view_point: Vec3 { x: 1.0, y: 3.0, z: -2.0 },
                direction: Vec3 { x: 0.25, y: -0.5, z: 0.125 },
                up_vector: Vec3 { x: 0.0, y: 0.0, z: 1.0 },
                aspect_ratio: 1.7777777777777777,
                field_of_view: Some(60.0),
            },
            snapshot_ref: Some("vp-1".to_string()),
        };
        let topic = Topic {
            guid: "topic-1".to_string(),
            title: "duct clash".to_string(),
            description: Some("duct crosses beam".to_string()),
            topic_type: "Clash".to_string(),
            status: "Active".to_string(),
            label: Some("MEP".to_string()),
            assigned_to: Some("bob".to_string()),
            creation_author: "alice".to_string(),
            creation_date: parse_date("2026-03-01T10:30:00Z").unwrap(),
            due_date: Some(parse_date("2026-04-01T00:00:00Z").unwrap()),
            viewpoints: vec!["vp-1".to_string()],
            current_viewpoint: Some("vp-1".to_string()),
            comments: vec![Comment {
                guid: "c-1".to_string(),
                author: "carol".to_string(),
                date: parse_date("2026-03-02T08:00:00Z").unwrap(),
                text: "agreed, reroute it".to_string(),
            }],
        };

        let mut snapshot = PNG_SIGNATURE.to_vec();
        snapshot.extend_from_slice(&[9, 9, 9]);
        let mut snapshots = HashMap::new();
        snapshots.insert("vp-1".to_string(), snapshot);

        let bytes = write_package(&[ExportEntry {
            topic: topic.clone(),
            viewpoints: vec![viewpoint.clone()],
            snapshots,
        }])
        .unwrap();
        (bytes, topic, viewpoint)
    }

    #[test]
    fn round_trip_preserves_topic_and_camera() {
        let (bytes, topic, viewpoint) = package_with_one_topic();
        let imported = read_package(&bytes).unwrap();
        assert_eq!(imported.len(), 1);

        let got = &imported[0];
        assert_eq!(got.topic.guid, topic.guid);
        assert_eq!(got.topic.title, topic.title);
        assert_eq!(got.topic.topic_type, topic.topic_type);
        assert_eq!(got.topic.status, topic.status);
        assert_eq!(got.topic.description, topic.description);
        assert_eq!(got.topic.label, topic.label);
        assert_eq!(got.topic.creation_author, topic.creation_author);
        assert_eq!(got.topic.creation_date, topic.creation_date);
        assert_eq!(got.topic.due_date, topic.due_date);
        assert_eq!(got.topic.comments.len(), 1);
        assert_eq!(got.topic.comments[0].text, "agreed, reroute it");

        // Camera fields must come back bit-for-bit
        assert_eq!(got.viewpoints.len(), 1);
        assert_eq!(got.viewpoints[0].guid, viewpoint.guid);
        assert_eq!(got.viewpoints[0].camera, viewpoint.camera);
        assert_eq!(got.snapshots.len(), 1);
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = read_package(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn archive_without_markup_is_a_parse_error() {
        let mut zw = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zw.start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut zw, b"hello").unwrap();
        let bytes = zw.finish().unwrap().into_inner();

        let err = read_package(&bytes).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn markup_without_guid_is_a_parse_error() {
        let mut zw = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zw.start_file("abc/markup.bcf", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(
            &mut zw,
            b"<?xml version=\"1.0\"?><Markup><Topic><Title>x</Title></Topic></Markup>",
        )
        .unwrap();
        let bytes = zw.finish().unwrap().into_inner();

        let err = read_package(&bytes).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn importing_twice_keeps_one_topic_per_guid() {
        let pool = db::memory_pool().await;
        let mut store =
            TopicStore::open(pool, Vocabulary::from_config(&VocabularyConfig::default()))
                .await
                .unwrap();

        let (bytes, _, _) = package_with_one_topic();

        let first = import_package(&mut store, &bytes).await.unwrap();
        assert_eq!(first.imported, 1);
        assert_eq!(first.skipped, 0);

        let second = import_package(&mut store, &bytes).await.unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 1);

        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn imported_topic_is_exportable_again() {
        let pool = db::memory_pool().await;
        let mut store =
            TopicStore::open(pool, Vocabulary::from_config(&VocabularyConfig::default()))
                .await
                .unwrap();

        let (bytes, topic, viewpoint) = package_with_one_topic();
        import_package(&mut store, &bytes).await.unwrap();

        let exported = crate::export::export_topics(&store, &[topic.guid.clone()])
            .await
            .unwrap();
        let reparsed = read_package(&exported).unwrap();
        assert_eq!(reparsed[0].topic.guid, topic.guid);
        assert_eq!(reparsed[0].viewpoints[0].camera, viewpoint.camera);
    }
}
