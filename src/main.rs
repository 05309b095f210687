//! # BCF Workbench CLI (`bcf`)
//!
//! The `bcf` binary is the primary interface for BCF Workbench. It provides
//! commands for database initialization, RDI record management, viewpoint
//! snapshots, and BCF 3.0 package exchange.
//!
//! ## Usage
//!
//! ```bash
//! bcf --config ./config/bcf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bcf init` | Create the SQLite database and run schema migrations |
//! | `bcf create` | Create an RDI record, optionally with a camera snapshot |
//! | `bcf list` | List RDI records with type/status filters |
//! | `bcf show <guid>` | Print a full record with viewpoints and comments |
//! | `bcf update <guid>` | Edit fields or change status |
//! | `bcf comment <guid> <text>` | Append a comment |
//! | `bcf snapshot <guid>` | Attach or refresh a viewpoint snapshot |
//! | `bcf delete <guid>` | Delete a record |
//! | `bcf clear` | Delete every record, viewpoint, and snapshot |
//! | `bcf export` | Write selected records as a `.bcf` package |
//! | `bcf import <file.bcf>` | Merge a package, skipping duplicate GUIDs |
//! | `bcf vocabulary` | Print the configured vocabulary sets |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! bcf init --config ./config/bcf.toml
//!
//! # Create an RDI with a captured viewpoint
//! bcf create --title "Duct clash on level 2" --type Clash --status Active \
//!     --due 2026-09-01 --camera camera.json --image shot.png
//!
//! # Change status from the list view
//! bcf update 7c9a... --status Done
//!
//! # Exchange with another BIM tool
//! bcf export --all --output site-issues.bcf
//! bcf import site-issues.bcf
//! ```
//!
//! The `--camera` file holds the engine-native (Y-up) camera state as JSON:
//!
//! ```json
//! {
//!   "view_point": { "x": 10.0, "y": 5.0, "z": -3.0 },
//!   "direction": { "x": 0.0, "y": 0.0, "z": -1.0 },
//!   "up_vector": { "x": 0.0, "y": 1.0, "z": 0.0 },
//!   "aspect_ratio": 1.777,
//!   "field_of_view": 60.0
//! }
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use bcf_workbench::config::{self, Vocabulary};
use bcf_workbench::models::{EngineCamera, Topic};
use bcf_workbench::rdi::{self, RdiFilter, RdiForm};
use bcf_workbench::store::TopicStore;
use bcf_workbench::{db, export, import, migrate, viewpoint};

/// BCF Workbench CLI — a local-first BCF issue workbench for BIM models.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file carrying the database path, the creation author, and the vocabulary
/// sets for type, status, and label values.
#[derive(Parser)]
#[command(
    name = "bcf",
    about = "BCF Workbench — a local-first BCF issue workbench for BIM models",
    version,
    long_about = "BCF Workbench manages RDI issue records (BCF topics) with camera viewpoints \
    and PNG snapshots in a local SQLite database, and exchanges them with other BIM tools \
    as BCF 3.0 ZIP packages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bcf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (topics,
    /// viewpoints, topic_viewpoints, comments, snapshots). Idempotent.
    Init,

    /// Create an RDI record.
    ///
    /// Title, type, status, and due date are required; the record is
    /// rejected before any store call when one is missing. A camera file
    /// plus an optional PNG image capture a viewpoint at creation.
    Create {
        /// Short summary of the issue.
        #[arg(long)]
        title: Option<String>,

        /// Topic type (from the configured vocabulary; free text tolerated).
        #[arg(long = "type")]
        rdi_type: Option<String>,

        /// Topic status (from the configured vocabulary; free text tolerated).
        #[arg(long)]
        status: Option<String>,

        /// Specialty label, e.g. Architecture, Structure, MEP.
        #[arg(long)]
        label: Option<String>,

        /// Due date (YYYY-MM-DD).
        #[arg(long)]
        due: Option<String>,

        /// Longer description of the issue.
        #[arg(long)]
        description: Option<String>,

        /// Assignee (from the configured user list; free text tolerated).
        #[arg(long)]
        assigned_to: Option<String>,

        /// JSON file with the engine-native camera state.
        #[arg(long)]
        camera: Option<PathBuf>,

        /// PNG snapshot to attach to the captured viewpoint.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// List RDI records.
    ///
    /// Filters on type and status are independent and never mutate the
    /// underlying list.
    List {
        /// Only show records of this type.
        #[arg(long = "type")]
        rdi_type: Option<String>,

        /// Only show records with this status.
        #[arg(long)]
        status: Option<String>,
    },

    /// Print a full RDI record with its viewpoints and comments.
    Show {
        /// Topic GUID.
        guid: String,
    },

    /// Edit an RDI record.
    ///
    /// Only the given flags change; GUID and creation date never do. With
    /// `--status` alone this is the quick status change of the list view.
    Update {
        /// Topic GUID.
        guid: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long = "type")]
        rdi_type: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        label: Option<String>,

        /// Due date (YYYY-MM-DD).
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        assigned_to: Option<String>,

        /// JSON file with the engine-native camera state; captures and
        /// attaches a new viewpoint alongside the existing ones.
        #[arg(long)]
        camera: Option<PathBuf>,

        /// PNG snapshot for the captured viewpoint.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Append a comment to an RDI record.
    Comment {
        /// Topic GUID.
        guid: String,

        /// Comment text.
        text: String,
    },

    /// Attach or refresh a viewpoint snapshot.
    ///
    /// By default a new viewpoint is captured and attached, becoming the
    /// record's current viewpoint. With `--refresh` the current viewpoint
    /// is updated in place instead, keeping its GUID.
    Snapshot {
        /// Topic GUID.
        guid: String,

        /// JSON file with the engine-native camera state.
        #[arg(long)]
        camera: PathBuf,

        /// PNG snapshot bytes.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Title for the new viewpoint (defaults to the topic title).
        #[arg(long)]
        title: Option<String>,

        /// Update the current viewpoint in place instead of attaching a new one.
        #[arg(long)]
        refresh: bool,
    },

    /// Delete an RDI record.
    ///
    /// Removes the topic, its comments, and its viewpoint links. Viewpoint
    /// rows and snapshot blobs are left behind; `clear` removes everything.
    Delete {
        /// Topic GUID.
        guid: String,
    },

    /// Delete every record, viewpoint, and snapshot.
    Clear {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },

    /// Write RDI records as a BCF 3.0 package.
    ///
    /// Each exported topic needs at least one viewpoint. The package gets
    /// one GUID-named folder per topic plus a top-level bcf.version file.
    Export {
        /// Topic GUIDs to export.
        guids: Vec<String>,

        /// Export every record in the store.
        #[arg(long)]
        all: bool,

        /// Output file (defaults to a name derived from the first topic's title).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Merge a BCF package into the store.
    ///
    /// Only `.bcf` files are accepted. Topics whose GUID already exists are
    /// skipped — the existing record wins. A malformed package is rejected
    /// without touching the store.
    Import {
        /// Path to the `.bcf` package.
        path: PathBuf,
    },

    /// Print the configured vocabulary sets.
    Vocabulary,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let vocabulary = Vocabulary::from_config(&cfg.vocabulary);
    let author = cfg.author.name.clone();

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Create {
            title,
            rdi_type,
            status,
            label,
            due,
            description,
            assigned_to,
            camera,
            image,
        } => {
            let mut store = open_store(&cfg, vocabulary.clone()).await?;
            let mut form = RdiForm::new(vocabulary);
            form.begin_new();
            form.title = title;
            form.rdi_type = rdi_type;
            form.status = status;
            form.label = label;
            form.due_date = due.as_deref().map(parse_due).transpose()?;
            form.description = description;
            form.assigned_to = assigned_to;
            capture_into_form(&mut form, camera.as_deref(), image.as_deref())?;

            let topic = form.submit(&mut store, &author).await?;
            println!("created {}", topic.guid);
            print_topic_summary(&topic);
        }
        Commands::List { rdi_type, status } => {
            let store = open_store(&cfg, vocabulary).await?;
            let all = store.list();
            let filter = RdiFilter { rdi_type, status };
            let topics = rdi::filter_topics(&all, &filter);

            if topics.is_empty() {
                println!("No records.");
                return Ok(());
            }
            println!("{:<36} {:<12} {:<14} TITLE", "GUID", "STATUS", "TYPE");
            for topic in topics {
                println!(
                    "{:<36} {:<12} {:<14} {}",
                    topic.guid, topic.status, topic.topic_type, topic.title
                );
            }
        }
        Commands::Show { guid } => {
            let store = open_store(&cfg, vocabulary).await?;
            let topic = match store.get(&guid) {
                Some(t) => t,
                None => {
                    eprintln!("Error: record not found: {}", guid);
                    std::process::exit(1);
                }
            };
            print_topic(topic, &store);
        }
        Commands::Update {
            guid,
            title,
            rdi_type,
            status,
            label,
            due,
            description,
            assigned_to,
            camera,
            image,
        } => {
            let mut store = open_store(&cfg, vocabulary.clone()).await?;

            let status_only = status.is_some()
                && title.is_none()
                && rdi_type.is_none()
                && label.is_none()
                && due.is_none()
                && description.is_none()
                && assigned_to.is_none()
                && camera.is_none();

            if status_only {
                let status = status.unwrap_or_default();
                let topic = rdi::set_status(&mut store, &guid, &status).await?;
                println!("updated {}", topic.guid);
                print_topic_summary(&topic);
                return Ok(());
            }

            let Some(existing) = store.get(&guid).cloned() else {
                bail!("record not found: {}", guid);
            };
            let mut form = RdiForm::new(vocabulary);
            form.begin_edit(&existing);
            if title.is_some() {
                form.title = title;
            }
            if rdi_type.is_some() {
                form.rdi_type = rdi_type;
            }
            if status.is_some() {
                form.status = status;
            }
            if label.is_some() {
                form.label = label;
            }
            if let Some(due) = due.as_deref() {
                form.due_date = Some(parse_due(due)?);
            }
            if description.is_some() {
                form.description = description;
            }
            if assigned_to.is_some() {
                form.assigned_to = assigned_to;
            }
            capture_into_form(&mut form, camera.as_deref(), image.as_deref())?;

            let topic = form.submit(&mut store, &author).await?;
            println!("updated {}", topic.guid);
            print_topic_summary(&topic);
        }
        Commands::Comment { guid, text } => {
            let mut store = open_store(&cfg, vocabulary).await?;
            let comment = store.add_comment(&guid, &author, &text).await?;
            println!("commented on {} ({})", guid, comment.guid);
        }
        Commands::Snapshot {
            guid,
            camera,
            image,
            title,
            refresh,
        } => {
            let mut store = open_store(&cfg, vocabulary).await?;
            let Some(topic) = store.get(&guid).cloned() else {
                bail!("record not found: {}", guid);
            };
            let native = load_camera(&camera)?;
            let image_bytes = image.as_deref().map(std::fs::read).transpose()?;

            if refresh {
                let Some(current) = topic.current_viewpoint.as_deref() else {
                    bail!("record {} has no current viewpoint to refresh", guid);
                };
                let Some(mut current_viewpoint) = store.viewpoint(current).cloned() else {
                    bail!("viewpoint not found: {}", current);
                };
                let snapshot =
                    viewpoint::recapture(&mut current_viewpoint, &native, image_bytes.as_deref());
                store
                    .save_viewpoint(&current_viewpoint, snapshot.as_deref())
                    .await?;
                println!("refreshed viewpoint {}", current_viewpoint.guid);
            } else {
                let vp_title = title.unwrap_or_else(|| topic.title.clone());
                let captured = viewpoint::capture(&vp_title, &native, image_bytes.as_deref());
                store
                    .save_viewpoint(&captured.viewpoint, captured.snapshot.as_deref())
                    .await?;
                store.attach_viewpoint(&guid, &captured.viewpoint.guid).await?;
                println!("attached viewpoint {}", captured.viewpoint.guid);
            }
        }
        Commands::Delete { guid } => {
            let mut store = open_store(&cfg, vocabulary).await?;
            store.delete_topic(&guid).await?;
            println!("deleted {}", guid);
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to wipe the store without --yes");
            }
            let mut store = open_store(&cfg, vocabulary).await?;
            store.clear_all().await?;
            println!("cleared");
        }
        Commands::Export { guids, all, output } => {
            let store = open_store(&cfg, vocabulary).await?;
            let guids: Vec<String> = if all {
                store.list().iter().map(|t| t.guid.clone()).collect()
            } else {
                guids
            };
            if guids.is_empty() {
                bail!("nothing to export: pass topic GUIDs or --all");
            }

            let bytes = export::export_topics(&store, &guids).await?;
            let path = match output {
                Some(path) => path,
                None => {
                    let first = store
                        .get(&guids[0])
                        .map(|t| t.title.clone())
                        .unwrap_or_default();
                    PathBuf::from(export::sanitize_filename(&first))
                }
            };
            std::fs::write(&path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("exported {} topics to {}", guids.len(), path.display());
        }
        Commands::Import { path } => {
            if path.extension().and_then(|e| e.to_str()) != Some("bcf") {
                bail!("only .bcf packages are accepted: {}", path.display());
            }
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let mut store = open_store(&cfg, vocabulary).await?;
            let summary = import::import_package(&mut store, &bytes).await?;
            println!("import {}", path.display());
            println!("  imported: {}", summary.imported);
            println!("  skipped (duplicate): {}", summary.skipped);
            println!("ok");
        }
        Commands::Vocabulary => {
            print_set("types", &cfg.vocabulary.types);
            print_set("statuses", &cfg.vocabulary.statuses);
            print_set("labels", &cfg.vocabulary.labels);
            print_set("users", &cfg.vocabulary.users);
        }
    }

    Ok(())
}

async fn open_store(cfg: &config::Config, vocabulary: Vocabulary) -> Result<TopicStore> {
    let pool = db::connect(cfg).await?;
    let store = TopicStore::open(pool, vocabulary).await?;
    Ok(store)
}

/// Parse a YYYY-MM-DD due date into midnight UTC.
fn parse_due(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid due date '{}', expected YYYY-MM-DD", raw))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

fn capture_into_form(
    form: &mut RdiForm,
    camera: Option<&Path>,
    image: Option<&Path>,
) -> Result<()> {
    match (camera, image) {
        (Some(camera), image) => {
            let native = load_camera(camera)?;
            let image_bytes = image.map(std::fs::read).transpose()?;
            form.capture_snapshot(&native, image_bytes.as_deref());
            Ok(())
        }
        (None, Some(_)) => bail!("--image requires --camera"),
        (None, None) => Ok(()),
    }
}

fn load_camera(path: &Path) -> Result<EngineCamera> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read camera file: {}", path.display()))?;
    let camera: EngineCamera = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse camera file: {}", path.display()))?;
    Ok(camera)
}

fn print_topic_summary(topic: &Topic) {
    println!("  title:  {}", topic.title);
    println!("  type:   {}", topic.topic_type);
    println!("  status: {}", topic.status);
}

fn print_topic(topic: &Topic, store: &TopicStore) {
    println!("--- RDI ---");
    println!("guid:        {}", topic.guid);
    println!("title:       {}", topic.title);
    println!("type:        {}", topic.topic_type);
    println!("status:      {}", topic.status);
    if let Some(label) = &topic.label {
        println!("label:       {}", label);
    }
    if let Some(assigned) = &topic.assigned_to {
        println!("assigned_to: {}", assigned);
    }
    println!("author:      {}", topic.creation_author);
    println!("created:     {}", topic.creation_date.format("%Y-%m-%dT%H:%M:%SZ"));
    if let Some(due) = topic.due_date {
        println!("due:         {}", due.format("%Y-%m-%d"));
    }
    if let Some(description) = &topic.description {
        println!();
        println!("{}", description);
    }

    println!();
    println!("--- Viewpoints ({}) ---", topic.viewpoints.len());
    for guid in &topic.viewpoints {
        let marker = if topic.current_viewpoint.as_deref() == Some(guid.as_str()) {
            "*"
        } else {
            " "
        };
        match store.viewpoint(guid) {
            Some(vp) => {
                let camera = &vp.camera;
                println!(
                    "{} {} position ({}, {}, {}) snapshot: {}",
                    marker,
                    vp.guid,
                    camera.view_point.x,
                    camera.view_point.y,
                    camera.view_point.z,
                    if vp.snapshot_ref.is_some() { "yes" } else { "no" }
                );
            }
            None => println!("{} {} (unresolved)", marker, guid),
        }
    }

    println!();
    println!("--- Comments ({}) ---", topic.comments.len());
    for comment in &topic.comments {
        println!(
            "[{}] {}: {}",
            comment.date.format("%Y-%m-%dT%H:%M:%SZ"),
            comment.author,
            comment.text
        );
    }
}

fn print_set(name: &str, values: &[String]) {
    println!("{}: {}", name, values.join(", "));
}
