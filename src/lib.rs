//! # BCF Workbench
//!
//! A local-first BCF issue workbench for BIM models.
//!
//! BCF Workbench manages RDI issue records — BCF topics with camera
//! viewpoints and PNG snapshots — in a local SQLite database, and exchanges
//! them with other BIM tools as BCF 3.0 ZIP packages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │  RDI Form /  │──▶│ Topic Store  │──▶│  SQLite   │
//! │ List Control │   │ + Viewpoints │   │ topics +  │
//! └──────────────┘   └──────┬───────┘   │ snapshots │
//!                           │           └──────────┘
//!              ┌────────────┤
//!              ▼            ▼
//!        ┌──────────┐ ┌──────────┐
//!        │ Exporter │ │ Importer │
//!        │  (.bcf)  │ │  (.bcf)  │
//!        └──────────┘ └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bcf init                                  # create database
//! bcf create --title "Duct clash" --type Clash --status Active \
//!            --due 2026-09-01 --camera cam.json --image shot.png
//! bcf list --status Active                  # filtered listing
//! bcf export --all --output issues.bcf      # BCF 3.0 package
//! bcf import issues.bcf                     # merge, skipping duplicates
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and vocabulary sets |
//! | [`models`] | Core data types |
//! | [`camera`] | Engine Y-up → BCF Z-up conversion |
//! | [`viewpoint`] | Viewpoint capture and PNG validation |
//! | [`store`] | Topic store over SQLite |
//! | [`export`] | BCF package writer |
//! | [`import`] | BCF package reader and merge |
//! | [`rdi`] | RDI form state machine and list filters |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod camera;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod migrate;
pub mod models;
pub mod rdi;
pub mod store;
pub mod viewpoint;
