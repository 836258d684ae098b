pub mod address;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod directory;
pub mod error;
pub mod headers;
pub mod importer;
pub mod models;
pub mod query;
pub mod rfc822;
mod migrations;

pub use db::{open_archive, open_archive_with, ArchiveDb};
pub use directory::{IndexNotifier, ListDirectory, ListInfo, NoopNotifier, StaticDirectory};
pub use error::CoreError;
pub use importer::{ingest, Ingestor};
pub use rfc822::{RawAttachment, RawMessage};
