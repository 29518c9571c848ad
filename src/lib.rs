// Library root
// -----------
// This crate exposes a small library surface for the CLI. The binary
// (`main.rs`) uses these modules to implement the interactive menu.
//
// Module responsibilities:
// - `auth`: Loads, refreshes and persists credentials; runs the browser
//   consent flow when there is nothing usable on disk.
// - `api`: The `DriveApi` seam and its HTTP implementation.
// - `store`: `DriveStore`, the operations the rest of the program calls
//   (list, find, upload, download, export formats, folders, reports).
// - `models`, `export`, `report`: typed metadata, export tables and the
//   report blob format.
// - `ui`: Terminal flows that delegate to `store`.
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod report;
pub mod store;
pub mod ui;

pub use error::{DriveError, Result};
pub use models::FileRecord;
pub use store::DriveStore;
