// In-memory stand-in for the remote service, with per-RPC call counters.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use drive_reports::api::DriveApi;
use drive_reports::models::{FileQuery, FileRecord, NewFile, FOLDER_MIME};
use drive_reports::{DriveError, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Calls {
    pub list: usize,
    pub get: usize,
    pub download: usize,
    pub export: usize,
    pub create: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.list + self.get + self.download + self.export + self.create
    }
}

#[derive(Default)]
struct State {
    records: Vec<FileRecord>,
    blobs: HashMap<String, Vec<u8>>,
    next_id: u32,
    calls: Calls,
    failing: HashSet<&'static str>,
    exports: Vec<(String, String)>,
    queries: Vec<FileQuery>,
    uploaded_from: Vec<PathBuf>,
}

#[derive(Default)]
pub struct FakeDrive {
    state: RefCell<State>,
}

fn record(id: &str, name: &str, mime: &str, parent: Option<&str>, size: Option<u64>) -> FileRecord {
    FileRecord {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        size,
        created_time: None,
        parent_id: parent.map(String::from),
        trashed: false,
    }
}

impl FakeDrive {
    pub fn new() -> Self {
        FakeDrive::default()
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: Option<&str>) {
        self.state
            .borrow_mut()
            .records
            .push(record(id, name, FOLDER_MIME, parent, None));
    }

    pub fn add_file(&self, id: &str, name: &str, mime: &str, parent: Option<&str>, content: &[u8]) {
        let mut state = self.state.borrow_mut();
        state
            .records
            .push(record(id, name, mime, parent, Some(content.len() as u64)));
        state.blobs.insert(id.to_string(), content.to_vec());
    }

    /// An editable document: metadata only, no size, no blob.
    pub fn add_document(&self, id: &str, name: &str, mime: &str, parent: Option<&str>) {
        self.state
            .borrow_mut()
            .records
            .push(record(id, name, mime, parent, None));
    }

    pub fn add_trashed(&self, id: &str, name: &str, parent: Option<&str>) {
        let mut rec = record(id, name, "text/plain", parent, Some(0));
        rec.trashed = true;
        self.state.borrow_mut().records.push(rec);
    }

    /// Make every later call of `op` ("list", "get", "download", "export",
    /// "create") fail with a 500.
    pub fn fail_on(&self, op: &'static str) {
        self.state.borrow_mut().failing.insert(op);
    }

    pub fn calls(&self) -> Calls {
        self.state.borrow().calls.clone()
    }

    pub fn exports(&self) -> Vec<(String, String)> {
        self.state.borrow().exports.clone()
    }

    pub fn queries(&self) -> Vec<FileQuery> {
        self.state.borrow().queries.clone()
    }

    /// Local paths handed to `create_file` as content, in call order.
    pub fn uploaded_from(&self) -> Vec<PathBuf> {
        self.state.borrow().uploaded_from.clone()
    }

    pub fn blob(&self, id: &str) -> Option<Vec<u8>> {
        self.state.borrow().blobs.get(id).cloned()
    }

    pub fn record(&self, id: &str) -> Option<FileRecord> {
        self.state.borrow().records.iter().find(|r| r.id == id).cloned()
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match op {
            "list" => state.calls.list += 1,
            "get" => state.calls.get += 1,
            "download" => state.calls.download += 1,
            "export" => state.calls.export += 1,
            _ => state.calls.create += 1,
        }
        if state.failing.contains(op) {
            return Err(DriveError::Remote {
                status: 500,
                message: format!("{} unavailable", op),
            });
        }
        Ok(())
    }

    fn not_found(file_id: &str) -> DriveError {
        DriveError::Remote {
            status: 404,
            message: format!("File not found: {}.", file_id),
        }
    }
}

impl DriveApi for FakeDrive {
    fn list_files(&self, query: &FileQuery) -> Result<Vec<FileRecord>> {
        self.enter("list")?;
        let mut state = self.state.borrow_mut();
        state.queries.push(query.clone());
        // the real service matches names case-insensitively
        let loose = FileQuery {
            name: None,
            ..query.clone()
        };
        Ok(state
            .records
            .iter()
            .filter(|r| loose.matches(r))
            .filter(|r| {
                query
                    .name
                    .as_ref()
                    .map_or(true, |n| r.name.to_lowercase() == n.to_lowercase())
            })
            .cloned()
            .collect())
    }

    fn get_file(&self, file_id: &str) -> Result<FileRecord> {
        self.enter("get")?;
        self.record(file_id).ok_or_else(|| Self::not_found(file_id))
    }

    fn download_media(&self, file_id: &str, sink: &mut dyn Write) -> Result<u64> {
        self.enter("download")?;
        let blob = self.blob(file_id).ok_or_else(|| Self::not_found(file_id))?;
        sink.write_all(&blob)?;
        Ok(blob.len() as u64)
    }

    fn export_media(&self, file_id: &str, mime_type: &str, sink: &mut dyn Write) -> Result<u64> {
        self.enter("export")?;
        self.record(file_id).ok_or_else(|| Self::not_found(file_id))?;
        self.state
            .borrow_mut()
            .exports
            .push((file_id.to_string(), mime_type.to_string()));
        let body = format!("{} as {}", file_id, mime_type);
        sink.write_all(body.as_bytes())?;
        Ok(body.len() as u64)
    }

    fn create_file(&self, metadata: &NewFile, content: Option<&Path>) -> Result<String> {
        if let Some(path) = content {
            self.state.borrow_mut().uploaded_from.push(path.to_path_buf());
        }
        self.enter("create")?;
        let bytes = match content {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        let mime = metadata
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let parent = metadata.parents.first().map(String::as_str);
        let size = bytes.as_ref().map(|b| b.len() as u64);
        state
            .records
            .push(record(&id, &metadata.name, &mime, parent, size));
        if let Some(bytes) = bytes {
            state.blobs.insert(id.clone(), bytes);
        }
        Ok(id)
    }
}
