// Typed records for the subset of Drive metadata this crate consumes, plus
// the typed listing query the store hands to `DriveApi::list_files`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type the service uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// A file or folder as seen by the store. Absent metadata is `None`
/// instead of a missing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub created_time: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub trashed: bool,
}

impl FileRecord {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Size formatted for the terminal, `N/A` when the service reports none
    /// (folders and editable documents).
    pub fn display_size(&self) -> String {
        match self.size {
            Some(bytes) if bytes < 1024 => format!("{} B", bytes),
            Some(bytes) if bytes < 1_048_576 => format!("{:.1} KB", bytes as f64 / 1024.0),
            Some(bytes) if bytes < 1_073_741_824 => {
                format!("{:.1} MB", bytes as f64 / 1_048_576.0)
            }
            Some(bytes) => format!("{:.2} GB", bytes as f64 / 1_073_741_824.0),
            None => "N/A".to_string(),
        }
    }
}

/// File resource as returned on the wire. `size` is a decimal string there.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub size: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub parents: Option<Vec<String>>,
    pub trashed: Option<bool>,
}

impl RawFile {
    pub fn into_record(self) -> FileRecord {
        FileRecord {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            size: self.size.and_then(|s| s.parse().ok()),
            created_time: self.created_time,
            parent_id: self.parents.and_then(|p| p.into_iter().next()),
            trashed: self.trashed.unwrap_or(false),
        }
    }
}

/// One page of a `files.list` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: Vec<RawFile>,
    pub next_page_token: Option<String>,
}

/// Metadata body for `files.create`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl NewFile {
    pub fn file(name: impl Into<String>, parent_id: Option<&str>) -> Self {
        NewFile {
            name: name.into(),
            mime_type: None,
            parents: parent_id.map(|p| vec![p.to_string()]).unwrap_or_default(),
        }
    }

    pub fn folder(name: impl Into<String>, parent_id: Option<&str>) -> Self {
        NewFile {
            mime_type: Some(FOLDER_MIME.to_string()),
            ..NewFile::file(name, parent_id)
        }
    }
}

/// Filter for listing records. Trashed records are always excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    pub parent_id: Option<String>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
}

impl FileQuery {
    pub fn all() -> Self {
        FileQuery::default()
    }

    pub fn children_of(parent_id: &str) -> Self {
        FileQuery {
            parent_id: Some(parent_id.to_string()),
            ..FileQuery::default()
        }
    }

    pub fn folders_named(name: &str) -> Self {
        FileQuery {
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIME.to_string()),
            ..FileQuery::default()
        }
    }

    /// Render as a Drive `q` expression.
    pub fn to_query_string(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(parent) = &self.parent_id {
            clauses.push(format!("'{}' in parents", escape_literal(parent)));
        }
        if let Some(name) = &self.name {
            clauses.push(format!("name='{}'", escape_literal(name)));
        }
        if let Some(mime) = &self.mime_type {
            clauses.push(format!("mimeType='{}'", escape_literal(mime)));
        }
        clauses.push("trashed=false".to_string());
        clauses.join(" and ")
    }

    /// Whether `record` satisfies this query, with exact comparisons.
    pub fn matches(&self, record: &FileRecord) -> bool {
        !record.trashed
            && self
                .parent_id
                .as_ref()
                .map_or(true, |p| record.parent_id.as_ref() == Some(p))
            && self.name.as_ref().map_or(true, |n| &record.name == n)
            && self
                .mime_type
                .as_ref()
                .map_or(true, |m| &record.mime_type == m)
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
