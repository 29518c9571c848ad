// Remote file store client: `DriveStore` owns an authenticated `DriveApi`
// and turns each public operation into one or two remote calls. Failures
// are logged where they happen and returned to the caller. Nothing is
// retried.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::{NamedTempFile, TempDir};
use tracing::{error, info, warn};

use crate::api::DriveApi;
use crate::error::{DriveError, Result};
use crate::export::{self, DocumentKind};
use crate::models::{FileQuery, FileRecord, NewFile};
use crate::report;

/// Local name used for a report while it is being decoded.
const REPORT_SCRATCH_NAME: &str = "report";

/// Outcome of resolving an optional folder id / folder name pair.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Folder {
    Id(String),
    /// Neither id nor name given.
    Unspecified,
    /// A name was given and no folder carries it.
    Missing(String),
}

pub struct DriveStore<A: DriveApi> {
    api: A,
    scratch_root: Option<PathBuf>,
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        error!(operation, error = %e, "Drive operation failed");
        e
    })
}

impl<A: DriveApi> DriveStore<A> {
    /// Wrap an already-authenticated API handle.
    pub fn new(api: A) -> Self {
        DriveStore {
            api,
            scratch_root: None,
        }
    }

    /// Create report scratch directories under `dir` instead of the system
    /// temporary directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    fn scratch(&self, operation: &str) -> Result<TempDir> {
        let dir = match &self.scratch_root {
            Some(root) => tempfile::tempdir_in(root),
            None => tempfile::tempdir(),
        };
        logged(operation, dir.map_err(DriveError::from))
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn resolve_folder(&self, folder_id: Option<&str>, folder_name: Option<&str>) -> Result<Folder> {
        if let Some(id) = folder_id {
            return Ok(Folder::Id(id.to_string()));
        }
        match folder_name {
            Some(name) => Ok(self
                .find_folder_by_name(name)?
                .map(Folder::Id)
                .unwrap_or_else(|| Folder::Missing(name.to_string()))),
            None => Ok(Folder::Unspecified),
        }
    }

    /// Non-trashed records of a folder, given by id or by name. With neither,
    /// every non-trashed record in the drive. A folder name that is unknown,
    /// or whose lookup fails, yields an empty list.
    pub fn list(&self, folder_id: Option<&str>, folder_name: Option<&str>) -> Result<Vec<FileRecord>> {
        let resolved = match self.resolve_folder(folder_id, folder_name) {
            Ok(folder) => folder,
            Err(e) => {
                warn!(folder = ?folder_name, error = %e, "Folder lookup failed");
                return Ok(Vec::new());
            }
        };
        let query = match resolved {
            Folder::Id(id) => FileQuery::children_of(&id),
            Folder::Unspecified => FileQuery::all(),
            Folder::Missing(name) => {
                warn!(folder = %name, "Folder not found");
                return Ok(Vec::new());
            }
        };
        let records = logged("list", self.api.list_files(&query))?;
        info!(count = records.len(), "Files listed");
        Ok(records)
    }

    /// Identifier of the first folder named exactly `name`, in service order.
    pub fn find_folder_by_name(&self, name: &str) -> Result<Option<String>> {
        let folders = logged("find_folder", self.api.list_files(&FileQuery::folders_named(name)))?;
        // the service compares names loosely
        Ok(folders
            .into_iter()
            .find(|f| f.name == name && f.is_folder())
            .map(|f| f.id))
    }

    /// Download a record to `local_name` (default: the remote name).
    ///
    /// Editable documents are exported to `export_mime_type`, or their kind's
    /// default, and get the matching extension unless the name already ends
    /// with it. Other records are downloaded as-is. Bytes land in a temporary
    /// file next to the target that is renamed into place only on success.
    /// Returns the path written.
    pub fn download(
        &self,
        file_id: &str,
        local_name: Option<&Path>,
        export_mime_type: Option<&str>,
    ) -> Result<PathBuf> {
        let record = logged("download", self.api.get_file(file_id))?;
        let base = local_name
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(sanitize_name(&record.name)));

        let target = match DocumentKind::from_mime(&record.mime_type) {
            Some(kind) => {
                let mime = export_mime_type.unwrap_or_else(|| kind.default_export());
                let file_name = base
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| sanitize_name(&record.name));
                let target = base.with_file_name(export::with_extension(&file_name, mime));
                info!(name = %record.name, export = mime, "Exporting document");
                logged(
                    "download",
                    write_atomically(&target, |sink| self.api.export_media(file_id, mime, sink)),
                )?;
                target
            }
            None => {
                info!(name = %record.name, mime = %record.mime_type, "Downloading file");
                logged(
                    "download",
                    write_atomically(&base, |sink| self.api.download_media(file_id, sink)),
                )?;
                base
            }
        };
        info!(path = %target.display(), "Download complete");
        Ok(target)
    }

    /// Upload a local file into a folder given by id or name. With neither,
    /// the file goes to the drive's root. Returns the new record's id.
    pub fn upload(
        &self,
        local_path: &Path,
        folder_id: Option<&str>,
        folder_name: Option<&str>,
    ) -> Result<String> {
        if !local_path.is_file() {
            let err = DriveError::LocalFileNotFound(local_path.to_path_buf());
            error!(error = %err, "Upload aborted");
            return Err(err);
        }
        let parent = match self.resolve_folder(folder_id, folder_name)? {
            Folder::Id(id) => Some(id),
            Folder::Unspecified => None,
            Folder::Missing(name) => {
                let err = DriveError::FolderNotFound(name);
                error!(error = %err, "Upload aborted");
                return Err(err);
            }
        };

        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::InvalidName(local_path.display().to_string()))?;
        let metadata = NewFile::file(name, parent.as_deref());
        info!(name = %metadata.name, parent = ?parent, "Uploading file");

        let id = logged("upload", self.api.create_file(&metadata, Some(local_path)))?;
        info!(id = %id, "Upload complete");
        Ok(id)
    }

    /// Export targets for an editable document, as (MIME type, label) pairs.
    /// Native binaries have none.
    pub fn list_export_formats(&self, file_id: &str) -> Result<&'static [(&'static str, &'static str)]> {
        let record = logged("export_formats", self.api.get_file(file_id))?;
        Ok(DocumentKind::from_mime(&record.mime_type)
            .map(|kind| kind.export_formats())
            .unwrap_or(&[]))
    }

    pub fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        if name.trim().is_empty() {
            return Err(DriveError::InvalidName(name.to_string()));
        }
        let id = logged(
            "create_folder",
            self.api.create_file(&NewFile::folder(name, parent_id), None),
        )?;
        info!(name, id = %id, "Folder created");
        Ok(id)
    }

    /// Serialize `value` as a report named `name` and upload it into
    /// `folder_id` (the drive's root when `None`). The scratch copy is removed
    /// whatever the outcome.
    pub fn save_report<T: Serialize>(&self, value: &T, name: &str, folder_id: Option<&str>) -> Result<String> {
        let file_name = sanitize_name(name);
        if file_name.trim().is_empty() {
            return Err(DriveError::InvalidName(name.to_string()));
        }
        let blob = logged("save_report", report::encode(value))?;

        let scratch = self.scratch("save_report")?;
        let path = scratch.path().join(&file_name);
        logged("save_report", fs::write(&path, blob).map_err(DriveError::from))?;
        self.upload(&path, folder_id, None)
    }

    /// Download and decode a report saved by [`DriveStore::save_report`].
    pub fn load_report<T: DeserializeOwned>(&self, file_id: &str) -> Result<T> {
        let scratch = self.scratch("load_report")?;
        let path = self.download(file_id, Some(&scratch.path().join(REPORT_SCRATCH_NAME)), None)?;
        let bytes = logged("load_report", fs::read(&path).map_err(DriveError::from))?;
        logged("load_report", report::decode(&bytes))
    }

    /// Saved reports of a folder: its non-folder records, in service order.
    pub fn list_reports(&self, folder_id: Option<&str>) -> Result<Vec<FileRecord>> {
        Ok(self
            .list(folder_id, None)?
            .into_iter()
            .filter(|r| !r.is_folder())
            .collect())
    }
}

/// Remote names may contain path separators; keep them inside one component.
fn sanitize_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Run `fill` against a temporary file beside `target`, then move it into
/// place. On error the temporary file is dropped and removed.
fn write_atomically<F>(target: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<u64>,
{
    let dir = target
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
