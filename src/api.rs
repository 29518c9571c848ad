// API client module: the `DriveApi` trait is the seam between the store and
// the remote service, one method per RPC the store consumes. `HttpDriveApi`
// implements it with a blocking reqwest client against Drive v3, attaching
// the session's bearer token to every call.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::auth::Credentials;
use crate::error::{DriveError, Result};
use crate::models::{FileList, FileQuery, FileRecord, NewFile, RawFile};

/// Metadata fields requested for every file resource.
const FILE_FIELDS: &str = "id, name, mimeType, size, createdTime, parents, trashed";

const CHUNK_SIZE: usize = 256 * 1024;

/// Remote procedure calls offered by the file-storage service.
pub trait DriveApi {
    /// Every non-trashed record matching `query`, in service order.
    fn list_files(&self, query: &FileQuery) -> Result<Vec<FileRecord>>;

    fn get_file(&self, file_id: &str) -> Result<FileRecord>;

    /// Stream a native binary's content into `sink`. Returns bytes written.
    fn download_media(&self, file_id: &str, sink: &mut dyn Write) -> Result<u64>;

    /// Convert an editable document to `mime_type` and stream it into `sink`.
    fn export_media(&self, file_id: &str, mime_type: &str, sink: &mut dyn Write) -> Result<u64>;

    /// Create a record, uploading `content` as its body when given.
    /// Returns the new record's identifier.
    fn create_file(&self, metadata: &NewFile, content: Option<&Path>) -> Result<String>;
}

/// Drive v3 over HTTPS, holding the authenticated session.
pub struct HttpDriveApi {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpDriveApi {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(HttpDriveApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    /// `files/{file_id}` plus optional sub-resources, with each segment
    /// percent-encoded.
    fn file_url(&self, file_id: &str, rest: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.files_url())
            .map_err(|e| DriveError::InvalidResponse(format!("bad API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DriveError::InvalidResponse("API base URL cannot hold a path".into()))?
            .push(file_id)
            .extend(rest);
        Ok(url)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let val = format!("Bearer {}", self.credentials.access_token);
        let val = HeaderValue::from_str(&val)
            .map_err(|_| DriveError::Auth("access token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, val);
        Ok(headers)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let res = req.headers(self.auth_headers()?).send()?;
        check_status(res)
    }
}

/// Map a non-success response to `DriveError::Remote`, using the service's
/// error message when the body carries one.
fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let txt = res.text().unwrap_or_else(|_| "".into());
    let message = serde_json::from_str::<ErrorBody>(&txt)
        .map(|b| b.error.message)
        .unwrap_or(txt);
    Err(DriveError::Remote {
        status: status.as_u16(),
        message,
    })
}

fn transfer_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            let style = ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        }
        None => ProgressBar::new_spinner(),
    }
}

impl DriveApi for HttpDriveApi {
    fn list_files(&self, query: &FileQuery) -> Result<Vec<FileRecord>> {
        let q = query.to_query_string();
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(self.files_url())
                .query(&[("q", q.as_str()), ("fields", fields.as_str())]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let page: FileList = self.send(req)?.json()?;
            records.extend(page.files.into_iter().map(RawFile::into_record));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!(query = %q, count = records.len(), "Listed files");
        Ok(records)
    }

    fn get_file(&self, file_id: &str) -> Result<FileRecord> {
        let url = self.file_url(file_id, &[])?;
        let req = self.client.get(url).query(&[("fields", FILE_FIELDS)]);
        let raw: RawFile = self.send(req)?.json()?;
        Ok(raw.into_record())
    }

    fn download_media(&self, file_id: &str, sink: &mut dyn Write) -> Result<u64> {
        let url = self.file_url(file_id, &[])?;
        let mut res = self.send(self.client.get(url).query(&[("alt", "media")]))?;

        let pb = transfer_bar(res.content_length());
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = res.read(&mut buf)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            written += n as u64;
            pb.set_position(written);
        }
        sink.flush()?;
        pb.finish_and_clear();
        debug!(file_id, bytes = written, "Downloaded media");
        Ok(written)
    }

    fn export_media(&self, file_id: &str, mime_type: &str, sink: &mut dyn Write) -> Result<u64> {
        let url = self.file_url(file_id, &["export"])?;
        let mut res = self.send(self.client.get(url).query(&[("mimeType", mime_type)]))?;
        let written = res.copy_to(sink)?;
        sink.flush()?;
        debug!(file_id, mime_type, bytes = written, "Exported document");
        Ok(written)
    }

    fn create_file(&self, metadata: &NewFile, content: Option<&Path>) -> Result<String> {
        let Some(path) = content else {
            let req = self
                .client
                .post(self.files_url())
                .query(&[("fields", "id")])
                .json(metadata);
            let created: CreatedFile = self.send(req)?.json()?;
            return Ok(created.id);
        };

        // Resumable upload: open a session with the metadata, then PUT the bytes.
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();

        let url = format!("{}/upload/drive/v3/files", self.base_url);
        let req = self
            .client
            .post(&url)
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", mime.as_str())
            .header("X-Upload-Content-Length", len)
            .json(metadata);
        let res = self.send(req)?;
        let session_uri = res
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DriveError::InvalidResponse("upload session has no Location header".into()))?
            .to_string();
        debug!(name = %metadata.name, bytes = len, "Upload session opened");

        let req = self
            .client
            .put(&session_uri)
            .header(CONTENT_TYPE, mime.as_str())
            .body(file);
        let created: CreatedFile = self.send(req)?.json()?;
        Ok(created.id)
    }
}
