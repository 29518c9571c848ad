// Editable-document kinds and the export tables used when downloading them.
// Native binaries never go through here.

pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const PNG: &str = "image/png";
pub const JPEG: &str = "image/jpeg";
pub const SVG: &str = "image/svg+xml";
pub const PDF: &str = "application/pdf";
pub const TXT: &str = "text/plain";
pub const CSV: &str = "text/csv";
pub const RTF: &str = "application/rtf";
pub const ODT: &str = "application/vnd.oasis.opendocument.text";
pub const ODS: &str = "application/vnd.oasis.opendocument.spreadsheet";
pub const ODP: &str = "application/vnd.oasis.opendocument.presentation";

/// Documents that only exist on the service and must be converted on download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Document,
    Spreadsheet,
    Presentation,
    Drawing,
}

impl DocumentKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            "application/vnd.google-apps.document" => Some(DocumentKind::Document),
            "application/vnd.google-apps.spreadsheet" => Some(DocumentKind::Spreadsheet),
            "application/vnd.google-apps.presentation" => Some(DocumentKind::Presentation),
            "application/vnd.google-apps.drawing" => Some(DocumentKind::Drawing),
            _ => None,
        }
    }

    pub fn default_export(&self) -> &'static str {
        match self {
            DocumentKind::Document => DOCX,
            DocumentKind::Spreadsheet => XLSX,
            DocumentKind::Presentation => PPTX,
            DocumentKind::Drawing => PNG,
        }
    }

    /// Export targets offered for this kind, as (MIME type, label) pairs.
    pub fn export_formats(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            DocumentKind::Document => &[
                (DOCX, ".docx (Word)"),
                (PDF, ".pdf"),
                (TXT, ".txt"),
                (RTF, ".rtf"),
                (ODT, ".odt"),
            ],
            DocumentKind::Spreadsheet => &[
                (XLSX, ".xlsx (Excel)"),
                (PDF, ".pdf"),
                (CSV, ".csv"),
                (ODS, ".ods"),
            ],
            DocumentKind::Presentation => &[
                (PPTX, ".pptx (PowerPoint)"),
                (PDF, ".pdf"),
                (JPEG, ".jpg"),
                (PNG, ".png"),
                (ODP, ".odp"),
            ],
            DocumentKind::Drawing => &[(PNG, ".png"), (JPEG, ".jpg"), (SVG, ".svg"), (PDF, ".pdf")],
        }
    }
}

/// File extension for an export MIME type, when one is known.
pub fn extension_for(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        DOCX => Some(".docx"),
        XLSX => Some(".xlsx"),
        PPTX => Some(".pptx"),
        PNG => Some(".png"),
        PDF => Some(".pdf"),
        TXT => Some(".txt"),
        CSV => Some(".csv"),
        _ => None,
    }
}

/// Append the extension for `mime_type` unless `name` already ends with it.
pub fn with_extension(name: &str, mime_type: &str) -> String {
    match extension_for(mime_type) {
        Some(ext) if !name.to_lowercase().ends_with(ext) => format!("{}{}", name, ext),
        _ => name.to_string(),
    }
}
