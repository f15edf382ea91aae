#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Bzip2,
}

impl ContentType {
    pub fn as_mime(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Bzip2 => "application/x-bzip2",
        }
    }

    /// Infers content type from a published artifact's filename, the way
    /// `upload_asset` callers in `repoworker.py::main` pick a
    /// `content_type` per file extension.
    pub fn from_filename(name: &str) -> ContentType {
        if name.ends_with(".bz2") {
            ContentType::Bzip2
        } else {
            ContentType::Json
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
}
