//! `multipart/form-data` codec
//!
//! Parsing splits a body into text fields and uploaded files. File parts
//! are spooled to unique temporary files; a file that is too large or
//! cannot be spooled is still reported, carrying an upload error instead
//! of content.

use crate::form::{insert_value, normalize, split_field_name};
use crate::{Error, Result};
use relay_message::{Body, Stream, UploadError, UploadedFile, UploadedFileTree};
use serde_json::{Map, Value};
use std::collections::hash_map::RandomState;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::hash::{BuildHasher, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Default maximum size of a single uploaded file (2 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

const DEFAULT_FILE_MEDIA_TYPE: &str = "application/octet-stream";

/// Multipart parsing configuration
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    max_file_size: u64,
    temp_dir: Option<PathBuf>,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            temp_dir: None,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files larger than this are reported with [`UploadError::IniSize`]
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Directory for spooled uploads (system temp dir by default)
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn get_max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn get_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

static SPOOL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn create_spool_file(dir: &Path) -> std::io::Result<(PathBuf, fs::File)> {
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    for _ in 0..32 {
        let counter = SPOOL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!(
            "relay-upload-{}-{ts_nanos}-{counter}.tmp",
            std::process::id()
        ));

        match OpenOptions::new().create_new(true).write(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "failed to allocate unique spool file",
    ))
}

fn spool(dir: &Path, data: &[u8]) -> std::io::Result<PathBuf> {
    let (path, mut file) = create_spool_file(dir)?;
    if let Err(err) = file.write_all(data) {
        let _ = fs::remove_file(&path);
        return Err(err);
    }
    Ok(path)
}

/// Boundary declared by a `multipart/form-data` content type
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    if !content_type.contains("multipart/form-data") {
        return None;
    }
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("boundary=")? + "boundary=".len();
    let boundary = content_type[start..].trim().trim_matches('"');
    (!boundary.is_empty()).then(|| boundary.to_string())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn strip_line_end(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .unwrap_or(data)
}

fn strip_line_start(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\r\n")
        .or_else(|| data.strip_prefix(b"\n"))
        .unwrap_or(data)
}

/// Split a part into its header block and content at the first blank line
fn split_part(part: &[u8]) -> (&[u8], &[u8]) {
    for sep in [&b"\r\n\r\n"[..], &b"\n\n"[..]] {
        if let Some(pos) = find(part, sep, 0) {
            return (&part[..pos], &part[pos + sep.len()..]);
        }
    }
    (part, &[])
}

/// Part headers keyed by lowercase name
#[derive(Debug, Default)]
struct PartHeaders {
    values: BTreeMap<String, String>,
}

impl PartHeaders {
    fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let values = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        Self { values }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// `key=value` parameters of a header, quotes trimmed
    fn params(&self, name: &str) -> BTreeMap<String, String> {
        self.get(name)
            .into_iter()
            .flat_map(|value| value.split(';'))
            .filter_map(|part| part.split_once('='))
            .map(|(key, value)| {
                (
                    key.trim().to_ascii_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                )
            })
            .collect()
    }
}

/// Fields and files decoded from a multipart body
#[derive(Debug, Clone)]
pub struct MultipartData {
    fields: Value,
    files: UploadedFileTree,
}

impl MultipartData {
    /// Decode `body` delimited by `boundary`
    ///
    /// Parts without a field name are skipped. Content after the last
    /// delimiter is ignored.
    pub fn parse(body: &[u8], boundary: &str, config: &MultipartConfig) -> Result<Self> {
        if boundary.is_empty() {
            return Err(Error::Multipart("empty boundary".to_string()));
        }
        let delimiter = format!("--{boundary}").into_bytes();
        let mut pos = find(body, &delimiter, 0)
            .ok_or_else(|| Error::Multipart("boundary not found in body".to_string()))?;

        let mut fields = Value::Object(Map::new());
        let mut files = UploadedFileTree::default();
        let temp_dir = config.get_temp_dir();

        loop {
            let start = pos + delimiter.len();
            if body[start..].starts_with(b"--") {
                break;
            }
            let Some(end) = find(body, &delimiter, start) else {
                break;
            };
            pos = end;

            let part = strip_line_end(strip_line_start(&body[start..end]));
            if part.is_empty() {
                continue;
            }
            let (header_block, content) = split_part(part);
            let headers = PartHeaders::parse(header_block);
            let disposition = headers.params("content-disposition");

            let Some(name) = disposition.get("name") else {
                continue;
            };
            let path = split_field_name(name);
            if path.is_empty() {
                continue;
            }

            match disposition.get("filename") {
                Some(filename) => {
                    let media_type = headers.get("content-type").unwrap_or(DEFAULT_FILE_MEDIA_TYPE);
                    let file = spool_file(content, filename, media_type, config, &temp_dir)?;
                    files.insert(&path, file);
                }
                None => {
                    let value = String::from_utf8_lossy(content).into_owned();
                    insert_value(&mut fields, &path, Value::String(value));
                }
            }
        }

        normalize(&mut fields);
        files.normalize();
        Ok(Self { fields, files })
    }

    /// Text fields as a nested object
    pub fn fields(&self) -> &Value {
        &self.fields
    }

    pub fn files(&self) -> &UploadedFileTree {
        &self.files
    }

    pub fn into_parts(self) -> (Value, UploadedFileTree) {
        (self.fields, self.files)
    }

    /// Remove spool files of uploads that were never moved
    pub fn discard(&self) {
        for file in self.files.files() {
            if file.is_moved() {
                continue;
            }
            if let Some(path) = file.path() {
                let _ = fs::remove_file(path);
            }
        }
    }
}

fn spool_file(
    content: &[u8],
    filename: &str,
    media_type: &str,
    config: &MultipartConfig,
    temp_dir: &Path,
) -> Result<UploadedFile> {
    let size = content.len() as u64;
    if size > config.get_max_file_size() {
        return failed_upload(size, UploadError::IniSize, filename, media_type);
    }
    match spool(temp_dir, content) {
        Ok(path) => Ok(UploadedFile::from_path(
            path,
            Some(size),
            UploadError::Ok,
            Some(filename),
            Some(media_type),
        )),
        Err(err) => {
            warn!(error = %err, dir = %temp_dir.display(), "failed to spool upload");
            failed_upload(size, UploadError::CantWrite, filename, media_type)
        }
    }
}

fn failed_upload(
    size: u64,
    error: UploadError,
    filename: &str,
    media_type: &str,
) -> Result<UploadedFile> {
    let file = UploadedFile::from_stream(
        Body::new(Stream::read_only(Vec::new())),
        Some(size),
        error,
        Some(filename),
        Some(media_type),
    )?;
    Ok(file)
}

/// Random 40 hex character boundary
fn generate_boundary() -> String {
    let state = RandomState::new();
    let mut out = String::with_capacity(48);
    for round in 0..3u64 {
        let mut hasher = state.build_hasher();
        hasher.write_u64(round);
        hasher.write_u128(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
        );
        out.push_str(&format!("{:016x}", hasher.finish()));
    }
    out.truncate(40);
    out
}

#[derive(Debug)]
enum PartContent {
    Text(String),
    Stream(Body),
    File(PathBuf),
}

#[derive(Debug)]
struct PartSpec {
    name: String,
    filename: Option<String>,
    media_type: Option<String>,
    content: PartContent,
}

/// Builder for `multipart/form-data` request bodies
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<PartSpec>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    /// Body with a randomly generated boundary
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` value announcing the boundary
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parts.push(PartSpec {
            name: name.to_string(),
            filename: None,
            media_type: None,
            content: PartContent::Text(value.into()),
        });
        self
    }

    /// Field whose content is read from `body`
    pub fn stream(mut self, name: &str, body: Body) -> Self {
        self.parts.push(PartSpec {
            name: name.to_string(),
            filename: None,
            media_type: None,
            content: PartContent::Stream(body),
        });
        self
    }

    /// File field; the filename sent is the path's final component
    pub fn file(mut self, name: &str, path: impl Into<PathBuf>, media_type: Option<&str>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parts.push(PartSpec {
            name: name.to_string(),
            filename: Some(filename),
            media_type: Some(media_type.unwrap_or(DEFAULT_FILE_MEDIA_TYPE).to_string()),
            content: PartContent::File(path),
        });
        self
    }

    /// File field with an explicit filename and in-memory content
    pub fn file_stream(
        mut self,
        name: &str,
        filename: &str,
        media_type: Option<&str>,
        body: Body,
    ) -> Self {
        self.parts.push(PartSpec {
            name: name.to_string(),
            filename: Some(filename.to_string()),
            media_type: Some(media_type.unwrap_or(DEFAULT_FILE_MEDIA_TYPE).to_string()),
            content: PartContent::Stream(body),
        });
        self
    }

    /// Render every part into a fresh in-memory body, positioned at the start
    pub fn into_body(self) -> Result<Body> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(media_type) = &part.media_type {
                out.extend_from_slice(format!("Content-Type: {media_type}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");

            match &part.content {
                PartContent::Text(text) => out.extend_from_slice(text.as_bytes()),
                PartContent::Stream(body) => out.extend_from_slice(&body.contents()?),
                PartContent::File(path) => {
                    let mut stream = Stream::open(path, "rb")?;
                    out.extend_from_slice(&stream.contents()?);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Ok(Body::new(Stream::from_bytes(out)))
    }
}
