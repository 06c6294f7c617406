//! Uploaded files and the trees they are delivered in

use crate::{Body, Error, Result, Stream};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const COPY_CHUNK: usize = 4096;

/// Bracket levels a field name may carry below its base name
///
/// Deeper names are dropped, the way a CGI host discards them.
pub const MAX_FIELD_NESTING: usize = 64;

/// Upload status code as reported by the server environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum UploadError {
    #[default]
    Ok = 0,
    /// Exceeds the server's maximum upload size
    IniSize = 1,
    /// Exceeds the form's declared maximum size
    FormSize = 2,
    Partial = 3,
    NoFile = 4,
    NoTmpDir = 6,
    CantWrite = 7,
    /// Stopped by a server extension
    Extension = 8,
}

impl UploadError {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(UploadError::Ok),
            1 => Ok(UploadError::IniSize),
            2 => Ok(UploadError::FormSize),
            3 => Ok(UploadError::Partial),
            4 => Ok(UploadError::NoFile),
            6 => Ok(UploadError::NoTmpDir),
            7 => Ok(UploadError::CantWrite),
            8 => Ok(UploadError::Extension),
            _ => Err(Error::InvalidUploadError(code)),
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_ok(&self) -> bool {
        *self == UploadError::Ok
    }
}

#[derive(Debug)]
struct Inner {
    path: Option<PathBuf>,
    stream: Mutex<Option<Body>>,
    size: Option<u64>,
    error: UploadError,
    client_filename: Option<String>,
    client_media_type: Option<String>,
    moved: AtomicBool,
}

/// File received with a request
///
/// Clones refer to the same upload: once any of them is moved, every
/// clone reports [`Error::AlreadyMoved`].
#[derive(Debug, Clone)]
pub struct UploadedFile {
    inner: Arc<Inner>,
}

impl UploadedFile {
    /// Upload spooled to a temporary file; size defaults to the file's size
    pub fn from_path(
        path: impl Into<PathBuf>,
        size: Option<u64>,
        error: UploadError,
        client_filename: Option<&str>,
        client_media_type: Option<&str>,
    ) -> Self {
        let path = path.into();
        let size = size.or_else(|| fs::metadata(&path).ok().map(|m| m.len()));
        Self::build(Some(path), None, size, error, client_filename, client_media_type)
    }

    /// Upload held in an open stream, which must be readable
    pub fn from_stream(
        body: Body,
        size: Option<u64>,
        error: UploadError,
        client_filename: Option<&str>,
        client_media_type: Option<&str>,
    ) -> Result<Self> {
        if !body.lock().is_readable() {
            return Err(Error::Validation("uploaded file stream is not readable".to_string()));
        }
        let size = size.or_else(|| body.size());
        Ok(Self::build(None, Some(body), size, error, client_filename, client_media_type))
    }

    fn build(
        path: Option<PathBuf>,
        stream: Option<Body>,
        size: Option<u64>,
        error: UploadError,
        client_filename: Option<&str>,
        client_media_type: Option<&str>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                stream: Mutex::new(stream),
                size,
                error,
                client_filename: client_filename.map(str::to_string),
                client_media_type: client_media_type.map(str::to_string),
                moved: AtomicBool::new(false),
            }),
        }
    }

    /// Stream over the upload, opened from the temp path on first use
    pub fn stream(&self) -> Result<Body> {
        if self.is_moved() {
            return Err(Error::AlreadyMoved);
        }
        let mut slot = self.inner.stream.lock();
        if let Some(body) = slot.as_ref() {
            return Ok(body.clone());
        }
        let path = self
            .inner
            .path
            .as_ref()
            .ok_or_else(|| Error::Validation("uploaded file has no source".to_string()))?;
        let body = Body::new(Stream::open(path, "r")?);
        *slot = Some(body.clone());
        Ok(body)
    }

    /// Move the upload to `target`; succeeds at most once
    pub fn move_to(&self, target: impl AsRef<Path>) -> Result<()> {
        let target = target.as_ref();
        if target.as_os_str().is_empty() {
            return Err(Error::Validation("upload target path is empty".to_string()));
        }
        // claim first so concurrent clones cannot both move
        if self
            .inner
            .moved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyMoved);
        }

        let result = match &self.inner.path {
            Some(path) => Self::move_path(path, target),
            None => self.write_stream(target),
        };
        if result.is_err() {
            self.inner.moved.store(false, Ordering::SeqCst);
        }
        result
    }

    fn move_path(path: &Path, target: &Path) -> Result<()> {
        if fs::rename(path, target).is_err() {
            // rename fails across filesystems
            fs::copy(path, target)?;
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn write_stream(&self, target: &Path) -> Result<()> {
        let body = self
            .inner
            .stream
            .lock()
            .clone()
            .ok_or_else(|| Error::Validation("uploaded file has no source".to_string()))?;
        let mut out = fs::File::create(target)?;
        let mut stream = body.lock();
        if stream.is_seekable() {
            stream.rewind()?;
        }
        while !stream.eof() {
            let chunk = stream.read(COPY_CHUNK)?;
            if chunk.is_empty() {
                break;
            }
            out.write_all(&chunk)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn is_moved(&self) -> bool {
        self.inner.moved.load(Ordering::SeqCst)
    }

    /// Temporary path of a spooled upload
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.inner.size
    }

    pub fn error(&self) -> UploadError {
        self.inner.error
    }

    pub fn client_filename(&self) -> Option<&str> {
        self.inner.client_filename.as_deref()
    }

    pub fn client_media_type(&self) -> Option<&str> {
        self.inner.client_media_type.as_deref()
    }

    /// Whether two handles refer to the same upload
    pub fn ptr_eq(&self, other: &UploadedFile) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Uploaded files keyed by (possibly bracketed) field name
#[derive(Debug, Clone)]
pub enum UploadedFileTree {
    File(UploadedFile),
    List(Vec<UploadedFileTree>),
    Map(BTreeMap<String, UploadedFileTree>),
}

impl Default for UploadedFileTree {
    fn default() -> Self {
        UploadedFileTree::Map(BTreeMap::new())
    }
}

fn next_index<V>(map: &BTreeMap<String, V>) -> String {
    map.keys()
        .filter_map(|k| k.parse::<usize>().ok())
        .max()
        .map_or(0, |max| max + 1)
        .to_string()
}

impl UploadedFileTree {
    /// A tree may only be attached to a request when its root is a container
    pub fn is_container(&self) -> bool {
        !matches!(self, UploadedFileTree::File(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            UploadedFileTree::File(_) => false,
            UploadedFileTree::List(items) => items.is_empty(),
            UploadedFileTree::Map(map) => map.is_empty(),
        }
    }

    /// Child by map key or list index
    pub fn get(&self, key: &str) -> Option<&UploadedFileTree> {
        match self {
            UploadedFileTree::File(_) => None,
            UploadedFileTree::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            UploadedFileTree::Map(map) => map.get(key),
        }
    }

    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            UploadedFileTree::File(file) => Some(file),
            _ => None,
        }
    }

    /// Every file in the tree, depth first
    pub fn files(&self) -> Vec<&UploadedFile> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a UploadedFile>) {
        match self {
            UploadedFileTree::File(file) => out.push(file),
            UploadedFileTree::List(items) => items.iter().for_each(|t| t.collect_files(out)),
            UploadedFileTree::Map(map) => map.values().for_each(|t| t.collect_files(out)),
        }
    }

    /// Place `file` at a bracket path (`["docs", ""]` for `docs[]`)
    ///
    /// Empty segments append. Call [`UploadedFileTree::normalize`] once all
    /// files are inserted to turn index-keyed maps back into lists. Paths
    /// nested deeper than [`MAX_FIELD_NESTING`] are ignored.
    pub fn insert(&mut self, path: &[String], file: UploadedFile) {
        if path.len() > MAX_FIELD_NESTING + 1 {
            return;
        }
        let mut node = self;
        for head in path {
            node.make_map();
            let current = node;
            node = match current {
                UploadedFileTree::Map(map) => {
                    let key = if head.is_empty() { next_index(map) } else { head.clone() };
                    map.entry(key).or_default()
                }
                _ => return,
            };
        }
        *node = UploadedFileTree::File(file);
    }

    fn make_map(&mut self) {
        let map = match std::mem::take(self) {
            UploadedFileTree::Map(map) => map,
            UploadedFileTree::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, t)| (i.to_string(), t))
                .collect(),
            UploadedFileTree::File(_) => BTreeMap::new(),
        };
        *self = UploadedFileTree::Map(map);
    }

    /// Turn maps keyed exactly `0..n` into lists, recursively
    ///
    /// Levels below [`MAX_FIELD_NESTING`] are left as they are.
    pub fn normalize(&mut self) {
        self.normalize_at(0);
    }

    fn normalize_at(&mut self, depth: usize) {
        if depth > MAX_FIELD_NESTING {
            return;
        }
        match self {
            UploadedFileTree::File(_) => {}
            UploadedFileTree::List(items) => {
                items.iter_mut().for_each(|t| t.normalize_at(depth + 1))
            }
            UploadedFileTree::Map(map) => {
                map.values_mut().for_each(|t| t.normalize_at(depth + 1));
                let sequential = !map.is_empty()
                    && (0..map.len()).all(|i| map.contains_key(&i.to_string()));
                if sequential {
                    let mut items: Vec<_> = std::mem::take(map)
                        .into_iter()
                        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
                        .collect();
                    items.sort_by_key(|(i, _)| *i);
                    *self = UploadedFileTree::List(items.into_iter().map(|(_, v)| v).collect());
                }
            }
        }
    }
}

impl From<UploadedFile> for UploadedFileTree {
    fn from(file: UploadedFile) -> Self {
        UploadedFileTree::File(file)
    }
}
