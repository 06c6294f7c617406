//! Byte streams backing message bodies
//!
//! A [`Stream`] owns one [`Resource`] (an in-memory buffer or a file) and a
//! fixed set of capabilities derived from an fopen-style mode. Messages hold
//! streams through [`Body`], a shared handle: copies of a message made by the
//! `with_*` operations refer to the same stream instance.

use crate::{Error, Result};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raw byte resource behind a stream
#[derive(Debug)]
pub enum Resource {
    /// Growable in-memory buffer
    Memory(Cursor<Vec<u8>>),
    /// Open file and the path it was opened from
    File { file: File, path: PathBuf },
}

impl Resource {
    /// Current length of the underlying bytes
    fn len(&self) -> std::io::Result<u64> {
        match self {
            Resource::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
            Resource::File { file, .. } => Ok(file.metadata()?.len()),
        }
    }

    fn uri(&self) -> String {
        match self {
            Resource::Memory(_) => "memory".to_string(),
            Resource::File { path, .. } => path.display().to_string(),
        }
    }
}

impl Read for Resource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Resource::Memory(cursor) => cursor.read(buf),
            Resource::File { file, .. } => file.read(buf),
        }
    }
}

impl Write for Resource {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Resource::Memory(cursor) => cursor.write(buf),
            Resource::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Resource::Memory(cursor) => cursor.flush(),
            Resource::File { file, .. } => file.flush(),
        }
    }
}

impl Seek for Resource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            Resource::Memory(cursor) => cursor.seek(pos),
            Resource::File { file, .. } => file.seek(pos),
        }
    }
}

/// Stream capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

impl Capabilities {
    /// Readable, writable and seekable
    pub fn all() -> Self {
        Self {
            readable: true,
            writable: true,
            seekable: true,
        }
    }
}

/// fopen-style access mode (`r`, `r+`, `w`, `w+`, `a`, `a+`, `x`, `x+`, `c`, `c+`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    raw: String,
    base: char,
    plus: bool,
}

impl Mode {
    /// Parse a mode string; `b` and `t` flags are accepted and ignored
    pub fn parse(mode: &str) -> Result<Self> {
        let mut chars = mode.chars().filter(|c| !matches!(c, 'b' | 't'));
        let base = match chars.next() {
            Some(c @ ('r' | 'w' | 'a' | 'x' | 'c')) => c,
            _ => return Err(Error::Validation(format!("invalid stream mode '{}'", mode))),
        };
        let plus = match chars.next() {
            None => false,
            Some('+') if chars.next().is_none() => true,
            _ => return Err(Error::Validation(format!("invalid stream mode '{}'", mode))),
        };
        Ok(Self {
            raw: mode.to_string(),
            base,
            plus,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_readable(&self) -> bool {
        self.base == 'r' || self.plus
    }

    pub fn is_writable(&self) -> bool {
        self.base != 'r' || self.plus
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.is_readable());
        match self.base {
            'r' => {
                options.write(self.plus);
            }
            'w' => {
                options.write(true).create(true).truncate(true);
            }
            'a' => {
                options.append(true).create(true);
            }
            'x' => {
                options.write(true).create_new(true);
            }
            _ => {
                options.write(true).create(true);
            }
        }
        options
    }
}

/// Ownership state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Detached,
    Closed,
}

/// Descriptive metadata of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    pub uri: Option<String>,
    pub mode: String,
    pub capabilities: Capabilities,
    pub state: StreamState,
}

/// Readable/writable/seekable byte stream
pub struct Stream {
    resource: Option<Resource>,
    capabilities: Capabilities,
    mode: String,
    size: Option<u64>,
    state: StreamState,
}

impl Stream {
    /// Wrap a resource with explicit capabilities
    pub fn with_capabilities(resource: Resource, capabilities: Capabilities) -> Self {
        Self {
            resource: Some(resource),
            capabilities,
            mode: String::new(),
            size: None,
            state: StreamState::Open,
        }
    }

    /// Wrap a resource, deriving read/write capabilities from `mode`
    pub fn new(resource: Resource, mode: &str) -> Result<Self> {
        let mode = Mode::parse(mode)?;
        let mut stream = Self::with_capabilities(
            resource,
            Capabilities {
                readable: mode.is_readable(),
                writable: mode.is_writable(),
                seekable: true,
            },
        );
        stream.mode = mode.raw;
        Ok(stream)
    }

    /// Empty in-memory stream (`w+`)
    pub fn memory() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// In-memory stream holding `content`, positioned at the start
    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        let mut stream = Self::with_capabilities(
            Resource::Memory(Cursor::new(content.into())),
            Capabilities::all(),
        );
        stream.mode = "w+b".to_string();
        stream
    }

    /// Read-only in-memory stream, e.g. a raw request body
    pub fn read_only(content: impl Into<Vec<u8>>) -> Self {
        let mut stream = Self::with_capabilities(
            Resource::Memory(Cursor::new(content.into())),
            Capabilities {
                readable: true,
                writable: false,
                seekable: true,
            },
        );
        stream.mode = "rb".to_string();
        stream
    }

    /// Open a file stream
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let parsed = Mode::parse(mode)?;
        let path = path.as_ref().to_path_buf();
        let file = parsed.open_options().open(&path)?;
        Self::new(Resource::File { file, path }, mode)
    }

    fn resource(&mut self) -> Result<&mut Resource> {
        self.resource.as_mut().ok_or(Error::Detached)
    }

    pub fn is_readable(&self) -> bool {
        self.capabilities.readable
    }

    pub fn is_writable(&self) -> bool {
        self.capabilities.writable
    }

    pub fn is_seekable(&self) -> bool {
        self.capabilities.seekable
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Path of a file-backed stream
    pub fn path(&self) -> Option<&Path> {
        match &self.resource {
            Some(Resource::File { path, .. }) => Some(path),
            _ => None,
        }
    }

    /// Read up to `len` bytes
    pub fn read(&mut self, len: usize) -> Result<Bytes> {
        if self.resource.is_none() {
            return Err(Error::Detached);
        }
        if !self.is_readable() {
            return Err(Error::NotReadable);
        }
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        self.resource()?.take(len as u64).read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Write bytes, returning the number written
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.resource.is_none() {
            return Err(Error::Detached);
        }
        if !self.is_writable() {
            return Err(Error::NotWritable);
        }
        self.size = None;
        self.resource()?.write_all(data)?;
        Ok(data.len())
    }

    /// Move the stream position
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.resource.is_none() {
            return Err(Error::Detached);
        }
        if !self.is_seekable() {
            return Err(Error::NotSeekable);
        }
        Ok(self.resource()?.seek(pos)?)
    }

    /// Seek to the start
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Current position
    pub fn tell(&mut self) -> Result<u64> {
        if !self.is_seekable() && self.resource.is_some() {
            return Err(Error::NotSeekable);
        }
        Ok(self.resource()?.stream_position()?)
    }

    /// Whether the position is at (or past) the end; detached streams are at end
    pub fn eof(&mut self) -> bool {
        let Some(resource) = self.resource.as_mut() else {
            return true;
        };
        match (resource.stream_position(), resource.len()) {
            (Ok(pos), Ok(len)) => pos >= len,
            _ => true,
        }
    }

    /// Read everything from the current position to the end
    pub fn contents(&mut self) -> Result<Bytes> {
        if self.resource.is_none() {
            return Err(Error::Detached);
        }
        if !self.is_readable() {
            return Err(Error::NotReadable);
        }
        let mut buf = Vec::new();
        self.resource()?.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Size in bytes, computed lazily and cached until the next write
    pub fn size(&mut self) -> Option<u64> {
        if self.size.is_none() {
            self.size = self.resource.as_ref().and_then(|r| r.len().ok());
        }
        self.size
    }

    /// Take the raw resource out; the stream is unusable afterwards
    pub fn detach(&mut self) -> Option<Resource> {
        let resource = self.resource.take()?;
        self.capabilities = Capabilities::default();
        self.size = None;
        self.state = StreamState::Detached;
        Some(resource)
    }

    /// Release the resource; calling it again is a no-op
    pub fn close(&mut self) {
        if let Some(mut resource) = self.detach() {
            let _ = resource.flush();
            self.state = StreamState::Closed;
        }
    }

    /// Whole contents from the start as text; never fails, errors give ""
    pub fn to_string_lossy(&mut self) -> String {
        if self.is_seekable() && self.rewind().is_err() {
            return String::new();
        }
        match self.contents() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        }
    }

    pub fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            uri: self.resource.as_ref().map(Resource::uri),
            mode: self.mode.clone(),
            capabilities: self.capabilities,
            state: self.state,
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("uri", &self.resource.as_ref().map(Resource::uri))
            .field("capabilities", &self.capabilities)
            .field("size", &self.size)
            .field("state", &self.state)
            .finish()
    }
}

/// Shared handle to a message body stream
#[derive(Clone)]
pub struct Body(Arc<Mutex<Stream>>);

impl Body {
    pub fn new(stream: Stream) -> Self {
        Self(Arc::new(Mutex::new(stream)))
    }

    /// Empty writable in-memory body
    pub fn empty() -> Self {
        Self::new(Stream::memory())
    }

    /// Lock the stream for direct access
    pub fn lock(&self) -> MutexGuard<'_, Stream> {
        self.0.lock()
    }

    /// Full contents from the start (rewinding seekable streams first)
    pub fn contents(&self) -> Result<Bytes> {
        let mut stream = self.lock();
        if stream.is_seekable() {
            stream.rewind()?;
        }
        stream.contents()
    }

    /// Append bytes at the current position
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.lock().write(data)
    }

    pub fn size(&self) -> Option<u64> {
        self.lock().size()
    }

    /// Whether two handles refer to the same stream instance
    pub fn ptr_eq(&self, other: &Body) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Stream> for Body {
    fn from(stream: Stream) -> Self {
        Body::new(stream)
    }
}

impl From<&str> for Body {
    fn from(content: &str) -> Self {
        Body::new(Stream::from_bytes(content.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(content: String) -> Self {
        Body::new(Stream::from_bytes(content.into_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(content: Vec<u8>) -> Self {
        Body::new(Stream::from_bytes(content))
    }
}

impl From<Bytes> for Body {
    fn from(content: Bytes) -> Self {
        Body::new(Stream::from_bytes(content.to_vec()))
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lock().to_string_lossy())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(stream) => f.debug_tuple("Body").field(&*stream).finish(),
            None => f.write_str("Body(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("relay-stream-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_memory_read_write_seek() {
        let mut stream = Stream::memory();
        assert_eq!(stream.write(b"hello world").unwrap(), 11);
        assert_eq!(stream.size(), Some(11));
        stream.rewind().unwrap();
        assert_eq!(&stream.read(5).unwrap()[..], b"hello");
        assert_eq!(stream.tell().unwrap(), 5);
        assert!(!stream.eof());
        assert_eq!(&stream.contents().unwrap()[..], b" world");
        assert!(stream.eof());
    }

    #[test]
    fn test_size_cache_invalidated_by_write() {
        let mut stream = Stream::from_bytes("abc");
        assert_eq!(stream.size(), Some(3));
        stream.seek(SeekFrom::End(0)).unwrap();
        stream.write(b"def").unwrap();
        assert_eq!(stream.size(), Some(6));
    }

    #[test]
    fn test_capability_errors() {
        let mut stream = Stream::read_only("data");
        assert!(matches!(stream.write(b"x"), Err(Error::NotWritable)));

        let mut stream = Stream::with_capabilities(
            Resource::Memory(Cursor::new(b"abc".to_vec())),
            Capabilities {
                readable: false,
                writable: true,
                seekable: false,
            },
        );
        assert!(matches!(stream.read(1), Err(Error::NotReadable)));
        assert!(matches!(stream.contents(), Err(Error::NotReadable)));
        assert!(matches!(stream.seek(SeekFrom::Start(0)), Err(Error::NotSeekable)));
        assert!(matches!(stream.rewind(), Err(Error::NotSeekable)));
        assert!(stream.tell().unwrap_err().is_io());
    }

    #[test]
    fn test_detach_makes_stream_inert() {
        let mut stream = Stream::from_bytes("abc");
        let resource = stream.detach();
        assert!(matches!(resource, Some(Resource::Memory(_))));
        assert_eq!(stream.state(), StreamState::Detached);
        assert!(!stream.is_readable());
        assert!(matches!(stream.read(1), Err(Error::Detached)));
        assert!(matches!(stream.contents(), Err(Error::Detached)));
        assert!(matches!(stream.write(b"x"), Err(Error::Detached)));
        assert_eq!(stream.size(), None);
        assert!(stream.eof());
        assert!(stream.detach().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut stream = Stream::from_bytes("abc");
        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(stream.to_string_lossy(), "");
    }

    #[test]
    fn test_to_string_lossy_rewinds() {
        let mut stream = Stream::from_bytes("preview");
        stream.read(3).unwrap();
        assert_eq!(stream.to_string_lossy(), "preview");

        let mut unreadable = Stream::with_capabilities(
            Resource::Memory(Cursor::new(b"secret".to_vec())),
            Capabilities {
                readable: false,
                writable: true,
                seekable: true,
            },
        );
        assert_eq!(unreadable.to_string_lossy(), "");
    }

    #[test]
    fn test_mode_parsing() {
        assert!(Mode::parse("r").unwrap().is_readable());
        assert!(!Mode::parse("r").unwrap().is_writable());
        assert!(Mode::parse("rb+").unwrap().is_writable());
        assert!(!Mode::parse("w").unwrap().is_readable());
        assert!(Mode::parse("a+").unwrap().is_readable());
        assert!(Mode::parse("q").is_err());
        assert!(Mode::parse("r++").is_err());
    }

    #[test]
    fn test_file_stream() {
        let path = temp_path("file");
        {
            let mut stream = Stream::open(&path, "w+").unwrap();
            stream.write(b"on disk").unwrap();
            assert_eq!(stream.path(), Some(path.as_path()));
            assert_eq!(stream.to_string_lossy(), "on disk");
        }
        let mut stream = Stream::open(&path, "r").unwrap();
        assert!(!stream.is_writable());
        assert_eq!(stream.size(), Some(7));
        assert_eq!(&stream.contents().unwrap()[..], b"on disk");
        drop(stream);
        std::fs::remove_file(&path).unwrap();

        assert!(Stream::open(temp_path("missing"), "r").unwrap_err().is_io());
    }

    #[test]
    fn test_body_handle_is_shared() {
        let body = Body::from("shared");
        let copy = body.clone();
        assert!(body.ptr_eq(&copy));
        assert_eq!(copy.to_string(), "shared");
        assert_eq!(&body.contents().unwrap()[..], b"shared");
        assert!(!body.ptr_eq(&Body::empty()));
    }
}
