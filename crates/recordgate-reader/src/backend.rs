//! Storage backends
//!
//! A backend turns either a parsed URI or a plain path string into a raw,
//! single-pass byte stream. Which form to try is decided by the resource
//! reader, not the backend.

use recordgate_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use url::Url;

/// Config key: directory plain paths are resolved beneath
pub const FS_ROOT: &str = "fs.root";

/// Config key: read buffer size in bytes
pub const IO_BUFFER_SIZE: &str = "io.file.buffer.size";

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// A raw byte stream opened for one resource
///
/// Streams are pulled lazily and closed explicitly by whoever owns them.
pub trait ResourceStream: Read + Send {
    /// Release the underlying handle
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Storage capability consumed by the resource reader
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Open a resource named by a fully-qualified URI
    fn open_uri(&self, uri: &Url) -> io::Result<Box<dyn ResourceStream>>;

    /// Open a resource named by a plain path string
    fn open_path(&self, path: &str) -> io::Result<Box<dyn ResourceStream>>;

    /// Canonical identifier of a URI-form resource
    ///
    /// Every spelling that opens the same data must map to the same string.
    fn locate_uri(&self, uri: &Url) -> io::Result<String> {
        Ok(uri.to_string())
    }

    /// Canonical identifier of a plain-path resource
    fn locate_path(&self, path: &str) -> io::Result<String> {
        Ok(path.to_string())
    }
}

/// Flat string configuration applied before a backend is constructed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    entries: BTreeMap<String, String>,
}

impl BackendConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    /// All entries
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

impl From<HashMap<String, String>> for BackendConfig {
    fn from(map: HashMap<String, String>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

/// Backend reading from the local filesystem
///
/// Accepts `file://` URIs and plain paths. When `fs.root` is configured,
/// plain paths (absolute or relative) are resolved beneath it and may not
/// escape it. URIs with any other scheme are unreachable from here.
///
/// Both forms locate to the `file://` URI of the lexically normalised
/// absolute path, so `customers.jsonl`, `/./customers.jsonl` and
/// `//customers.jsonl` all name the same resource.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: Option<PathBuf>,
    buffer_size: usize,
    config: BackendConfig,
}

impl LocalFileSystem {
    /// Create a backend from configuration
    pub fn new(config: BackendConfig) -> Result<Self> {
        let buffer_size = match config.get(IO_BUFFER_SIZE) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| {
                    Error::config(format!("{} must be a positive integer, got '{}'", IO_BUFFER_SIZE, raw))
                })?,
            None => DEFAULT_BUFFER_SIZE,
        };

        let root = config
            .get(FS_ROOT)
            .map(|root| absolute(Path::new(root)))
            .transpose()
            .map_err(|e| Error::config(format!("cannot resolve {}: {}", FS_ROOT, e)))?;
        debug!(root = ?root, buffer_size, "Created local filesystem backend");

        Ok(Self {
            root,
            buffer_size,
            config,
        })
    }

    /// Configuration entries that differ from the defaults
    pub fn effective_config(&self) -> BTreeMap<String, String> {
        self.config
            .entries()
            .iter()
            .filter(|(key, value)| match key.as_str() {
                IO_BUFFER_SIZE => value.parse::<usize>().ok() != Some(DEFAULT_BUFFER_SIZE),
                _ => true,
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn resolve_plain(&self, path: &str) -> io::Result<PathBuf> {
        let Some(root) = &self.root else {
            return absolute(Path::new(path));
        };

        let mut resolved = root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("path '{}' escapes the configured root", path),
                    ))
                }
            }
        }
        Ok(resolved)
    }

    fn file_path(uri: &Url) -> io::Result<PathBuf> {
        if uri.scheme() != "file" {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("scheme '{}' is not reachable from the local filesystem", uri.scheme()),
            ));
        }

        uri.to_file_path().map(|path| normalise(&path)).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' does not name a local file", uri),
            )
        })
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ResourceStream>> {
        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened local file");
        Ok(Box::new(FileStream {
            reader: Some(BufReader::with_capacity(self.buffer_size, file)),
        }))
    }
}

impl StorageBackend for LocalFileSystem {
    fn open_uri(&self, uri: &Url) -> io::Result<Box<dyn ResourceStream>> {
        self.open_file(&Self::file_path(uri)?)
    }

    fn open_path(&self, path: &str) -> io::Result<Box<dyn ResourceStream>> {
        let resolved = self.resolve_plain(path)?;
        self.open_file(&resolved)
    }

    fn locate_uri(&self, uri: &Url) -> io::Result<String> {
        if uri.scheme() != "file" {
            return Ok(uri.to_string());
        }
        file_uri(&Self::file_path(uri)?)
    }

    fn locate_path(&self, path: &str) -> io::Result<String> {
        file_uri(&self.resolve_plain(path)?)
    }
}

/// Drop `.` components and fold `..` into their parent, without touching disk
fn normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalise(path));
    }
    Ok(normalise(&std::env::current_dir()?.join(path)))
}

fn file_uri(path: &Path) -> io::Result<String> {
    Url::from_file_path(path).map(String::from).map_err(|()| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' has no file URI", path.display()),
        )
    })
}

/// Buffered local file; reads after close fail
struct FileStream {
    reader: Option<BufReader<File>>,
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(io::Error::other("stream closed")),
        }
    }
}

impl ResourceStream for FileStream {
    fn close(&mut self) -> io::Result<()> {
        // Dropping the file releases the descriptor
        self.reader.take();
        Ok(())
    }
}
