use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use zip::ZipArchive;

use crate::error::MergeError;
use crate::package::strip_bom;

/// Anything that can enumerate the files of an EPUB container
pub trait EntrySource {
    /// Every file entry with its raw bytes, keyed by its path in the container
    fn list_entries(&self) -> Result<Vec<(String, Vec<u8>)>, MergeError>;
}

/// Zipped EPUB on disk
#[derive(Debug, Clone)]
pub struct ZipSource {
    path: PathBuf,
}

impl ZipSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EntrySource for ZipSource {
    fn list_entries(&self) -> Result<Vec<(String, Vec<u8>)>, MergeError> {
        let file = File::open(&self.path).map_err(|e| MergeError::Container {
            path: self.path.display().to_string(),
            reason: format!("Failed to open zip file: {}", e),
        })?;

        read_zip_entries(file).map_err(|e| MergeError::Container {
            path: self.path.display().to_string(),
            reason: format!("Failed to read zip archive: {}", e),
        })
    }
}

/// Already-extracted EPUB directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl EntrySource for DirectorySource {
    fn list_entries(&self) -> Result<Vec<(String, Vec<u8>)>, MergeError> {
        if !self.root.is_dir() {
            return Err(MergeError::Container {
                path: self.root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let listing = fs::read_dir(&dir).map_err(|e| read_failure(&dir, e))?;
            for entry in listing {
                let path = entry.map_err(|e| read_failure(&dir, e))?.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    let data = fs::read(&path).map_err(|e| read_failure(&path, e))?;
                    entries.push((relative_entry_name(&self.root, &path), data));
                }
            }
        }
        Ok(entries)
    }
}

fn read_failure(path: &Path, e: std::io::Error) -> MergeError {
    MergeError::Container {
        path: path.display().to_string(),
        reason: format!("Failed to read: {}", e),
    }
}

/// Read every file entry of a zip archive from any seekable reader
pub fn read_zip_entries<R: Read + Seek>(reader: R) -> Result<Vec<(String, Vec<u8>)>, MergeError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        entries.push((file.name().to_string(), data));
    }

    Ok(entries)
}

/// Pick the source for a path: directories are read as unpacked EPUBs,
/// anything else as a zip
pub fn source_for(path: &Path) -> Box<dyn EntrySource> {
    if path.is_dir() {
        Box::new(DirectorySource::new(path))
    } else {
        Box::new(ZipSource::new(path))
    }
}

fn relative_entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every file of one EPUB, loaded into memory; read-only once built
#[derive(Debug, Clone, Default)]
pub struct Container {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Container {
    pub fn load(source: &dyn EntrySource) -> Result<Self, MergeError> {
        Ok(Self::from_entries(source.list_entries()?))
    }

    /// Load a zip file or unpacked directory
    pub fn open(path: &Path) -> Result<Self, MergeError> {
        if !path.exists() {
            return Err(MergeError::Container {
                path: path.display().to_string(),
                reason: "no such file or directory".to_string(),
            });
        }
        let container = Self::load(source_for(path).as_ref())?;
        tracing::debug!(path = %path.display(), entries = container.len(), "loaded container");
        Ok(container)
    }

    pub fn from_zip_reader<R: Read + Seek>(reader: R) -> Result<Self, MergeError> {
        Ok(Self::from_entries(read_zip_entries(reader)?))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    /// Look up a path, retrying with percent-escapes decoded
    pub fn resolve(&self, path: &str) -> Option<&[u8]> {
        self.get(path).or_else(|| {
            let decoded = percent_decode_str(path).decode_utf8().ok()?;
            self.get(&decoded)
        })
    }

    /// Text of a listed document, BOM stripped
    pub fn read_text(&self, path: &str) -> Result<String, MergeError> {
        let bytes = self
            .resolve(path)
            .ok_or_else(|| MergeError::MissingDocument(path.to_string()))?;
        String::from_utf8(strip_bom(bytes).to_vec())
            .map_err(|e| MergeError::malformed(path, format!("invalid UTF-8: {}", e)))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
