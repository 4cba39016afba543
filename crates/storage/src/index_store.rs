//! Local stores for index files: a directory tree or a Zip archive.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use smos_common::{SmosError, SmosResult};

/// How an index store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Create a new store; fails if one exists unless replacing.
    Create,
    /// Add to an existing store.
    Append,
    /// Read-only access.
    Read,
}

impl IndexMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, IndexMode::Read)
    }
}

/// A file store used by the NetCDF Kerchunk index.
///
/// Relative file names always use `/` as separator.
pub trait IndexStore: Send + Sync {
    /// Absolute path of the store.
    fn path(&self) -> &Path;

    fn mode(&self) -> IndexMode;

    fn contains(&self, file: &str) -> bool;

    /// List files. A prefix ending in `/` lists that subtree, any other
    /// prefix filters names by string prefix.
    fn list(&self, prefix: Option<&str>) -> SmosResult<Vec<String>>;

    fn read(&self, file: &str) -> SmosResult<Vec<u8>>;

    fn write(&self, file: &str, data: &[u8]) -> SmosResult<()>;

    /// Write a JSON document, pretty printed.
    fn write_json(&self, file: &str, value: &serde_json::Value) -> SmosResult<()> {
        let data = serde_json::to_vec_pretty(value)?;
        self.write(file, &data)
    }

    fn read_json(&self, file: &str) -> SmosResult<serde_json::Value> {
        let data = self.read(file)?;
        serde_json::from_slice(&data).map_err(|e| {
            SmosError::IndexError(format!("Invalid JSON in {}: {}", file, e))
        })
    }

    /// Flush and release the store. Further writes fail.
    fn close(&self) -> SmosResult<()> {
        Ok(())
    }
}

/// Open the store at `path`: a Zip archive if it ends with `.zip`,
/// otherwise a directory.
pub fn open_index_store(
    path: &Path,
    mode: IndexMode,
    replace: bool,
) -> SmosResult<Arc<dyn IndexStore>> {
    let is_zip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if is_zip {
        Ok(Arc::new(ZipIndexStore::open(path, mode, replace)?))
    } else {
        Ok(Arc::new(DirIndexStore::open(path, mode, replace)?))
    }
}

fn not_found(path: &Path) -> SmosError {
    SmosError::IndexError(format!("Index not found: {}", path.display()))
}

fn exists_error(path: &Path) -> SmosError {
    SmosError::IndexError(format!("Index exists: {}", path.display()))
}

fn read_only_error(path: &Path) -> SmosError {
    SmosError::IndexError(format!("Index is read-only: {}", path.display()))
}

fn absolute(path: &Path) -> SmosResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

// =============================================================================
// Directory store
// =============================================================================

/// Index files kept in a directory tree.
#[derive(Debug)]
pub struct DirIndexStore {
    path: PathBuf,
    mode: IndexMode,
}

impl DirIndexStore {
    pub fn open(path: &Path, mode: IndexMode, replace: bool) -> SmosResult<Self> {
        let path = absolute(path)?;
        let exists = path.exists();
        if mode == IndexMode::Create {
            if exists {
                if !replace {
                    return Err(exists_error(&path));
                }
                std::fs::remove_dir_all(&path)?;
            }
            std::fs::create_dir_all(&path)?;
        } else if !exists {
            return Err(not_found(&path));
        }
        Ok(Self { path, mode })
    }

    fn file_path(&self, file: &str) -> PathBuf {
        file.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.path.clone(), |acc, part| acc.join(part))
    }
}

impl IndexStore for DirIndexStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn mode(&self) -> IndexMode {
        self.mode
    }

    fn contains(&self, file: &str) -> bool {
        self.file_path(file).exists()
    }

    fn list(&self, prefix: Option<&str>) -> SmosResult<Vec<String>> {
        let (root, filter) = match prefix {
            Some(p) if p.ends_with('/') => (self.file_path(p), None),
            other => (self.path.clone(), other.filter(|p| !p.is_empty())),
        };
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| SmosError::IndexError(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.path) else {
                continue;
            };
            let file = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if filter.map_or(true, |p| file.starts_with(p)) {
                files.push(file);
            }
        }
        Ok(files)
    }

    fn read(&self, file: &str) -> SmosResult<Vec<u8>> {
        std::fs::read(self.file_path(file))
            .map_err(|e| SmosError::IndexError(format!("Failed to read {}: {}", file, e)))
    }

    fn write(&self, file: &str, data: &[u8]) -> SmosResult<()> {
        if !self.mode.is_writable() {
            return Err(read_only_error(&self.path));
        }
        let path = self.file_path(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data)?;
        debug!(file, size = data.len(), "Wrote index file");
        Ok(())
    }
}

// =============================================================================
// Zip store
// =============================================================================

enum ZipState {
    Reader(ZipArchive<File>),
    Writer(ZipWriter<File>),
    Closed,
}

struct ZipInner {
    state: ZipState,
    /// Entry names in archive order
    files: Vec<String>,
    file_set: HashSet<String>,
}

/// Index files kept in a single Zip archive.
pub struct ZipIndexStore {
    path: PathBuf,
    mode: IndexMode,
    inner: Mutex<ZipInner>,
}

impl std::fmt::Debug for ZipIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipIndexStore")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

fn zip_error(path: &Path, e: zip::result::ZipError) -> SmosError {
    SmosError::IndexError(format!("Zip archive {}: {}", path.display(), e))
}

impl ZipIndexStore {
    pub fn open(path: &Path, mode: IndexMode, replace: bool) -> SmosResult<Self> {
        let path = absolute(path)?;
        let exists = path.exists();

        let (state, files) = match mode {
            IndexMode::Create => {
                if exists {
                    if !replace {
                        return Err(exists_error(&path));
                    }
                    std::fs::remove_file(&path)?;
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
                (ZipState::Writer(ZipWriter::new(file)), Vec::new())
            }
            _ if !exists => return Err(not_found(&path)),
            IndexMode::Read => {
                let archive =
                    ZipArchive::new(File::open(&path)?).map_err(|e| zip_error(&path, e))?;
                let files = archive.file_names().map(str::to_string).collect();
                (ZipState::Reader(archive), files)
            }
            IndexMode::Append => {
                let file = OpenOptions::new().read(true).write(true).open(&path)?;
                let writer = ZipWriter::new_append(file).map_err(|e| zip_error(&path, e))?;
                let archive =
                    ZipArchive::new(File::open(&path)?).map_err(|e| zip_error(&path, e))?;
                let files = archive.file_names().map(str::to_string).collect();
                (ZipState::Writer(writer), files)
            }
        };

        let file_set = files.iter().cloned().collect();
        Ok(Self {
            path,
            mode,
            inner: Mutex::new(ZipInner {
                state,
                files,
                file_set,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ZipInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IndexStore for ZipIndexStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn mode(&self) -> IndexMode {
        self.mode
    }

    fn contains(&self, file: &str) -> bool {
        self.lock().file_set.contains(file)
    }

    fn list(&self, prefix: Option<&str>) -> SmosResult<Vec<String>> {
        let inner = self.lock();
        let mut files: Vec<String> = inner
            .files
            .iter()
            .filter(|f| prefix.map_or(true, |p| f.starts_with(p)))
            .cloned()
            .collect();
        files.sort();
        Ok(files)
    }

    fn read(&self, file: &str) -> SmosResult<Vec<u8>> {
        let mut inner = self.lock();
        match &mut inner.state {
            ZipState::Reader(archive) => {
                let mut entry = archive.by_name(file).map_err(|e| zip_error(&self.path, e))?;
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;
                Ok(data)
            }
            ZipState::Writer(_) => Err(SmosError::IndexError(format!(
                "Zip index {} is open for writing and cannot be read",
                self.path.display()
            ))),
            ZipState::Closed => Err(SmosError::IndexError(format!(
                "Zip index {} is closed",
                self.path.display()
            ))),
        }
    }

    fn write(&self, file: &str, data: &[u8]) -> SmosResult<()> {
        let mut inner = self.lock();
        let ZipState::Writer(writer) = &mut inner.state else {
            return Err(read_only_error(&self.path));
        };
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(file, options)
            .map_err(|e| zip_error(&self.path, e))?;
        writer.write_all(data)?;
        if inner.file_set.insert(file.to_string()) {
            inner.files.push(file.to_string());
        }
        debug!(file, size = data.len(), "Wrote zip index entry");
        Ok(())
    }

    fn close(&self) -> SmosResult<()> {
        let mut inner = self.lock();
        if let ZipState::Writer(writer) = std::mem::replace(&mut inner.state, ZipState::Closed) {
            writer.finish().map_err(|e| zip_error(&self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for ZipIndexStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
