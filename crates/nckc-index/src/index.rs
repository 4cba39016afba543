//! The NetCDF Kerchunk index.
//!
//! An index is a directory or Zip archive holding `nckc-index.json` plus one
//! `<path>.nc.json` reference document per NetCDF file of the source
//! archive, mirroring the archive layout.

use std::path::Path;
use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use netcdf_refs::{translate_bytes, translate_file, ReferenceSet, TranslateOptions};
use smos_common::{ProductType, SmosError};
use storage::{open_index_store, IndexMode, IndexStore, SourceFs};

use crate::config::{normalize_path_protocol, IndexConfig, INDEX_CONFIG_FILENAME};
use crate::error::{NcKcError, Result};

/// Suffix of source files picked up by [`NcKcIndex::sync`].
pub const NC_SUFFIX: &str = ".nc";

/// Suffix appended to a source path to name its reference document.
pub const INDEX_ENTRY_SUFFIX: &str = ".json";

/// Default number of files per block when syncing with several workers.
pub const DEFAULT_BLOCK_SIZE: usize = 100;

/// Storage option keys whose values are never shown.
const SECRET_KEY_MARKERS: &[&str] = &["secret", "token", "password"];

/// Options for [`NcKcIndex::sync`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Only index files below this source path prefix
    pub prefix: Option<String>,
    pub num_workers: usize,
    pub block_size: usize,
    /// Re-index files that already have an entry
    pub force: bool,
    /// Translate but do not write entries
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            num_workers: 1,
            block_size: DEFAULT_BLOCK_SIZE,
            force: false,
            dry_run: false,
        }
    }
}

/// Result of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub num_indexed: usize,
    pub num_skipped: usize,
    pub problems: Vec<String>,
}

impl SyncReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Indexed => self.num_indexed += 1,
            FileOutcome::Skipped => self.num_skipped += 1,
            FileOutcome::Failed(problem) => self.problems.push(problem),
        }
    }
}

/// What happened to a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed,
    Skipped,
    Failed(String),
}

/// Summary of an index, as printed by `nckcidx describe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDescription {
    pub index_path: String,
    pub source_path: String,
    pub source_protocol: String,
    pub source_storage_options: Map<String, Value>,
    pub num_entries: usize,
    pub entries_per_product_type: Vec<(String, usize)>,
}

/// Translation result of one file, before it is written.
enum Prepared {
    Skipped,
    Translated(ReferenceSet),
    Failed(String),
}

/// A NetCDF Kerchunk index bound to its source filesystem.
pub struct NcKcIndex {
    store: Arc<dyn IndexStore>,
    config: IndexConfig,
    source: SourceFs,
    translate_options: TranslateOptions,
}

impl std::fmt::Debug for NcKcIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcKcIndex")
            .field("index_path", &self.store.path())
            .field("mode", &self.store.mode())
            .field("source", &self.source)
            .finish()
    }
}

impl NcKcIndex {
    /// Create a new index and return it opened for appending.
    #[instrument(skip(source_storage_options))]
    pub fn create(
        index_path: &Path,
        source_path: Option<&str>,
        source_protocol: Option<&str>,
        source_storage_options: Option<Map<String, Value>>,
        replace_existing: bool,
    ) -> Result<Self> {
        let source_path = source_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| NcKcError::InvalidConfig("Missing source_path".to_string()))?;
        let (source_path, source_protocol) = normalize_path_protocol(source_path, source_protocol);

        let config = IndexConfig::new(
            source_path,
            source_protocol,
            source_storage_options.unwrap_or_default(),
        );
        // The source must be reachable before anything is written.
        let source = SourceFs::new(
            config.protocol()?,
            &config.source_path,
            &config.source_storage_options,
        )?;

        let store = open_index_store(index_path, IndexMode::Create, replace_existing)?;
        store.write_json(INDEX_CONFIG_FILENAME, &config.to_json())?;
        store.close()?;
        drop(store);

        info!(
            index_path = %index_path.display(),
            source_path = %config.source_path,
            "Created index"
        );
        Ok(Self {
            store: open_index_store(index_path, IndexMode::Append, false)?,
            config,
            source,
            translate_options: TranslateOptions::default(),
        })
    }

    /// Open an existing index read-only.
    pub fn open(index_path: &Path) -> Result<Self> {
        Self::open_with_mode(index_path, IndexMode::Read)
    }

    /// Open an existing index in the given mode.
    ///
    /// The configuration is read before the store is reopened, so Zip
    /// archives can be opened for appending.
    #[instrument]
    pub fn open_with_mode(index_path: &Path, mode: IndexMode) -> Result<Self> {
        let reader = open_index_store(index_path, IndexMode::Read, false)?;
        let config = IndexConfig::from_json(reader.read_json(INDEX_CONFIG_FILENAME)?)?;
        let store = if mode == IndexMode::Read {
            reader
        } else {
            reader.close()?;
            drop(reader);
            open_index_store(index_path, mode, false)?
        };

        let source = SourceFs::new(
            config.protocol()?,
            &config.source_path,
            &config.source_storage_options,
        )?;
        debug!(?source, "Opened index");

        Ok(Self {
            store,
            config,
            source,
            translate_options: TranslateOptions::default(),
        })
    }

    /// Replace the source filesystem, e.g. with one using more retries.
    pub fn with_source(mut self, source: SourceFs) -> Self {
        self.source = source;
        self
    }

    pub fn with_translate_options(mut self, options: TranslateOptions) -> Self {
        self.translate_options = options;
        self
    }

    pub fn index_path(&self) -> &Path {
        self.store.path()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn index_store(&self) -> Arc<dyn IndexStore> {
        Arc::clone(&self.store)
    }

    pub fn source_fs(&self) -> &SourceFs {
        &self.source
    }

    /// Finalise pending writes.
    pub fn close(&self) -> Result<()> {
        Ok(self.store.close()?)
    }

    /// Index entries (reference documents) below `prefix`.
    pub fn list_entries(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let suffix = format!("{}{}", NC_SUFFIX, INDEX_ENTRY_SUFFIX);
        Ok(self
            .store
            .list(prefix)?
            .into_iter()
            .filter(|name| name.ends_with(&suffix))
            .collect())
    }

    /// Read the reference set of a source file (`<path>.nc`) or entry (`<path>.nc.json`).
    pub fn read_entry(&self, path: &str) -> Result<ReferenceSet> {
        let entry = entry_name(path);
        let bytes = self.store.read(&entry)?;
        Ok(ReferenceSet::from_json_bytes(&bytes)?)
    }

    /// All NetCDF files of the source, optionally below `prefix`.
    pub async fn get_nc_files(&self, prefix: Option<&str>) -> Vec<String> {
        self.source.list(prefix, NC_SUFFIX).await
    }

    /// [`NcKcIndex::get_nc_files`] split into blocks of at most `block_size` files.
    pub async fn get_nc_file_blocks(
        &self,
        prefix: Option<&str>,
        block_size: usize,
    ) -> Vec<Vec<String>> {
        self.get_nc_files(prefix)
            .await
            .chunks(block_size.max(1))
            .map(|block| block.to_vec())
            .collect()
    }

    /// Index all NetCDF files of the source.
    #[instrument(skip(self), fields(index = %self.store.path().display()))]
    pub async fn sync(&self, options: &SyncOptions) -> Result<SyncReport> {
        if !options.dry_run && !self.store.mode().is_writable() {
            return Err(NcKcError::Storage(SmosError::IndexError(format!(
                "Index is read-only: {}",
                self.store.path().display()
            ))));
        }

        let mut report = SyncReport::default();
        let prefix = options.prefix.as_deref();

        if options.num_workers < 2 {
            for nc_file in self.get_nc_files(prefix).await {
                let outcome = self
                    .index_nc_file(&nc_file, options.force, options.dry_run)
                    .await;
                report.record(outcome);
            }
        } else {
            let blocks = self.get_nc_file_blocks(prefix, options.block_size).await;
            let num_blocks = blocks.len();
            for (i, block) in blocks.into_iter().enumerate() {
                debug!(block = i + 1, num_blocks, files = block.len(), "Indexing block");
                let mut prepared: Vec<(String, Prepared)> = stream::iter(block)
                    .map(|nc_file| async move {
                        let prepared = self.prepare(&nc_file, options.force).await;
                        (nc_file, prepared)
                    })
                    .buffer_unordered(options.num_workers)
                    .collect()
                    .await;
                prepared.sort_by(|a, b| a.0.cmp(&b.0));
                for (nc_file, prepared) in prepared {
                    report.record(self.finish(&nc_file, prepared, options.dry_run));
                }
            }
        }

        info!(
            indexed = report.num_indexed,
            skipped = report.num_skipped,
            problems = report.problems.len(),
            "Sync complete"
        );
        Ok(report)
    }

    /// Index a single source file.
    pub async fn index_nc_file(&self, nc_file: &str, force: bool, dry_run: bool) -> FileOutcome {
        let prepared = self.prepare(nc_file, force).await;
        self.finish(nc_file, prepared, dry_run)
    }

    async fn prepare(&self, nc_file: &str, force: bool) -> Prepared {
        if !force && self.store.contains(&entry_name(nc_file)) {
            debug!(nc_file, "Already indexed");
            return Prepared::Skipped;
        }
        match self.translate(nc_file).await {
            Ok(refs) => Prepared::Translated(refs),
            Err(e) => {
                let problem = format!("Error indexing {}: {}", nc_file, e);
                warn!("{}", problem);
                Prepared::Failed(problem)
            }
        }
    }

    fn finish(&self, nc_file: &str, prepared: Prepared, dry_run: bool) -> FileOutcome {
        let refs = match prepared {
            Prepared::Skipped => return FileOutcome::Skipped,
            Prepared::Failed(problem) => return FileOutcome::Failed(problem),
            Prepared::Translated(refs) => refs,
        };
        if dry_run {
            info!(nc_file, "Would write index entry");
            return FileOutcome::Indexed;
        }

        let entry = entry_name(nc_file);
        let written = refs
            .to_json_bytes()
            .map_err(NcKcError::from)
            .and_then(|bytes| self.store.write(&entry, &bytes).map_err(NcKcError::from));
        match written {
            Ok(()) => {
                info!(entry = %entry, "Indexed");
                FileOutcome::Indexed
            }
            Err(e) => {
                let problem = format!("Error writing index {}: {}", entry, e);
                warn!("{}", problem);
                FileOutcome::Failed(problem)
            }
        }
    }

    /// Translate one file on a blocking thread, downloading it first if it is remote.
    async fn translate(&self, nc_file: &str) -> Result<ReferenceSet> {
        let url = self.source.url(nc_file);
        let options = self.translate_options.clone();

        let task = match self.source.local_path(nc_file) {
            Some(path) => tokio::task::spawn_blocking(move || translate_file(&path, &url, &options)),
            None => {
                let data = self.source.get(nc_file).await?;
                tokio::task::spawn_blocking(move || translate_bytes(&data, &url, &options))
            }
        };
        let refs = task.await.map_err(|e| NcKcError::Task(e.to_string()))??;
        Ok(refs)
    }

    /// Summarise the index.
    pub fn describe(&self) -> Result<IndexDescription> {
        let entries = self.list_entries(None)?;
        let entries_per_product_type = ProductType::all()
            .iter()
            .map(|product_type| {
                let count = entries
                    .iter()
                    .filter(|entry| {
                        let nc_file = entry.trim_end_matches(INDEX_ENTRY_SUFFIX);
                        product_type.parse_filename(nc_file).is_some()
                    })
                    .count();
                (product_type.type_id().to_string(), count)
            })
            .collect();

        Ok(IndexDescription {
            index_path: self.store.path().display().to_string(),
            source_path: self.config.source_path.clone(),
            source_protocol: self.config.protocol_name(),
            source_storage_options: mask_secrets(&self.config.source_storage_options),
            num_entries: entries.len(),
            entries_per_product_type,
        })
    }
}

/// Entry name of a source file: `<path>.nc` -> `<path>.nc.json`.
pub fn entry_name(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.ends_with(INDEX_ENTRY_SUFFIX) {
        path.to_string()
    } else {
        format!("{}{}", path, INDEX_ENTRY_SUFFIX)
    }
}

fn mask_secrets(options: &Map<String, Value>) -> Map<String, Value> {
    options
        .iter()
        .map(|(key, value)| {
            let lower = key.to_lowercase();
            let value = match value {
                Value::Object(nested) => Value::Object(mask_secrets(nested)),
                _ if SECRET_KEY_MARKERS.iter().any(|m| lower.contains(m)) => {
                    Value::String("*****".to_string())
                }
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}
