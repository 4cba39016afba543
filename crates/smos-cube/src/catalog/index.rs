//! Catalog backed by a NetCDF Kerchunk index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use nckc_index::NcKcIndex;
use netcdf_refs::{decode_variable, RefValue, ReferenceSet};
use smos_common::{ProductType, SmosError, SmosResult, TimeRange};
use storage::SourceFs;

use super::{sort_records, Catalog, DatasetRecord};
use crate::config::INDEX_PATH_ENV;
use crate::l2product::{L2Dataset, L2Variable};

/// Reads L2 products through the chunk references of an index.
pub struct IndexCatalog {
    index: Arc<NcKcIndex>,
    source: SourceFs,
}

impl std::fmt::Debug for IndexCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCatalog")
            .field("index_path", &self.index.index_path())
            .field("source", &self.source)
            .finish()
    }
}

impl IndexCatalog {
    /// Open the index at `index_path`, or at `$SMOS_INDEX_PATH` if not given.
    pub fn open(index_path: Option<&Path>, max_retries: u32) -> SmosResult<Self> {
        let index_path = match index_path {
            Some(path) => path.to_path_buf(),
            None => std::env::var(INDEX_PATH_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| SmosError::MissingParameter(INDEX_PATH_ENV.to_string()))?,
        };
        let index = NcKcIndex::open(&index_path)?;
        Ok(Self::new(index, max_retries))
    }

    pub fn new(index: NcKcIndex, max_retries: u32) -> Self {
        let source = index.source_fs().clone().with_max_retries(max_retries);
        Self {
            index: Arc::new(index),
            source,
        }
    }

    pub fn index(&self) -> &NcKcIndex {
        &self.index
    }

    fn read_refs(&self, path: &str) -> SmosResult<ReferenceSet> {
        Ok(self.index.read_entry(path)?)
    }

    async fn fetch_chunk(&self, value: &RefValue) -> SmosResult<Bytes> {
        match value {
            RefValue::Range(url, offset, length) => {
                let key = self.source.key_for_url(url).ok_or_else(|| {
                    SmosError::IndexError(format!(
                        "Chunk reference {} is outside of source {}",
                        url,
                        self.source.root()
                    ))
                })?;
                let start = *offset as usize;
                self.source.get_range(key, start, start + *length as usize).await
            }
            RefValue::Inline(_) => value
                .inline_content()
                .map_err(|e| SmosError::NetCdfError(e.to_string()))?
                .map(Bytes::from)
                .ok_or_else(|| SmosError::InternalError("empty inline reference".to_string())),
        }
    }

    async fn read_variable(&self, refs: &ReferenceSet, name: &str) -> SmosResult<L2Variable> {
        let netcdf = |e: netcdf_refs::NetCdfError| SmosError::NetCdfError(e.to_string());
        let meta = refs.array_meta(name).map_err(netcdf)?;
        let chunk_refs = refs.chunk_refs(name).map_err(netcdf)?;
        let chunks = try_join_all(chunk_refs.into_iter().map(|(index, value)| async move {
            let bytes = self.fetch_chunk(value).await?;
            Ok::<_, SmosError>((index, bytes))
        }))
        .await?;

        Ok(L2Variable {
            name: name.to_string(),
            dims: refs.variable_dims(name).map_err(netcdf)?,
            data: decode_variable(&meta, chunks).map_err(netcdf)?,
            attrs: refs.variable_attrs(name).map_err(netcdf)?,
            fill_value: meta.fill_value,
        })
    }
}

#[async_trait]
impl Catalog for IndexCatalog {
    #[instrument(skip(self), fields(product_type = %product_type))]
    async fn find_datasets(
        &self,
        product_type: ProductType,
        time_range: &TimeRange,
    ) -> SmosResult<Vec<DatasetRecord>> {
        // Products crossing midnight are filed under the day they start.
        let lookback = TimeRange::new(time_range.start - Duration::days(1), time_range.end);

        let mut records = Vec::new();
        for day in lookback.days() {
            let prefix = format!("{}/", product_type.day_path(day));
            for entry in self.index.list_entries(Some(&prefix))? {
                let path = entry.strip_suffix(".json").unwrap_or(&entry);
                if let Some(file) = product_type.parse_filename(path) {
                    if time_range.overlaps(&file.start, &file.stop) {
                        records.push(DatasetRecord::from(file));
                    }
                }
            }
        }
        sort_records(&mut records);
        debug!(count = records.len(), "Found datasets");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn open_dataset(&self, path: &str) -> SmosResult<L2Dataset> {
        let refs = self.read_refs(path)?;
        let attrs = refs
            .global_attrs()
            .map_err(|e| SmosError::NetCdfError(e.to_string()))?;
        let mut variables = Vec::new();
        for name in refs.variable_names() {
            variables.push(self.read_variable(&refs, &name).await?);
        }
        debug!(variables = variables.len(), "Opened dataset");
        Ok(L2Dataset { attrs, variables })
    }

    async fn dataset_attrs(&self, path: &str) -> SmosResult<Map<String, Value>> {
        self.read_refs(path)?
            .global_attrs()
            .map_err(|e| SmosError::NetCdfError(e.to_string()))
    }
}
