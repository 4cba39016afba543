//! Source filesystems holding NetCDF archives (local, S3 or in-memory).

use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use smos_common::{SmosError, SmosResult};

/// Default number of retries for failed reads.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries; attempt `n` waits `n` times this.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Protocol of a source filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProtocol {
    File,
    S3,
    Memory,
}

impl SourceProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceProtocol::File => "file",
            SourceProtocol::S3 => "s3",
            SourceProtocol::Memory => "memory",
        }
    }
}

impl FromStr for SourceProtocol {
    type Err = SmosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "local" => Ok(SourceProtocol::File),
            "s3" => Ok(SourceProtocol::S3),
            "memory" => Ok(SourceProtocol::Memory),
            _ => Err(SmosError::invalid_parameter(
                "source_protocol",
                format!("unsupported protocol '{}'", s),
            )),
        }
    }
}

impl std::fmt::Display for SourceProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split `proto://path` into its protocol and path.
pub fn split_protocol(path: &str) -> (Option<&str>, &str) {
    match path.split_once("://") {
        Some((proto, rest)) if !proto.is_empty() && !proto.contains('/') => (Some(proto), rest),
        _ => (None, path),
    }
}

/// A read-only filesystem rooted at a source path.
///
/// Keys are relative to the root and always use `/`.
#[derive(Clone)]
pub struct SourceFs {
    store: Arc<dyn ObjectStore>,
    protocol: SourceProtocol,
    /// Root as given: a local directory or `bucket[/prefix]`
    root: String,
    /// Key prefix inside the store (S3 prefix below the bucket)
    key_prefix: Option<String>,
    max_retries: u32,
}

impl std::fmt::Debug for SourceFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFs")
            .field("protocol", &self.protocol)
            .field("root", &self.root)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl SourceFs {
    /// Create a source filesystem.
    ///
    /// S3 `storage_options` follow the fsspec names: `key`, `secret`,
    /// `token`, `endpoint_url`, `region_name`, `anon` and
    /// `client_kwargs.{endpoint_url, region_name}`.
    pub fn new(
        protocol: SourceProtocol,
        source_path: &str,
        storage_options: &Map<String, Value>,
    ) -> SmosResult<Self> {
        let (_, path) = split_protocol(source_path);
        match protocol {
            SourceProtocol::File => {
                let root = std::fs::canonicalize(path).map_err(|e| {
                    SmosError::StorageError(format!("Source path {} is not accessible: {}", path, e))
                })?;
                let store = LocalFileSystem::new_with_prefix(&root).map_err(|e| {
                    SmosError::StorageError(format!("Failed to open {}: {}", root.display(), e))
                })?;
                Ok(Self {
                    store: Arc::new(store),
                    protocol,
                    root: root.to_string_lossy().into_owned(),
                    key_prefix: None,
                    max_retries: DEFAULT_MAX_RETRIES,
                })
            }
            SourceProtocol::S3 => {
                let trimmed = path.trim_matches('/');
                let (bucket, prefix) = match trimmed.split_once('/') {
                    Some((bucket, prefix)) => (bucket, Some(prefix.trim_matches('/').to_string())),
                    None => (trimmed, None),
                };
                if bucket.is_empty() {
                    return Err(SmosError::invalid_parameter(
                        "source_path",
                        "S3 source path must start with a bucket name",
                    ));
                }
                let store = build_s3(bucket, storage_options)?;
                Ok(Self {
                    store: Arc::new(store),
                    protocol,
                    root: trimmed.to_string(),
                    key_prefix: prefix.filter(|p| !p.is_empty()),
                    max_retries: DEFAULT_MAX_RETRIES,
                })
            }
            SourceProtocol::Memory => Ok(Self::in_memory(path)),
        }
    }

    /// An empty in-memory filesystem.
    pub fn in_memory(root: &str) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            protocol: SourceProtocol::Memory,
            root: root.trim_matches('/').to_string(),
            key_prefix: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn protocol(&self) -> SourceProtocol {
        self.protocol
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn location(&self, key: &str) -> Path {
        let key = key.trim_start_matches('/');
        match &self.key_prefix {
            Some(prefix) => Path::from(format!("{}/{}", prefix, key)),
            None => Path::from(key),
        }
    }

    fn relative_key(&self, location: &Path) -> String {
        let full = location.to_string();
        match &self.key_prefix {
            Some(prefix) => match full.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.trim_start_matches('/').to_string(),
                None => full.clone(),
            },
            None => full,
        }
    }

    /// List keys below `prefix` (recursively) ending with `suffix`, sorted.
    ///
    /// Listing errors are logged and end the listing.
    #[instrument(skip(self), fields(root = %self.root))]
    pub async fn list(&self, prefix: Option<&str>, suffix: &str) -> Vec<String> {
        let location = self.location(prefix.unwrap_or(""));
        let list_prefix = if location.as_ref().is_empty() {
            None
        } else {
            Some(&location)
        };

        let mut keys = Vec::new();
        let mut stream = self.store.list(list_prefix);
        while let Some(item) = stream.next().await {
            match item {
                Ok(meta) => {
                    let key = self.relative_key(&meta.location);
                    if key.ends_with(suffix) {
                        keys.push(key);
                    }
                }
                Err(e) => {
                    warn!(prefix = %location, error = %e, "Listing failed");
                    break;
                }
            }
        }
        keys.sort();
        debug!(count = keys.len(), "Listed source keys");
        keys
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> SmosResult<bool> {
        let location = self.location(key);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(SmosError::StorageError(format!(
                "Failed to check {}: {}",
                key, e
            ))),
        }
    }

    /// Read a whole object.
    #[instrument(skip(self), fields(root = %self.root))]
    pub async fn get(&self, key: &str) -> SmosResult<Bytes> {
        let location = self.location(key);
        let store = &self.store;
        let loc = &location;
        let bytes = self
            .retry("read", key, || async move { store.get(loc).await?.bytes().await })
            .await?;
        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Read the byte range `start..end` of an object.
    pub async fn get_range(&self, key: &str, start: usize, end: usize) -> SmosResult<Bytes> {
        let location = self.location(key);
        let store = &self.store;
        let loc = &location;
        self.retry("read range of", key, || async move {
            store.get_range(loc, start..end).await
        })
        .await
    }

    /// Write an object. Only used to stage test data and scratch files.
    pub async fn put(&self, key: &str, data: Bytes) -> SmosResult<()> {
        let location = self.location(key);
        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| SmosError::StorageError(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }

    /// Local path of a key, for `file` sources only.
    pub fn local_path(&self, key: &str) -> Option<PathBuf> {
        match self.protocol {
            SourceProtocol::File => Some(PathBuf::from(&self.root).join(key.trim_start_matches('/'))),
            _ => None,
        }
    }

    /// URL recorded in chunk references for a key.
    pub fn url(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        match self.protocol {
            SourceProtocol::File => PathBuf::from(&self.root)
                .join(key)
                .to_string_lossy()
                .into_owned(),
            SourceProtocol::S3 => format!("s3://{}/{}", self.root, key),
            SourceProtocol::Memory => format!("memory://{}/{}", self.root, key),
        }
    }

    /// Inverse of [`SourceFs::url`]; `None` for URLs outside this filesystem.
    pub fn key_for_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let root = match self.protocol {
            SourceProtocol::File => self.root.clone(),
            SourceProtocol::S3 => format!("s3://{}", self.root),
            SourceProtocol::Memory => format!("memory://{}", self.root),
        };
        url.strip_prefix(root.as_str())
            .map(|rest| rest.trim_start_matches('/'))
    }

    async fn retry<T, F, Fut>(&self, what: &str, key: &str, mut op: F) -> SmosResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = object_store::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e @ object_store::Error::NotFound { .. }) => {
                    return Err(SmosError::StorageError(format!("Not found: {}: {}", key, e)))
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(key, attempt, error = %e, "Failed to {} object, retrying", what);
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    return Err(SmosError::StorageError(format!(
                        "Failed to {} {}: {}",
                        what, key, e
                    )))
                }
            }
        }
    }
}

fn option_str<'a>(options: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

fn build_s3(bucket: &str, options: &Map<String, Value>) -> SmosResult<object_store::aws::AmazonS3> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

    let client_kwargs = options
        .get("client_kwargs")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for (name, value) in options {
        match name.as_str() {
            "key" | "secret" | "token" | "endpoint_url" | "region_name" | "client_kwargs" => {}
            "anon" => {
                if value.as_bool().unwrap_or(false) {
                    builder = builder.with_skip_signature(true);
                }
            }
            other => warn!(option = other, "Ignoring unsupported S3 storage option"),
        }
    }

    if let Some(key) = option_str(options, "key") {
        builder = builder.with_access_key_id(key);
    }
    if let Some(secret) = option_str(options, "secret") {
        builder = builder.with_secret_access_key(secret);
    }
    if let Some(token) = option_str(options, "token") {
        builder = builder.with_token(token);
    }
    let endpoint = option_str(options, "endpoint_url")
        .or_else(|| option_str(&client_kwargs, "endpoint_url"));
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint);
        if endpoint.starts_with("http://") {
            builder = builder.with_allow_http(true);
        }
    }
    let region = option_str(options, "region_name")
        .or_else(|| option_str(&client_kwargs, "region_name"));
    if let Some(region) = region {
        builder = builder.with_region(region);
    }

    builder
        .build()
        .map_err(|e| SmosError::StorageError(format!("Failed to create S3 client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_protocol() {
        assert_eq!(split_protocol("s3://bucket/a/b"), (Some("s3"), "bucket/a/b"));
        assert_eq!(split_protocol("/data/smos"), (None, "/data/smos"));
        assert_eq!(split_protocol("C:\\data"), (None, "C:\\data"));
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("S3".parse::<SourceProtocol>().unwrap(), SourceProtocol::S3);
        assert_eq!("local".parse::<SourceProtocol>().unwrap(), SourceProtocol::File);
        assert!("gs".parse::<SourceProtocol>().is_err());
    }

    #[tokio::test]
    async fn test_memory_list_get_range() {
        let fs = SourceFs::in_memory("archive");
        fs.put("SMOS/a/1.nc", Bytes::from_static(b"0123456789")).await.unwrap();
        fs.put("SMOS/a/1.txt", Bytes::from_static(b"x")).await.unwrap();
        fs.put("SMOS/b/2.nc", Bytes::from_static(b"abc")).await.unwrap();

        assert_eq!(fs.list(None, ".nc").await, vec!["SMOS/a/1.nc", "SMOS/b/2.nc"]);
        assert_eq!(fs.list(Some("SMOS/b"), ".nc").await, vec!["SMOS/b/2.nc"]);
        assert_eq!(&fs.get_range("SMOS/a/1.nc", 2, 5).await.unwrap()[..], b"234");
        assert!(fs.exists("SMOS/b/2.nc").await.unwrap());
        assert!(!fs.exists("SMOS/c.nc").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_retried() {
        let fs = SourceFs::in_memory("archive").with_max_retries(5);
        let start = std::time::Instant::now();
        let err = fs.get("nope.nc").await.unwrap_err();
        assert!(matches!(err, SmosError::StorageError(_)));
        assert!(start.elapsed() < RETRY_BACKOFF);
    }

    #[test]
    fn test_url_roundtrip() {
        let fs = SourceFs::in_memory("archive");
        let url = fs.url("SMOS/a/1.nc");
        assert_eq!(url, "memory://archive/SMOS/a/1.nc");
        assert_eq!(fs.key_for_url(&url), Some("SMOS/a/1.nc"));
        assert_eq!(fs.key_for_url("s3://other/x.nc"), None);
    }

    #[tokio::test]
    async fn test_local_source() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("2023/04")).unwrap();
        std::fs::write(dir.path().join("2023/04/a.nc"), b"data").unwrap();

        let fs = SourceFs::new(
            SourceProtocol::File,
            &dir.path().to_string_lossy(),
            &Map::new(),
        )
        .unwrap();
        assert_eq!(fs.list(None, ".nc").await, vec!["2023/04/a.nc"]);
        assert_eq!(&fs.get("2023/04/a.nc").await.unwrap()[..], b"data");
        let local = fs.local_path("2023/04/a.nc").unwrap();
        assert!(local.exists());
        assert_eq!(fs.url("2023/04/a.nc"), local.to_string_lossy());
    }

    #[test]
    fn test_s3_requires_bucket() {
        let err = SourceFs::new(SourceProtocol::S3, "s3://", &Map::new()).unwrap_err();
        assert!(matches!(err, SmosError::InvalidParameter { .. }));
    }
}
