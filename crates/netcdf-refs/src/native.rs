//! Helpers around the native netcdf/HDF5 libraries.
//!
//! The netcdf library requires a file path (it wraps libnetcdf/HDF5 which need
//! file handles). When translating bytes fetched from object storage, we write
//! them to a temp file first. On Linux, we use `/dev/shm` (memory-backed tmpfs)
//! to minimize I/O latency.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Once};

use netcdf::AttributeValue;
use serde_json::{Map, Value};

use crate::error::NetCdfResult;

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when probing optional
/// attributes). It only needs to be called once per process, but is safe to
/// call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: passing null handlers disables error output, a documented use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Serialize access to the HDF5 library.
///
/// libhdf5 is usually built without thread safety, so every call into it,
/// including through the netcdf crate, happens under this lock.
pub fn hdf5_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A temporary copy of in-memory file content, removed on drop.
pub struct TempNcFile {
    path: PathBuf,
}

impl TempNcFile {
    pub fn create(data: &[u8]) -> NetCdfResult<Self> {
        let path = optimal_temp_dir().join(generate_temp_filename());
        let mut file = std::fs::File::create(&path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempNcFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Get the optimal temp directory for NetCDF file operations.
///
/// On Linux, uses /dev/shm if available and writable, otherwise the system
/// temp directory.
fn optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.is_dir() {
            let test_path = shm_path.join(format!(".nckc_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Unique temp file name from process ID, thread ID and a counter.
fn generate_temp_filename() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let tid = std::thread::current().id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("nckc_{}_{:?}_{}.nc", pid, tid, count)
}

/// Convert a NetCDF attribute value into JSON.
///
/// Single values become scalars; non-finite floats are written as strings.
pub fn attribute_to_json(value: AttributeValue) -> Value {
    fn float(v: f64) -> Value {
        if v.is_finite() {
            serde_json::json!(v)
        } else if v.is_nan() {
            Value::from("NaN")
        } else if v > 0.0 {
            Value::from("Infinity")
        } else {
            Value::from("-Infinity")
        }
    }
    fn list<T>(items: Vec<T>, f: impl Fn(T) -> Value) -> Value {
        Value::Array(items.into_iter().map(f).collect())
    }

    #[allow(unreachable_patterns)]
    match value {
        AttributeValue::Uchar(v) => Value::from(v),
        AttributeValue::Uchars(v) => list(v, Value::from),
        AttributeValue::Schar(v) => Value::from(v),
        AttributeValue::Schars(v) => list(v, Value::from),
        AttributeValue::Ushort(v) => Value::from(v),
        AttributeValue::Ushorts(v) => list(v, Value::from),
        AttributeValue::Short(v) => Value::from(v),
        AttributeValue::Shorts(v) => list(v, Value::from),
        AttributeValue::Uint(v) => Value::from(v),
        AttributeValue::Uints(v) => list(v, Value::from),
        AttributeValue::Int(v) => Value::from(v),
        AttributeValue::Ints(v) => list(v, Value::from),
        AttributeValue::Ulonglong(v) => Value::from(v),
        AttributeValue::Ulonglongs(v) => list(v, Value::from),
        AttributeValue::Longlong(v) => Value::from(v),
        AttributeValue::Longlongs(v) => list(v, Value::from),
        AttributeValue::Float(v) => float(v as f64),
        AttributeValue::Floats(v) => list(v, |x| float(x as f64)),
        AttributeValue::Double(v) => float(v),
        AttributeValue::Doubles(v) => list(v, float),
        AttributeValue::Str(v) => Value::from(v),
        AttributeValue::Strs(v) => list(v, Value::from),
        _ => Value::Null,
    }
}

/// Collect attributes into a JSON object, skipping unreadable ones.
pub fn attributes_to_json<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Map<String, Value> {
    let mut map = Map::new();
    for attr in attrs {
        match attr.value() {
            Ok(value) => {
                map.insert(attr.name().to_string(), attribute_to_json(value));
            }
            Err(e) => {
                tracing::debug!(attribute = %attr.name(), error = %e, "Skipping unreadable attribute");
            }
        }
    }
    map
}
