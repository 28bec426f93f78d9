use std::collections::BTreeMap;

use crate::error::SurfaceError;

/// Durable string-keyed storage the marker snapshot is mirrored into.
///
/// Implementations store raw strings; encoding is the store's business.
pub trait PersistenceSurface {
    /// Returns `None` when nothing is stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, SurfaceError>;
    /// Overwrites whatever is stored under `key`.
    fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError>;
}

impl<S: PersistenceSurface + ?Sized> PersistenceSurface for &mut S {
    fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
        (**self).write(key, value)
    }
}

impl<S: PersistenceSurface + ?Sized> PersistenceSurface for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
        (**self).write(key, value)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InMemorySurface {
    values: BTreeMap<String, String>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut s = Self::new();
        s.values.insert(key.into(), value.into());
        s
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl PersistenceSurface for InMemorySurface {
    fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod file_storage {
    use std::fs;
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};

    use super::PersistenceSurface;
    use crate::error::SurfaceError;

    /// One JSON file per key under a root directory.
    ///
    /// Writes go to a sibling temp file first and are renamed into place, so
    /// a reader sees either the previous snapshot or the new one.
    #[derive(Debug, Clone)]
    pub struct FileSurface {
        root: PathBuf,
    }

    impl FileSurface {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        pub fn path_for(&self, key: &str) -> Result<PathBuf, SurfaceError> {
            let valid = !key.is_empty()
                && !key.starts_with('.')
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !valid {
                return Err(SurfaceError::Io(format!("invalid storage key: {key:?}")));
            }
            Ok(self.root.join(format!("{key}.json")))
        }
    }

    impl PersistenceSurface for FileSurface {
        fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
            let path = self.path_for(key)?;
            match fs::read_to_string(&path) {
                Ok(raw) => Ok(Some(raw)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(SurfaceError::Io(format!("read {path:?}: {e}"))),
            }
        }

        fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
            let path = self.path_for(key)?;
            fs::create_dir_all(&self.root)
                .map_err(|e| SurfaceError::Io(format!("create {:?}: {e}", self.root)))?;

            let tmp = self.root.join(format!(".{key}.json.tmp"));
            let result = replace_via(&tmp, &path, value);
            if result.is_err() {
                let _ = fs::remove_file(&tmp);
            }
            result
        }
    }

    /// Writes `value` to `tmp`, then renames it over `path`.
    fn replace_via(tmp: &Path, path: &Path, value: &str) -> Result<(), SurfaceError> {
        let mut file =
            fs::File::create(tmp).map_err(|e| SurfaceError::Io(format!("create {tmp:?}: {e}")))?;
        file.write_all(value.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| SurfaceError::Io(format!("write {tmp:?}: {e}")))?;
        drop(file);

        fs::rename(tmp, path)
            .map_err(|e| SurfaceError::Io(format!("rename {tmp:?} -> {path:?}: {e}")))
    }

}

#[cfg(not(target_arch = "wasm32"))]
pub use file_storage::FileSurface;

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::PersistenceSurface;
    use crate::error::SurfaceError;

    /// `window.localStorage`, scoped to the page origin.
    #[derive(Debug)]
    pub struct LocalStorageSurface {
        storage: web_sys::Storage,
    }

    impl LocalStorageSurface {
        pub fn new() -> Result<Self, SurfaceError> {
            Ok(Self {
                storage: window_local_storage()?,
            })
        }
    }

    impl PersistenceSurface for LocalStorageSurface {
        fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
            self.storage
                .get_item(key)
                .map_err(|e| SurfaceError::Io(format!("get_item({key}) failed: {:?}", e)))
        }

        fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
            // QuotaExceededError lands here.
            self.storage
                .set_item(key, value)
                .map_err(|e| SurfaceError::Io(format!("set_item({key}) failed: {:?}", e)))
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, SurfaceError> {
        let win = web_sys::window().ok_or(SurfaceError::Unavailable)?;
        win.local_storage()
            .map_err(|e| SurfaceError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(SurfaceError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageSurface;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageSurface;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageSurface {
    pub fn new() -> Result<Self, SurfaceError> {
        Err(SurfaceError::Unavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl PersistenceSurface for LocalStorageSurface {
    fn read(&self, _key: &str) -> Result<Option<String>, SurfaceError> {
        Err(SurfaceError::Unavailable)
    }

    fn write(&mut self, _key: &str, _value: &str) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unavailable)
    }
}
