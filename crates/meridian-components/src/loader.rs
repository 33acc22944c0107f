//! Module loader boundary.
//!
//! The manager never owns a concrete loading mechanism; it talks to a
//! [`ModuleLoader`] and stores the opaque [`ModuleHandle`] it returns.
//! [`NativeLoader`] loads dynamic libraries; [`NullLoader`] backs tests and
//! hosts without native modules.

use crate::error::{ComponentError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// Opaque token for a loaded module. The manager stores it; only the loader
/// that produced it knows what stands behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    name: String,
}

impl ModuleHandle {
    /// The module name this handle refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Loads and unloads component modules.
pub trait ModuleLoader: Send + Sync {
    /// Load the module at `path`, registering it under `name`.
    ///
    /// # Errors
    /// Returns [`ComponentError::ModuleLoad`] when the module cannot be
    /// resolved or loaded.
    fn load(&self, path: &Path, name: &str) -> Result<ModuleHandle>;

    /// Unload the module registered under `name`.
    ///
    /// # Errors
    /// Returns [`ComponentError::ModuleLoad`] when the module is unknown.
    fn unload(&self, name: &str) -> Result<()>;
}

/// Loader backed by dynamic libraries.
#[derive(Debug, Default)]
pub struct NativeLoader {
    libraries: DashMap<String, libloading::Library>,
}

impl NativeLoader {
    /// Create an empty native loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleLoader for NativeLoader {
    #[allow(unsafe_code)]
    fn load(&self, path: &Path, name: &str) -> Result<ModuleHandle> {
        info!(name, path = %path.display(), "loading native module");
        // SAFETY: loading a shared library runs its initializers; the caller
        // vouches for the module by configuring its path.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            ComponentError::ModuleLoad {
                name: name.to_string(),
                detail: e.to_string(),
            }
        })?;
        self.libraries.insert(name.to_string(), library);
        Ok(ModuleHandle {
            name: name.to_string(),
        })
    }

    fn unload(&self, name: &str) -> Result<()> {
        match self.libraries.remove(name) {
            Some(_) => {
                debug!(name, "native module unloaded");
                Ok(())
            }
            None => Err(ComponentError::ModuleLoad {
                name: name.to_string(),
                detail: "module not loaded".to_string(),
            }),
        }
    }
}

/// Loader that records names without touching the filesystem.
#[derive(Debug, Default)]
pub struct NullLoader {
    loaded: Mutex<Vec<String>>,
}

impl NullLoader {
    /// Create an empty null loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently considered loaded.
    #[must_use]
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

impl ModuleLoader for NullLoader {
    fn load(&self, _path: &Path, name: &str) -> Result<ModuleHandle> {
        self.loaded.lock().push(name.to_string());
        Ok(ModuleHandle {
            name: name.to_string(),
        })
    }

    fn unload(&self, name: &str) -> Result<()> {
        let mut loaded = self.loaded.lock();
        match loaded.iter().position(|n| n == name) {
            Some(index) => {
                loaded.remove(index);
                Ok(())
            }
            None => Err(ComponentError::ModuleLoad {
                name: name.to_string(),
                detail: "module not loaded".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_loader_tracks_names() {
        let loader = NullLoader::new();
        let handle = loader.load(Path::new("/fake.so"), "camera").unwrap();
        assert_eq!(handle.name(), "camera");
        assert_eq!(loader.loaded(), vec!["camera"]);

        loader.unload("camera").unwrap();
        assert!(loader.loaded().is_empty());
        assert!(loader.unload("camera").is_err());
    }

    #[test]
    fn native_loader_rejects_missing_path() {
        let loader = NativeLoader::new();
        let err = loader.load(Path::new("/no/such/module.so"), "ghost");
        assert!(matches!(err, Err(ComponentError::ModuleLoad { .. })));
    }
}
