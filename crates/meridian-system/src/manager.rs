//! Declared external packages and install/uninstall planning.

use crate::error::{DependencyError, DependencyErrorCode, DependencyResult};
use crate::registry::PackageManagerRegistry;
use crate::runner::CommandRunner;
use ahash::AHashMap;
use lru::LruCache;
use meridian_core::{check_version, CompareStrategy, Version};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File the installation cache persists to.
const CACHE_FILE: &str = "dependency_cache.json";

/// Bound on the installed-state cache.
const INSTALLED_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(n) => n,
    None => unreachable!(),
};

/// A declared external package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    /// Package name, e.g. `openssl`.
    pub name: String,
    /// Declared version.
    pub version: Version,
    /// Which package manager satisfies it.
    pub package_manager: String,
    /// Names of packages this one depends on.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Whether the package is optional.
    #[serde(default)]
    pub optional: bool,
    /// Minimum required version constraint, empty for none.
    #[serde(default)]
    pub min_version: String,
    /// Maximum allowed version constraint, empty for none.
    #[serde(default)]
    pub max_version: String,
}

/// Plans installation and removal of declared external packages.
///
/// Owns the declared dependency list, a bounded installed-state cache
/// persisted to `dependency_cache.json`, and per-dependency custom install
/// command overrides. Command execution goes through the registry's
/// [`CommandRunner`] seam.
pub struct DependencyManager {
    registry: Arc<PackageManagerRegistry>,
    runner: Arc<dyn CommandRunner>,
    deps: RwLock<Vec<PackageDependency>>,
    installed: Mutex<LruCache<String, bool>>,
    custom_install_commands: RwLock<AHashMap<String, String>>,
    cache_dir: PathBuf,
}

impl std::fmt::Debug for DependencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyManager")
            .field("declared", &self.deps.read().len())
            .field("cached", &self.installed.lock().len())
            .finish()
    }
}

impl DependencyManager {
    /// Create a manager over the given registry and runner, loading any
    /// persisted installation cache from `cache_dir`.
    #[must_use]
    pub fn new(
        registry: Arc<PackageManagerRegistry>,
        runner: Arc<dyn CommandRunner>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        let manager = Self {
            registry,
            runner,
            deps: RwLock::new(Vec::new()),
            installed: Mutex::new(LruCache::new(INSTALLED_CACHE_SIZE)),
            custom_install_commands: RwLock::new(AHashMap::new()),
            cache_dir: cache_dir.into(),
        };
        manager.load_cache();
        manager
    }

    fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }

    fn load_cache(&self) {
        let path = self.cache_path();
        let Ok(content) = std::fs::read_to_string(&path) else {
            return;
        };
        match serde_json::from_str::<AHashMap<String, bool>>(&content) {
            Ok(entries) => {
                let mut cache = self.installed.lock();
                for (name, installed) in entries {
                    cache.put(name, installed);
                }
                debug!(path = %path.display(), "installation cache loaded");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "ignoring corrupt installation cache"),
        }
    }

    /// Persist the installation cache. Call at shutdown.
    ///
    /// # Errors
    /// Fails when the cache file cannot be written.
    pub fn save_cache(&self) -> DependencyResult<()> {
        let entries: AHashMap<String, bool> = self
            .installed
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let json = serde_json::to_string_pretty(&entries).map_err(|e| {
            DependencyError::new(DependencyErrorCode::UnknownError, e.to_string())
        })?;
        std::fs::write(self.cache_path(), json).map_err(|e| {
            DependencyError::new(
                DependencyErrorCode::PermissionDenied,
                format!("could not write installation cache: {e}"),
            )
        })?;
        Ok(())
    }

    /// Declare a dependency. Re-declaring a name replaces the entry.
    pub fn add_dependency(&self, dep: PackageDependency) {
        let mut deps = self.deps.write();
        deps.retain(|existing| existing.name != dep.name);
        info!(name = %dep.name, version = %dep.version, "dependency declared");
        deps.push(dep);
    }

    /// Remove a declared dependency.
    pub fn remove_dependency(&self, name: &str) {
        self.deps.write().retain(|dep| dep.name != name);
        self.installed.lock().pop(name);
    }

    /// The declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Vec<PackageDependency> {
        self.deps.read().clone()
    }

    /// Override the install command used for one dependency.
    pub fn set_custom_install_command(&self, dep: &str, command: &str) {
        self.custom_install_commands
            .write()
            .insert(dep.to_string(), command.to_string());
    }

    fn declared(&self, name: &str) -> DependencyResult<PackageDependency> {
        self.deps
            .read()
            .iter()
            .find(|dep| dep.name == name)
            .cloned()
            .ok_or_else(|| DependencyError::not_found(name))
    }

    fn install_plan(&self, dep: &PackageDependency) -> DependencyResult<String> {
        if let Some(custom) = self.custom_install_commands.read().get(&dep.name) {
            return Ok(custom.clone());
        }
        let manager = self
            .registry
            .get_package_manager(&dep.package_manager)
            .ok_or_else(|| DependencyError::no_manager(&dep.package_manager))?;
        Ok(manager.install_command(&dep.name))
    }

    /// Install a declared dependency, returning its name on success.
    ///
    /// # Errors
    /// `DependencyNotFound` when not declared, `PackageManagerNotFound` when
    /// its manager is unavailable, `InstallFailed` when the command fails.
    pub async fn install(&self, name: &str) -> DependencyResult<String> {
        let dep = self.declared(name)?;
        let command = self.install_plan(&dep)?;
        let runner = self.runner.clone();
        info!(name, command, "installing dependency");

        let run = tokio::task::spawn_blocking(move || runner.run(&command))
            .await
            .map_err(|e| DependencyError::new(DependencyErrorCode::UnknownError, e.to_string()))?;

        match run {
            Ok(_) => {
                self.installed.lock().put(dep.name.clone(), true);
                Ok(dep.name)
            }
            Err(e) => Err(DependencyError::new(
                DependencyErrorCode::InstallFailed,
                format!("install of '{name}' failed: {e}"),
            )
            .with_context(name.to_string())),
        }
    }

    /// Install a dependency after checking the requested version against its
    /// declaration.
    ///
    /// # Errors
    /// As [`DependencyManager::install`], plus `InvalidVersion` when the
    /// requested version is incompatible.
    pub async fn install_with_version(&self, name: &str, version: &str) -> DependencyResult<()> {
        if !self.check_version_compatibility(name, version)? {
            return Err(DependencyError::new(
                DependencyErrorCode::InvalidVersion,
                format!("version '{version}' is not compatible with declared '{name}'"),
            ));
        }
        self.install(name).await.map(|_| ())
    }

    /// Install several dependencies concurrently; results are returned in
    /// input order.
    pub async fn install_multiple(&self, names: &[String]) -> Vec<DependencyResult<String>> {
        futures::future::join_all(names.iter().map(|name| self.install(name))).await
    }

    /// Uninstall a declared dependency.
    ///
    /// # Errors
    /// `UninstallFailed` when the planned command fails.
    pub async fn uninstall_dependency(&self, name: &str) -> DependencyResult<()> {
        let dep = self.declared(name)?;
        let manager = self
            .registry
            .get_package_manager(&dep.package_manager)
            .ok_or_else(|| DependencyError::no_manager(&dep.package_manager))?;
        let command = manager.uninstall_command(&dep.name);
        let runner = self.runner.clone();
        info!(name, command, "uninstalling dependency");

        let run = tokio::task::spawn_blocking(move || runner.run(&command))
            .await
            .map_err(|e| DependencyError::new(DependencyErrorCode::UnknownError, e.to_string()))?;

        match run {
            Ok(_) => {
                self.installed.lock().put(dep.name, false);
                Ok(())
            }
            Err(e) => Err(DependencyError::new(
                DependencyErrorCode::UninstallFailed,
                format!("uninstall of '{name}' failed: {e}"),
            )),
        }
    }

    /// Cancel a running installation via the registry.
    pub fn cancel_installation(&self, name: &str) {
        self.registry.cancel_installation(name);
    }

    /// Whether the requested version satisfies the declaration: at least the
    /// declared version, and inside the declared min/max constraints.
    ///
    /// # Errors
    /// `DependencyNotFound` when not declared, `InvalidVersion` when the
    /// version string does not parse.
    pub fn check_version_compatibility(&self, name: &str, version: &str) -> DependencyResult<bool> {
        let dep = self.declared(name)?;
        let requested = Version::parse(version).map_err(|e| {
            DependencyError::new(DependencyErrorCode::InvalidVersion, e.to_string())
        })?;

        if requested < dep.version {
            return Ok(false);
        }
        for bound in [
            (!dep.min_version.is_empty()).then(|| format!(">={}", dep.min_version)),
            (!dep.max_version.is_empty()).then(|| format!("<={}", dep.max_version)),
        ]
        .into_iter()
        .flatten()
        {
            let ok = check_version(&requested, &bound, CompareStrategy::Strict).map_err(|e| {
                DependencyError::new(DependencyErrorCode::InvalidVersion, e.to_string())
            })?;
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether a dependency is recorded as installed. Unknown names are
    /// probed through the cache only; use [`DependencyManager::refresh_cache`]
    /// to re-check the system.
    #[must_use]
    pub fn is_dependency_installed(&self, name: &str) -> bool {
        self.installed.lock().get(name).copied().unwrap_or(false)
    }

    /// Re-probe every declared dependency's binary and refill the cache.
    pub fn refresh_cache(&self) {
        let deps = self.deps.read().clone();
        let mut cache = self.installed.lock();
        cache.clear();
        for dep in deps {
            let present = self.runner.binary_exists(&dep.name);
            cache.put(dep.name, present);
        }
    }

    /// All declared dependencies are cached as installed.
    pub async fn verify_dependencies(&self) -> DependencyResult<bool> {
        let deps = self.deps.read().clone();
        let mut cache = self.installed.lock();
        Ok(deps
            .iter()
            .all(|dep| cache.get(&dep.name).copied().unwrap_or(false)))
    }

    /// Export the declared dependencies as JSON.
    ///
    /// # Errors
    /// Serialization failures map to `UnknownError`.
    pub fn export_config(&self) -> DependencyResult<String> {
        serde_json::to_string_pretty(&*self.deps.read())
            .map_err(|e| DependencyError::new(DependencyErrorCode::UnknownError, e.to_string()))
    }

    /// Replace the declared dependencies from exported JSON.
    ///
    /// # Errors
    /// `ConfigLoadFailed` when the JSON does not parse.
    pub fn import_config(&self, config: &str) -> DependencyResult<()> {
        let deps: Vec<PackageDependency> = serde_json::from_str(config).map_err(|e| {
            DependencyError::new(DependencyErrorCode::ConfigLoadFailed, e.to_string())
        })?;
        *self.deps.write() = deps;
        Ok(())
    }

    /// Multi-line human-readable report of the declared dependencies.
    #[must_use]
    pub fn generate_dependency_report(&self) -> String {
        let deps = self.deps.read();
        let mut report = String::from("Declared dependencies:\n");
        for dep in deps.iter() {
            let installed = self.is_dependency_installed(&dep.name);
            let _ = writeln!(
                report,
                "  {} {} via {}{}{}",
                dep.name,
                dep.version,
                dep.package_manager,
                if dep.optional { " (optional)" } else { "" },
                if installed { " [installed]" } else { " [missing]" },
            );
        }
        let _ = writeln!(report, "Total: {}", deps.len());
        report
    }

    /// JSON tree of the declared dependencies with installed flags.
    #[must_use]
    pub fn get_dependency_graph(&self) -> serde_json::Value {
        let deps = self.deps.read().clone();
        let nodes: Vec<serde_json::Value> = deps
            .iter()
            .map(|dep| {
                serde_json::json!({
                    "name": dep.name,
                    "version": dep.version,
                    "package_manager": dep.package_manager,
                    "optional": dep.optional,
                    "installed": self.is_dependency_installed(&dep.name),
                    "deps": dep.deps,
                })
            })
            .collect();
        serde_json::json!({ "dependencies": nodes })
    }

    /// Search the registry for packages matching a name.
    #[must_use]
    pub fn search_dependency(&self, name: &str) -> Vec<String> {
        self.registry.search_dependency(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformDetector;
    use parking_lot::Mutex as PlMutex;
    use std::io;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Runner recording every executed command; commands containing "fail"
    /// return an error.
    #[derive(Default)]
    struct RecordingRunner {
        commands: PlMutex<Vec<String>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, command: &str) -> io::Result<String> {
            self.commands.lock().push(command.to_string());
            if command.contains("fail") {
                Err(io::Error::other("exit status 1"))
            } else {
                Ok(String::new())
            }
        }
        fn binary_exists(&self, name: &str) -> bool {
            name == "apt"
        }
        fn processes_matching(&self, _name: &str) -> Vec<u32> {
            Vec::new()
        }
        fn terminate(&self, _pid: u32, _grace: Duration) {}
    }

    fn dep(name: &str) -> PackageDependency {
        PackageDependency {
            name: name.to_string(),
            version: Version::new(1, 0, 0),
            package_manager: "apt".to_string(),
            deps: Vec::new(),
            optional: false,
            min_version: String::new(),
            max_version: String::new(),
        }
    }

    fn manager(dir: &TempDir) -> (DependencyManager, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::default());
        let registry = Arc::new(PackageManagerRegistry::new(
            PlatformDetector::from_identity("Ubuntu 24.04"),
            runner.clone(),
        ));
        (
            DependencyManager::new(registry, runner.clone(), dir.path()),
            runner,
        )
    }

    #[tokio::test]
    async fn install_runs_planned_command_and_caches() {
        let dir = TempDir::new().unwrap();
        let (manager, runner) = manager(&dir);
        manager.add_dependency(dep("openssl"));

        let installed = manager.install("openssl").await.unwrap();
        assert_eq!(installed, "openssl");
        assert!(manager.is_dependency_installed("openssl"));
        assert!(runner
            .commands
            .lock()
            .contains(&"apt install -y openssl".to_string()));
    }

    #[tokio::test]
    async fn install_unknown_dependency_fails() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let err = manager.install("ghost").await.unwrap_err();
        assert_eq!(err.code, DependencyErrorCode::DependencyNotFound);
    }

    #[tokio::test]
    async fn install_unknown_manager_fails() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let mut bad = dep("tool");
        bad.package_manager = "nix".to_string();
        manager.add_dependency(bad);

        let err = manager.install("tool").await.unwrap_err();
        assert_eq!(err.code, DependencyErrorCode::PackageManagerNotFound);
    }

    #[tokio::test]
    async fn custom_install_command_wins() {
        let dir = TempDir::new().unwrap();
        let (manager, runner) = manager(&dir);
        manager.add_dependency(dep("phd2"));
        manager.set_custom_install_command("phd2", "snap install phd2");

        manager.install("phd2").await.unwrap();
        assert!(runner
            .commands
            .lock()
            .contains(&"snap install phd2".to_string()));
    }

    #[tokio::test]
    async fn failed_install_is_typed() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        manager.add_dependency(dep("failing-package"));

        let err = manager.install("failing-package").await.unwrap_err();
        assert_eq!(err.code, DependencyErrorCode::InstallFailed);
        assert!(!manager.is_dependency_installed("failing-package"));
    }

    #[tokio::test]
    async fn install_multiple_preserves_order() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        manager.add_dependency(dep("a"));
        manager.add_dependency(dep("b"));

        let results = manager
            .install_multiple(&["a".to_string(), "ghost".to_string(), "b".to_string()])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn uninstall_updates_cache() {
        let dir = TempDir::new().unwrap();
        let (manager, runner) = manager(&dir);
        manager.add_dependency(dep("openssl"));
        manager.install("openssl").await.unwrap();

        manager.uninstall_dependency("openssl").await.unwrap();
        assert!(!manager.is_dependency_installed("openssl"));
        assert!(runner
            .commands
            .lock()
            .contains(&"apt remove -y openssl".to_string()));
    }

    #[test]
    fn version_compatibility() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let mut declared = dep("openssl");
        declared.min_version = "1.0.0".to_string();
        declared.max_version = "2.0.0".to_string();
        manager.add_dependency(declared);

        assert!(manager.check_version_compatibility("openssl", "1.5.0").unwrap());
        assert!(!manager.check_version_compatibility("openssl", "0.9.0").unwrap());
        assert!(!manager.check_version_compatibility("openssl", "2.1.0").unwrap());
        assert!(manager.check_version_compatibility("openssl", "bogus").is_err());
    }

    #[tokio::test]
    async fn verify_requires_all_installed() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        manager.add_dependency(dep("a"));
        manager.add_dependency(dep("b"));
        assert!(!manager.verify_dependencies().await.unwrap());

        manager.install("a").await.unwrap();
        manager.install("b").await.unwrap();
        assert!(manager.verify_dependencies().await.unwrap());
    }

    #[test]
    fn config_round_trip() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        manager.add_dependency(dep("openssl"));
        manager.add_dependency(dep("cfitsio"));

        let exported = manager.export_config().unwrap();

        let dir2 = TempDir::new().unwrap();
        let (fresh, _) = self::manager(&dir2);
        fresh.import_config(&exported).unwrap();
        assert_eq!(fresh.dependencies(), manager.dependencies());

        assert_eq!(
            fresh.import_config("not json").unwrap_err().code,
            DependencyErrorCode::ConfigLoadFailed
        );
    }

    #[tokio::test]
    async fn cache_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        {
            let (manager, _) = manager(&dir);
            manager.add_dependency(dep("openssl"));
            manager.install("openssl").await.unwrap();
            manager.save_cache().unwrap();
        }
        let (reloaded, _) = manager(&dir);
        assert!(reloaded.is_dependency_installed("openssl"));
    }

    #[test]
    fn report_and_graph() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let mut optional = dep("astrometry");
        optional.optional = true;
        manager.add_dependency(optional);

        let report = manager.generate_dependency_report();
        assert!(report.contains("astrometry"));
        assert!(report.contains("(optional)"));
        assert!(report.contains("[missing]"));

        let graph = manager.get_dependency_graph();
        let nodes = graph["dependencies"].as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["installed"], false);
    }

    #[test]
    fn refresh_cache_probes_binaries() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        // The fake runner only has "apt" on PATH.
        manager.add_dependency(dep("apt"));
        manager.add_dependency(dep("ghost"));

        manager.refresh_cache();
        assert!(manager.is_dependency_installed("apt"));
        assert!(!manager.is_dependency_installed("ghost"));
    }
}
