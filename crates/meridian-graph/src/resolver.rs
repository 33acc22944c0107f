//! Directory resolution: manifests to load order.

use crate::error::{GraphError, Result};
use crate::graph::DependencyGraph;
use crate::manifest::Manifest;
use ahash::{AHashMap, AHashSet};
use meridian_core::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tuning knobs for batched parallel resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Directories per concurrent batch.
    pub batch_size: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { batch_size: 4 }
    }
}

/// Resolve a single directory's manifest into a dependency-ordered list.
///
/// Builds a scratch graph from the manifest (root node plus one node and
/// edge per component dependency), rejects cycles, and returns the
/// topological order with duplicates removed (first occurrence wins).
fn resolve_directory(dir: &Path) -> Result<Vec<String>> {
    let graph = DependencyGraph::new();

    let Some(manifest) = Manifest::from_dir(dir)? else {
        warn!(dir = %dir.display(), "no manifest found in directory");
        return Ok(Vec::new());
    };

    graph.add_node(&manifest.name, Version::default());
    for (dep, version) in manifest.component_deps() {
        if dep == &manifest.name {
            continue;
        }
        graph.add_node(dep, version.clone());
        graph.add_dependency(&manifest.name, dep, version.clone())?;
    }

    if graph.has_cycle() {
        return Err(GraphError::CycleDetected);
    }
    graph
        .topological_sort()
        .ok_or(GraphError::CycleDetected)
}

fn dedup_preserving_order(input: Vec<String>) -> Vec<String> {
    let mut seen = AHashSet::new();
    input
        .into_iter()
        .filter(|node| seen.insert(node.clone()))
        .collect()
}

impl DependencyGraph {
    /// Resolve the manifests of every directory into one deduplicated,
    /// dependency-ordered list.
    ///
    /// Each directory is tried for `package.json`, `package.xml` and
    /// `package.yaml` in that order; directories without a manifest are
    /// skipped with a warning.
    ///
    /// # Errors
    /// Propagates manifest failures; a cyclic dependency set yields
    /// [`GraphError::CycleDetected`].
    pub fn resolve_dependencies(&self, directories: &[PathBuf]) -> Result<Vec<String>> {
        info!(count = directories.len(), "resolving dependencies");
        let mut combined = Vec::new();
        for dir in directories {
            combined.extend(resolve_directory(dir)?);
        }
        let result = dedup_preserving_order(combined);
        info!(packages = result.len(), "dependencies resolved");
        Ok(result)
    }

    /// Resolve directories concurrently in fixed-size batches, consulting the
    /// shared resolution cache so repeated directories are not re-parsed.
    ///
    /// # Errors
    /// Propagates the first batch failure.
    pub async fn resolve_parallel_dependencies(
        &self,
        directories: &[PathBuf],
        options: &ResolveOptions,
    ) -> Result<Vec<String>> {
        let batch_size = options.batch_size.max(1);
        let mut handles = Vec::new();

        for batch in directories.chunks(batch_size) {
            let batch: Vec<PathBuf> = batch.to_vec();
            let cache = self.resolve_cache.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let mut batch_result = Vec::new();
                for dir in batch {
                    let key = dir.display().to_string();
                    let cached = cache.lock().get(&key).cloned();
                    if let Some(hit) = cached {
                        debug!(dir = %key, "resolve cache hit");
                        batch_result.extend(hit);
                        continue;
                    }
                    let resolved = resolve_directory(&dir)?;
                    cache.lock().insert(key, resolved.clone());
                    batch_result.extend(resolved);
                }
                Ok::<_, GraphError>(batch_result)
            }));
        }

        let mut combined = Vec::new();
        for handle in handles {
            let batch_result = handle
                .await
                .map_err(|e| GraphError::TaskFailed(e.to_string()))??;
            combined.extend(batch_result);
        }
        Ok(dedup_preserving_order(combined))
    }

    /// Collect every `system:`-prefixed dependency across the directories.
    ///
    /// Returns bare names mapped to the maximum required version seen.
    ///
    /// # Errors
    /// Propagates manifest failures.
    pub fn resolve_system_dependencies(
        &self,
        directories: &[PathBuf],
    ) -> Result<AHashMap<String, Version>> {
        let mut system_deps: AHashMap<String, Version> = AHashMap::new();
        for dir in directories {
            let Some(manifest) = Manifest::from_dir(dir)? else {
                warn!(dir = %dir.display(), "no manifest found in directory");
                continue;
            };
            for (bare, version) in manifest.system_deps() {
                match system_deps.get_mut(bare) {
                    Some(existing) if &*existing < version => {
                        debug!(dep = bare, %version, "updating system dependency");
                        *existing = version.clone();
                    }
                    Some(_) => {}
                    None => {
                        debug!(dep = bare, %version, "adding system dependency");
                        system_deps.insert(bare.to_string(), version.clone());
                    }
                }
            }
        }
        info!(count = system_deps.len(), "system dependencies resolved");
        Ok(system_deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, content: &str) {
        fs::write(dir.join("package.json"), content).unwrap();
    }

    #[test]
    fn resolve_orders_dependencies_first_seen() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        fs::create_dir(&a).unwrap();
        write_manifest(
            &a,
            r#"{"name": "alpha", "dependencies": {"common": "0.0.0"}}"#,
        );

        let b = tmp.path().join("b");
        fs::create_dir(&b).unwrap();
        write_manifest(
            &b,
            r#"{"name": "beta", "dependencies": {"common": "0.0.0"}}"#,
        );

        let graph = DependencyGraph::new();
        let order = graph
            .resolve_dependencies(&[a, b])
            .unwrap();

        // "common" appears once, and before neither root it serves.
        assert_eq!(order.iter().filter(|n| n.as_str() == "common").count(), 1);
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("alpha") < pos("common"));
    }

    #[test]
    fn resolve_skips_directories_without_manifest() {
        let tmp = TempDir::new().unwrap();
        let graph = DependencyGraph::new();
        let order = graph
            .resolve_dependencies(&[tmp.path().to_path_buf()])
            .unwrap();
        assert!(order.is_empty());
    }

    #[test]
    fn resolve_propagates_manifest_errors() {
        let tmp = TempDir::new().unwrap();
        write_manifest(tmp.path(), "{ not json");
        let graph = DependencyGraph::new();
        let err = graph
            .resolve_dependencies(&[tmp.path().to_path_buf()])
            .unwrap_err();
        assert!(matches!(err, GraphError::Manifest { .. }));
    }

    #[test]
    fn resolve_skips_system_deps_in_component_order() {
        let tmp = TempDir::new().unwrap();
        write_manifest(
            tmp.path(),
            r#"{"name": "cam", "dependencies": {"system:libusb": "1.0.0", "core": "1.0.0"}}"#,
        );
        let graph = DependencyGraph::new();
        let order = graph
            .resolve_dependencies(&[tmp.path().to_path_buf()])
            .unwrap();
        assert!(order.iter().any(|n| n == "core"));
        assert!(!order.iter().any(|n| n.contains("libusb")));
    }

    #[test]
    fn system_dependency_max_version_wins() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        fs::create_dir(&a).unwrap();
        write_manifest(
            &a,
            r#"{"name": "a", "dependencies": {"system:openssl": "1.1.0"}}"#,
        );
        let b = tmp.path().join("b");
        fs::create_dir(&b).unwrap();
        write_manifest(
            &b,
            r#"{"name": "b", "dependencies": {"system:openssl": "3.0.0"}}"#,
        );

        let graph = DependencyGraph::new();
        let deps = graph.resolve_system_dependencies(&[a, b]).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps["openssl"], Version::parse("3.0.0").unwrap());
    }

    #[tokio::test]
    async fn parallel_resolve_matches_serial_and_caches() {
        let tmp = TempDir::new().unwrap();
        let mut dirs = Vec::new();
        for i in 0..6 {
            let dir = tmp.path().join(format!("pkg{i}"));
            fs::create_dir(&dir).unwrap();
            write_manifest(
                &dir,
                &format!(r#"{{"name": "pkg{i}", "dependencies": {{"runtime": "0.0.0"}}}}"#),
            );
            dirs.push(dir);
        }
        // Repeat a directory so the cache is exercised.
        dirs.push(dirs[0].clone());

        let graph = DependencyGraph::new();
        let serial = graph.resolve_dependencies(&dirs).unwrap();
        let parallel = graph
            .resolve_parallel_dependencies(&dirs, &ResolveOptions::default())
            .await
            .unwrap();

        let serial_set: AHashSet<_> = serial.iter().collect();
        let parallel_set: AHashSet<_> = parallel.iter().collect();
        assert_eq!(serial_set, parallel_set);
        assert!(!graph.resolve_cache.lock().is_empty());

        graph.clear_cache();
        assert!(graph.resolve_cache.lock().is_empty());
    }
}
