//! The component manager: registry, lifecycle, events, hot reload.

use crate::error::{ComponentError, Result};
use crate::events::{EventBus, EventListener};
use crate::loader::{ModuleHandle, ModuleLoader};
use crate::pool::ObjectPool;
use crate::types::{validate_transition, ComponentEvent, ComponentOptions, ComponentState};
use ahash::AHashMap;
use chrono::Utc;
use dashmap::DashMap;
use meridian_core::Version;
use meridian_graph::DependencyGraph;
use meridian_tracker::{ChangeStatus, FileTracker};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extensions recognized as loadable component modules.
const MODULE_EXTENSIONS: [&str; 3] = [".so", ".dll", ".dylib"];

/// Component instance pool bounds.
const POOL_CAPACITY: usize = 100;
const POOL_RESERVE: usize = 10;

/// Reusable per-component runtime slot, recycled through the instance pool.
#[derive(Debug, Default)]
pub struct ComponentInstance {
    /// Operations performed while this instance was live.
    operations: usize,
}

impl ComponentInstance {
    fn record_operation(&mut self) {
        self.operations += 1;
    }

    fn reset(&mut self) {
        self.operations = 0;
    }
}

/// A dependency declared at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDecl {
    /// Dependency component name.
    pub name: String,
    /// Required version; `None` means any registered version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for [`ComponentManager::load_component`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadParams {
    /// Component name; unique in the registry.
    pub name: String,
    /// Path to the component's module.
    pub path: PathBuf,
    /// Component version; defaults to `1.0.0`.
    #[serde(default)]
    pub version: Option<String>,
    /// Components this one depends on.
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    /// Options; defaults apply when omitted.
    #[serde(default)]
    pub options: Option<ComponentOptions>,
}

impl LoadParams {
    /// Minimal parameters: name and module path.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: None,
            dependencies: Vec::new(),
            options: None,
        }
    }

    /// Parse parameters from their JSON form.
    ///
    /// # Errors
    /// [`ComponentError::InvalidParams`] when required fields are missing or
    /// malformed.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| ComponentError::InvalidParams(e.to_string()))
    }
}

/// A registered component. Owned exclusively by the manager; external
/// observers hold [`Weak`] references that expire on unload.
pub struct ComponentCell {
    name: String,
    path: PathBuf,
    version: Version,
    handle: Mutex<Option<ModuleHandle>>,
    instance: Mutex<Option<ComponentInstance>>,
    state: RwLock<ComponentState>,
    options: RwLock<ComponentOptions>,
    last_error: RwLock<Option<String>>,
    error_count: AtomicUsize,
}

impl std::fmt::Debug for ComponentCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCell")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl ComponentCell {
    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Component version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ComponentState {
        *self.state.read()
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> ComponentOptions {
        self.options.read().clone()
    }

    /// Last recorded error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Errors recorded against this component.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }
}

struct ManagerInner {
    loader: Arc<dyn ModuleLoader>,
    graph: DependencyGraph,
    registry: DashMap<String, Arc<ComponentCell>>,
    events: EventBus,
    pool: ObjectPool<ComponentInstance>,
    groups: RwLock<AHashMap<String, Vec<String>>>,
    load_params: RwLock<AHashMap<String, LoadParams>>,
    config_watcher: Mutex<Option<FileTracker>>,
    monitoring: AtomicBool,
    last_error: RwLock<Option<String>>,
    error_count: AtomicUsize,
    operation_count: AtomicUsize,
}

/// Manages the lifecycle and dependencies of loadable components.
///
/// Cloning is cheap and shares the underlying state.
#[derive(Clone)]
pub struct ComponentManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.inner.registry.len())
            .field(
                "operations",
                &self.inner.operation_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl ComponentManager {
    /// Create a manager around a module loader.
    #[must_use]
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                loader,
                graph: DependencyGraph::new(),
                registry: DashMap::new(),
                events: EventBus::new(),
                pool: ObjectPool::new(POOL_CAPACITY, POOL_RESERVE, ComponentInstance::default),
                groups: RwLock::new(AHashMap::new()),
                load_params: RwLock::new(AHashMap::new()),
                config_watcher: Mutex::new(None),
                monitoring: AtomicBool::new(true),
                last_error: RwLock::new(None),
                error_count: AtomicUsize::new(0),
                operation_count: AtomicUsize::new(0),
            }),
        }
    }

    /// The dependency graph backing the registry.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.inner.graph
    }

    fn cell(&self, name: &str) -> Result<Arc<ComponentCell>> {
        self.inner
            .registry
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ComponentError::NotFound {
                name: name.to_string(),
            })
    }

    fn emit(&self, component: &str, event: ComponentEvent, data: serde_json::Value) {
        self.inner.events.emit(component, event, &data);
    }

    /// Force the component into `Error`, record the failure, and emit an
    /// `Error` event carrying the operation, message and timestamp.
    fn handle_error(&self, name: &str, operation: &str, error: &ComponentError) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_error.write() = Some(error.to_string());

        if let Some(cell) = self.inner.registry.get(name) {
            cell.error_count.fetch_add(1, Ordering::Relaxed);
            *cell.last_error.write() = Some(error.to_string());
            // A disabled component stays disabled; rejected operations must
            // not replace that state.
            let mut state = cell.state.write();
            if *state != ComponentState::Disabled {
                *state = ComponentState::Error;
            }
        }

        warn!(component = name, operation, error = %error, "component operation failed");
        self.emit(
            name,
            ComponentEvent::Error,
            serde_json::json!({
                "operation": operation,
                "error": error.to_string(),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );
    }

    async fn bounded<T, F>(&self, name: &str, operation: &str, millis: u64, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let budget = Duration::from_millis(millis);
        match tokio::time::timeout(budget, tokio::task::spawn_blocking(task)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ComponentError::TaskFailed(join.to_string())),
            Err(_) => Err(ComponentError::Timeout {
                name: name.to_string(),
                operation: operation.to_string(),
                millis,
            }),
        }
    }

    /// Load a component: register it in the dependency graph, load its
    /// module, draw an instance from the pool and enter `Created`.
    ///
    /// Bounded by the component's `timeout_ms`; expiry forces `Error` and
    /// fails with [`ComponentError::Timeout`].
    ///
    /// # Errors
    /// Duplicate names, unresolvable dependencies, loader failures and pool
    /// exhaustion all fail the load; the graph is rolled back.
    pub async fn load_component(&self, params: LoadParams) -> Result<()> {
        let name = params.name.clone();
        let millis = params
            .options
            .as_ref()
            .map_or_else(|| ComponentOptions::default().timeout_ms, |o| o.timeout_ms);
        let manager = self.clone();
        let result = self
            .bounded(&name, "load", millis, move || {
                manager.load_component_blocking(params)
            })
            .await;
        if let Err(ref error) = result {
            // A duplicate name must not force the existing record into Error.
            if matches!(error, ComponentError::AlreadyLoaded { .. }) {
                self.inner.error_count.fetch_add(1, Ordering::Relaxed);
                *self.inner.last_error.write() = Some(error.to_string());
                warn!(component = %name, error = %error, "load rejected");
            } else {
                self.handle_error(&name, "load", error);
            }
        }
        result
    }

    /// Synchronous load path; also used by hot reload.
    ///
    /// # Errors
    /// See [`ComponentManager::load_component`].
    pub fn load_component_blocking(&self, params: LoadParams) -> Result<()> {
        let name = params.name.clone();
        debug!(component = %name, path = %params.path.display(), "loading component");
        self.inner.operation_count.fetch_add(1, Ordering::Relaxed);
        self.emit(&name, ComponentEvent::PreLoad, serde_json::Value::Null);

        if self.inner.registry.contains_key(&name) {
            return Err(ComponentError::AlreadyLoaded { name });
        }

        let version = match &params.version {
            Some(raw) => Version::parse(raw)?,
            None => Version::new(1, 0, 0),
        };

        self.inner.graph.add_node(&name, version.clone());
        for dep in &params.dependencies {
            let required = match &dep.version {
                Some(raw) => Version::parse(raw)?,
                None => Version::default(),
            };
            if let Err(e) = self.inner.graph.add_dependency(&name, &dep.name, required) {
                self.inner.graph.remove_node(&name);
                return Err(e.into());
            }
        }

        let handle = match self.inner.loader.load(&params.path, &name) {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.graph.remove_node(&name);
                return Err(e);
            }
        };

        let Some(instance) = self.inner.pool.acquire() else {
            let _ = self.inner.loader.unload(&name);
            self.inner.graph.remove_node(&name);
            return Err(ComponentError::PoolExhausted);
        };

        let options = params.options.clone().unwrap_or_default();
        let cell = Arc::new(ComponentCell {
            name: name.clone(),
            path: params.path.clone(),
            version,
            handle: Mutex::new(Some(handle)),
            instance: Mutex::new(Some(instance)),
            state: RwLock::new(ComponentState::Created),
            options: RwLock::new(options.clone()),
            last_error: RwLock::new(None),
            error_count: AtomicUsize::new(0),
        });
        self.inner.registry.insert(name.clone(), cell);
        if !options.group.is_empty() {
            self.add_to_group(&name, &options.group);
        }
        self.inner
            .load_params
            .write()
            .insert(name.clone(), params.clone());

        if !params.dependencies.is_empty() {
            let deps: Vec<&str> = params.dependencies.iter().map(|d| d.name.as_str()).collect();
            self.emit(
                &name,
                ComponentEvent::DependencyResolved,
                serde_json::json!({ "dependencies": deps }),
            );
        }
        self.emit(&name, ComponentEvent::PostLoad, serde_json::Value::Null);
        info!(component = %name, "component loaded");
        Ok(())
    }

    /// Unload a component: release its module, instance and graph node, and
    /// evict it from the registry. Weak handles expire.
    ///
    /// # Errors
    /// [`ComponentError::NotFound`] when the name is not registered,
    /// [`ComponentError::Disabled`] when the component is disabled; it must
    /// be re-enabled before unloading.
    pub fn unload_component(&self, name: &str) -> Result<()> {
        let cell = self.cell(name)?;
        if cell.state() == ComponentState::Disabled {
            return Err(ComponentError::Disabled {
                name: name.to_string(),
            });
        }
        debug!(component = name, "unloading component");
        self.inner.operation_count.fetch_add(1, Ordering::Relaxed);
        self.emit(name, ComponentEvent::PreUnload, serde_json::Value::Null);
        *cell.state.write() = ComponentState::Unloading;

        if let Err(e) = self.inner.loader.unload(name) {
            warn!(component = name, error = %e, "module unload failed");
        }
        self.inner.graph.remove_node(name);

        if let Some(mut instance) = cell.instance.lock().take() {
            instance.reset();
            self.inner.pool.release(instance);
        }
        cell.handle.lock().take();
        self.inner.registry.remove(name);

        self.emit(name, ComponentEvent::PostUnload, serde_json::Value::Null);
        info!(component = name, "component unloaded");
        Ok(())
    }

    /// A weak reference to a component; `None` when absent. The reference
    /// expires once the component is unloaded.
    #[must_use]
    pub fn get_component(&self, name: &str) -> Option<Weak<ComponentCell>> {
        self.inner
            .registry
            .get(name)
            .map(|entry| Arc::downgrade(entry.value()))
    }

    /// JSON description of a component: name, integer state code and config.
    #[must_use]
    pub fn get_component_info(&self, name: &str) -> Option<serde_json::Value> {
        let cell = self.inner.registry.get(name)?;
        Some(serde_json::json!({
            "name": cell.name(),
            "state": cell.state().code(),
            "config": cell.options.read().config.clone(),
        }))
    }

    /// Names of every registered component.
    #[must_use]
    pub fn get_component_list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .registry
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Current state of a component.
    #[must_use]
    pub fn get_component_state(&self, name: &str) -> Option<ComponentState> {
        self.inner.registry.get(name).map(|cell| cell.state())
    }

    /// Whether a component is registered.
    #[must_use]
    pub fn has_component(&self, name: &str) -> bool {
        self.inner.registry.contains_key(name)
    }

    /// A component's documentation: the `doc` field of its config when
    /// present, otherwise a short synthesized summary. Empty for unknown
    /// components.
    #[must_use]
    pub fn get_component_doc(&self, name: &str) -> String {
        let Some(cell) = self.inner.registry.get(name) else {
            return String::new();
        };
        let options = cell.options.read();
        options
            .config
            .get("doc")
            .and_then(|d| d.as_str())
            .map_or_else(
                || format!("{} {}", cell.name(), cell.version()),
                str::to_string,
            )
    }

    /// Render and log the dependency tree, one `name -> [deps]` line per
    /// component.
    #[must_use]
    pub fn print_dependency_tree(&self) -> String {
        let mut lines = Vec::new();
        for name in self.get_component_list() {
            let deps = self.inner.graph.get_dependencies(&name);
            lines.push(format!("{name} -> [{}]", deps.join(", ")));
        }
        let tree = lines.join("\n");
        info!(tree = %tree, "dependency tree");
        tree
    }

    fn transition(&self, name: &str, to: ComponentState) -> Result<()> {
        let cell = self.cell(name)?;
        self.inner.operation_count.fetch_add(1, Ordering::Relaxed);
        let from = cell.state();
        if from == ComponentState::Disabled && to != ComponentState::Created {
            return Err(ComponentError::Disabled {
                name: name.to_string(),
            });
        }
        validate_transition(from, to)?;
        *cell.state.write() = to;
        if let Some(instance) = cell.instance.lock().as_mut() {
            instance.record_operation();
        }
        debug!(component = name, %from, %to, "state transition");
        self.emit(
            name,
            ComponentEvent::StateChanged,
            serde_json::json!({ "from": from.code(), "to": to.code() }),
        );
        Ok(())
    }

    fn transition_or_error(&self, name: &str, operation: &str, to: ComponentState) -> Result<()> {
        let result = self.transition(name, to);
        if let Err(ref error) = result {
            self.handle_error(name, operation, error);
        }
        result
    }

    /// Move a freshly loaded component from `Created` to `Initialized`.
    ///
    /// # Errors
    /// Fails on unknown names and invalid transitions.
    pub fn initialize_component(&self, name: &str) -> Result<()> {
        self.transition_or_error(name, "initialize", ComponentState::Initialized)
    }

    fn start_blocking(&self, name: &str) -> Result<()> {
        // A freshly created component is initialized on the way to Running.
        if self.cell(name)?.state() == ComponentState::Created {
            self.transition(name, ComponentState::Initialized)?;
        }
        self.transition(name, ComponentState::Running)
    }

    /// Start a component, bounded by its `timeout_ms`. A component still in
    /// `Created` is initialized first.
    ///
    /// # Errors
    /// Fails on unknown names, invalid transitions, and timeout expiry.
    pub async fn start_component(&self, name: &str) -> Result<()> {
        let millis = match self.cell(name) {
            Ok(cell) => cell.options.read().timeout_ms,
            Err(e) => {
                self.handle_error(name, "start", &e);
                return Err(e);
            }
        };
        let manager = self.clone();
        let owned = name.to_string();
        let result = self
            .bounded(name, "start", millis, move || {
                manager.start_blocking(&owned)
            })
            .await;
        if let Err(ref error) = result {
            self.handle_error(name, "start", error);
        }
        result
    }

    /// Stop a running or paused component.
    ///
    /// # Errors
    /// Fails on unknown names and invalid transitions.
    pub fn stop_component(&self, name: &str) -> Result<()> {
        self.transition_or_error(name, "stop", ComponentState::Stopped)
    }

    /// Pause a running component.
    ///
    /// # Errors
    /// Fails on unknown names and invalid transitions.
    pub fn pause_component(&self, name: &str) -> Result<()> {
        self.transition_or_error(name, "pause", ComponentState::Paused)
    }

    /// Resume a paused component. Resuming a running component re-enters
    /// `Running`.
    ///
    /// # Errors
    /// Fails on unknown names and invalid transitions.
    pub fn resume_component(&self, name: &str) -> Result<()> {
        self.transition_or_error(name, "resume", ComponentState::Running)
    }

    /// Disable a component; every other transition is blocked until
    /// [`ComponentManager::enable_component`].
    ///
    /// # Errors
    /// Fails on unknown names.
    pub fn disable_component(&self, name: &str) -> Result<()> {
        self.transition_or_error(name, "disable", ComponentState::Disabled)
    }

    /// Re-enable a disabled component, returning it to `Created`.
    ///
    /// # Errors
    /// Fails on unknown names and when the component is not disabled.
    pub fn enable_component(&self, name: &str) -> Result<()> {
        self.transition_or_error(name, "enable", ComponentState::Created)
    }

    /// Register an event listener.
    pub fn add_event_listener(&self, event: ComponentEvent, listener: EventListener) {
        self.inner.events.add_listener(event, listener);
    }

    /// Remove every listener for an event.
    pub fn remove_event_listener(&self, event: ComponentEvent) {
        self.inner.events.remove_listeners(event);
    }

    fn stored_params(&self, name: &str) -> LoadParams {
        self.inner
            .load_params
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| {
                LoadParams::new(name, PathBuf::from(format!("./components/{name}.so")))
            })
    }

    /// Load several components concurrently, highest priority first.
    /// Returns whether every load succeeded; individual failures are
    /// recorded per component.
    pub async fn batch_load(&self, names: &[String]) -> bool {
        let mut ordered: Vec<String> = names.to_vec();
        ordered.sort_by_key(|name| {
            let priority = self
                .inner
                .registry
                .get(name)
                .map(|cell| cell.options.read().priority)
                .or_else(|| {
                    self.inner
                        .load_params
                        .read()
                        .get(name)
                        .and_then(|p| p.options.as_ref().map(|o| o.priority))
                })
                .unwrap_or(0);
            std::cmp::Reverse(priority)
        });

        let mut tasks = tokio::task::JoinSet::new();
        for name in ordered {
            let manager = self.clone();
            let params = self.stored_params(&name);
            tasks.spawn(async move { manager.load_component(params).await });
        }

        let mut success = true;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "batch load item failed");
                    success = false;
                }
                Err(e) => {
                    warn!(error = %e, "batch load task died");
                    success = false;
                }
            }
        }
        info!(success, "batch load completed");
        success
    }

    /// Unload several components sequentially. Returns whether every unload
    /// succeeded.
    pub fn batch_unload(&self, names: &[String]) -> bool {
        let mut success = true;
        for name in names {
            if let Err(e) = self.unload_component(name) {
                warn!(component = %name, error = %e, "batch unload item failed");
                success = false;
            }
        }
        success
    }

    /// Replace a component's configuration and emit `ConfigChanged` with the
    /// new blob.
    ///
    /// # Errors
    /// [`ComponentError::NotFound`] when the name is not registered.
    pub fn update_config(&self, name: &str, config: serde_json::Value) -> Result<()> {
        let cell = self.cell(name)?;
        cell.options.write().config = config.clone();
        debug!(component = name, "config updated");
        self.emit(name, ComponentEvent::ConfigChanged, config);
        Ok(())
    }

    /// A component's current configuration.
    #[must_use]
    pub fn get_config(&self, name: &str) -> Option<serde_json::Value> {
        self.inner
            .registry
            .get(name)
            .map(|cell| cell.options.read().config.clone())
    }

    /// Add a component to a named group. Idempotent.
    pub fn add_to_group(&self, name: &str, group: &str) {
        let mut groups = self.inner.groups.write();
        let members = groups.entry(group.to_string()).or_default();
        if !members.iter().any(|m| m == name) {
            members.push(name.to_string());
        }
    }

    /// Members of a named group.
    #[must_use]
    pub fn get_group_components(&self, group: &str) -> Vec<String> {
        self.inner
            .groups
            .read()
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Per-component `{state, error_count}` snapshot; empty when monitoring
    /// is disabled.
    #[must_use]
    pub fn get_performance_metrics(&self) -> serde_json::Value {
        if !self.inner.monitoring.load(Ordering::Relaxed) {
            return serde_json::json!({});
        }
        let mut metrics = serde_json::Map::new();
        for entry in self.inner.registry.iter() {
            let cell = entry.value();
            metrics.insert(
                cell.name().to_string(),
                serde_json::json!({
                    "state": cell.state().code(),
                    "error_count": cell.error_count(),
                }),
            );
        }
        serde_json::Value::Object(metrics)
    }

    /// Toggle performance monitoring.
    pub fn enable_performance_monitoring(&self, enable: bool) {
        self.inner.monitoring.store(enable, Ordering::Relaxed);
    }

    /// The most recent error recorded by any operation.
    #[must_use]
    pub fn get_last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    /// Clear recorded errors.
    pub fn clear_errors(&self) {
        *self.inner.last_error.write() = None;
        self.inner.error_count.store(0, Ordering::Relaxed);
    }

    /// Errors recorded since the last [`ComponentManager::clear_errors`].
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.inner.error_count.load(Ordering::Relaxed)
    }

    /// Scan a directory for component modules, returning paths that are new
    /// since the previous scan (candidates for loading).
    ///
    /// # Errors
    /// Propagates tracker failures.
    pub fn scan_components(&self, path: &Path) -> Result<Vec<String>> {
        let tracker = FileTracker::new(
            path,
            path.join(".component-scan.json"),
            &MODULE_EXTENSIONS,
            false,
        );
        tracker.scan()?;
        tracker.compare();

        let new_files: Vec<String> = tracker
            .differences()
            .into_iter()
            .filter(|(_, change)| change.status == ChangeStatus::New)
            .map(|(path, _)| path)
            .collect();
        info!(count = new_files.len(), "found new component files");
        Ok(new_files)
    }

    /// React to a watched file change: a modified module or config file
    /// triggers an unload followed by a reload with the retained parameters.
    fn handle_file_change(&self, path: &Path, change: &str) {
        if change != "modified" {
            return;
        }
        info!(path = %path.display(), change, "file change detected");

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = if self.has_component(&stem) {
            stem
        } else if path.extension().is_some_and(|e| e == "json") {
            // Config files name their component in a `name` field.
            match std::fs::read_to_string(path)
                .ok()
                .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
                .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
            {
                Some(name) => name,
                None => return,
            }
        } else {
            return;
        };

        if !self.has_component(&name) {
            return;
        }
        info!(component = %name, "hot-reloading component");
        let params = self.stored_params(&name);
        if let Err(e) = self.unload_component(&name) {
            self.handle_error(&name, "hot-reload", &e);
            return;
        }
        if let Err(e) = self.load_component_blocking(params) {
            self.handle_error(&name, "hot-reload", &e);
        }
    }

    /// Watch a directory of component configs and modules; modifications
    /// trigger hot reload of the owning component.
    ///
    /// # Errors
    /// Propagates tracker construction failures.
    pub fn watch_config_dir(&self, dir: &Path) -> Result<()> {
        let tracker = FileTracker::new(
            dir,
            dir.join(".config-watch.json"),
            &[".json", ".so", ".dll", ".dylib"],
            false,
        );
        tracker.enable_cache(true);

        let weak = Arc::downgrade(&self.inner);
        tracker.set_change_callback(Arc::new(move |path, change| {
            if let Some(inner) = weak.upgrade() {
                ComponentManager { inner }.handle_file_change(path, change);
            }
        }));
        tracker.start_watching();
        *self.inner.config_watcher.lock() = Some(tracker);
        Ok(())
    }

    /// Stop the config watcher, if one is running.
    pub fn stop_watching(&self) {
        if let Some(tracker) = self.inner.config_watcher.lock().take() {
            tracker.stop_watching();
        }
    }

    /// Stop watching and unload every component.
    pub fn shutdown(&self) {
        info!("shutting down component manager");
        self.stop_watching();
        for name in self.get_component_list() {
            if let Err(e) = self.unload_component(&name) {
                warn!(component = %name, error = %e, "forced unload failed");
            }
        }
    }
}
