//! Package-manager registry: command templates, probing, search parsing.

use crate::error::{DependencyError, DependencyErrorCode, DependencyResult};
use crate::platform::PlatformDetector;
use crate::runner::CommandRunner;
use ahash::AHashSet;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grace period between asking a package-manager process to stop and
/// force-killing it.
const CANCEL_GRACE: Duration = Duration::from_millis(500);

/// A package manager's identity and command templates.
///
/// Install/uninstall/search templates carry one `{}` placeholder replaced
/// with the dependency name at command-build time; the builders are pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManagerInfo {
    /// Manager name, e.g. `apt`.
    pub name: String,
    /// Command proving the manager is usable.
    pub check_cmd: String,
    /// Install command template.
    pub install_cmd: String,
    /// Uninstall command template.
    pub uninstall_cmd: String,
    /// Search command template.
    pub search_cmd: String,
}

fn substitute(template: &str, name: &str) -> String {
    template.replacen("{}", name, 1)
}

impl PackageManagerInfo {
    fn builtin(name: &str, install: &str, uninstall: &str, search: &str) -> Self {
        Self {
            name: name.to_string(),
            check_cmd: format!("{name} --version"),
            install_cmd: install.to_string(),
            uninstall_cmd: uninstall.to_string(),
            search_cmd: search.to_string(),
        }
    }

    /// The availability-check command.
    #[must_use]
    pub fn check_command(&self) -> &str {
        &self.check_cmd
    }

    /// Build the install command for a dependency name.
    #[must_use]
    pub fn install_command(&self, dep_name: &str) -> String {
        substitute(&self.install_cmd, dep_name)
    }

    /// Build the uninstall command for a dependency name.
    #[must_use]
    pub fn uninstall_command(&self, dep_name: &str) -> String {
        substitute(&self.uninstall_cmd, dep_name)
    }

    /// Build the search command for a dependency name.
    #[must_use]
    pub fn search_command(&self, dep_name: &str) -> String {
        substitute(&self.search_cmd, dep_name)
    }
}

/// Every known package manager with its stock command templates.
static BUILTIN_MANAGERS: Lazy<Vec<PackageManagerInfo>> = Lazy::new(|| {
    vec![
        PackageManagerInfo::builtin("apt", "apt install -y {}", "apt remove -y {}", "apt search {}"),
        PackageManagerInfo::builtin("dnf", "dnf install -y {}", "dnf remove -y {}", "dnf search {}"),
        PackageManagerInfo::builtin(
            "pacman",
            "pacman -S --noconfirm {}",
            "pacman -R --noconfirm {}",
            "pacman -Ss {}",
        ),
        PackageManagerInfo::builtin(
            "zypper",
            "zypper install -y {}",
            "zypper remove -y {}",
            "zypper search {}",
        ),
        PackageManagerInfo::builtin("yum", "yum install -y {}", "yum remove -y {}", "yum search {}"),
        PackageManagerInfo::builtin("brew", "brew install {}", "brew uninstall {}", "brew search {}"),
        PackageManagerInfo::builtin("port", "port install {}", "port uninstall {}", "port search {}"),
        PackageManagerInfo::builtin(
            "choco",
            "choco install -y {}",
            "choco uninstall -y {}",
            "choco search {}",
        ),
        PackageManagerInfo::builtin("scoop", "scoop install {}", "scoop uninstall {}", "scoop search {}"),
        PackageManagerInfo::builtin(
            "winget",
            "winget install --id {} --silent",
            "winget uninstall --id {}",
            "winget search {}",
        ),
    ]
});

/// The platform's candidate managers, drawn from the built-in table.
fn builtin_candidates(detector: &PlatformDetector) -> Vec<PackageManagerInfo> {
    let supported = detector.supported_managers();
    BUILTIN_MANAGERS
        .iter()
        .filter(|pm| supported.contains(&pm.name.as_str()))
        .cloned()
        .collect()
}

/// Process names to look for when cancelling a manager's installation.
fn process_names(manager: &str) -> &'static [&'static str] {
    match manager {
        "apt" => &["apt", "apt-get", "dpkg"],
        "dnf" => &["dnf", "yum"],
        "pacman" => &["pacman"],
        "zypper" => &["zypper"],
        "yum" => &["yum"],
        "brew" => &["brew"],
        "port" => &["port"],
        "choco" => &["choco", "chocolatey"],
        "scoop" => &["scoop"],
        "winget" => &["winget"],
        _ => &[],
    }
}

#[derive(Debug, Deserialize)]
struct RegistryConfig {
    package_managers: Vec<ConfiguredManager>,
}

#[derive(Debug, Deserialize)]
struct ConfiguredManager {
    name: String,
    #[serde(default)]
    check_cmd: String,
    #[serde(default)]
    install_cmd: String,
    #[serde(default)]
    uninstall_cmd: String,
    #[serde(default)]
    search_cmd: String,
}

/// Registry of the package managers available on this host.
pub struct PackageManagerRegistry {
    detector: PlatformDetector,
    runner: Arc<dyn CommandRunner>,
    managers: RwLock<Vec<PackageManagerInfo>>,
}

impl std::fmt::Debug for PackageManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManagerRegistry")
            .field("platform", &self.detector.platform())
            .field("managers", &self.managers.read().len())
            .finish()
    }
}

impl PackageManagerRegistry {
    /// Create a registry for the detected platform: probe the built-in
    /// candidates, then overlay the first package-manager config file found
    /// in the conventional locations.
    #[must_use]
    pub fn new(detector: PlatformDetector, runner: Arc<dyn CommandRunner>) -> Self {
        let registry = Self {
            detector,
            runner,
            managers: RwLock::new(Vec::new()),
        };
        registry.load_system_package_managers();
        for path in registry.config_paths() {
            if path.exists() {
                if let Err(e) = registry.load_package_manager_config(&path) {
                    warn!(path = %path.display(), error = %e, "package manager config rejected");
                }
                break;
            }
        }
        registry
    }

    /// Probe the platform's candidate managers; survivors are registered.
    pub fn load_system_package_managers(&self) {
        info!(platform = self.detector.platform(), "probing package managers");
        let mut found = Vec::new();
        for candidate in builtin_candidates(&self.detector) {
            if self.runner.binary_exists(&candidate.name) {
                info!(manager = %candidate.name, "found package manager");
                found.push(candidate);
            }
        }
        info!(count = found.len(), "package managers loaded");
        *self.managers.write() = found;
    }

    /// Conventional config lookup locations, most specific first.
    fn config_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./package_managers.json")];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(home).join(".meridian/package_managers.json"));
        }
        paths.push(PathBuf::from("/etc/meridian/package_managers.json"));
        if cfg!(windows) {
            if let Ok(appdata) = std::env::var("APPDATA") {
                paths.push(PathBuf::from(appdata).join("meridian/package_managers.json"));
            }
            paths.push(PathBuf::from("C:/ProgramData/meridian/package_managers.json"));
        }
        paths
    }

    /// Load a JSON config describing package managers. Entries whose binary
    /// is present replace or extend the registered set; unavailable entries
    /// are skipped with a warning.
    ///
    /// # Errors
    /// Fails when the file cannot be read or parsed.
    pub fn load_package_manager_config(&self, path: &Path) -> DependencyResult<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DependencyError::new(
                DependencyErrorCode::ConfigLoadFailed,
                format!("could not read {}: {e}", path.display()),
            )
        })?;
        let config: RegistryConfig = serde_json::from_str(&content).map_err(|e| {
            DependencyError::new(
                DependencyErrorCode::ConfigLoadFailed,
                format!("could not parse {}: {e}", path.display()),
            )
        })?;

        let mut managers = self.managers.write();
        for entry in config.package_managers {
            if !self.runner.binary_exists(&entry.name) {
                warn!(manager = %entry.name, "configured package manager is not available");
                continue;
            }
            let info = PackageManagerInfo {
                check_cmd: if entry.check_cmd.is_empty() {
                    format!("{} --version", entry.name)
                } else {
                    entry.check_cmd
                },
                install_cmd: entry.install_cmd,
                uninstall_cmd: entry.uninstall_cmd,
                search_cmd: entry.search_cmd,
                name: entry.name,
            };
            match managers.iter_mut().find(|m| m.name == info.name) {
                Some(existing) => {
                    info!(manager = %info.name, "updated package manager configuration");
                    *existing = info;
                }
                None => {
                    info!(manager = %info.name, "added package manager from config");
                    managers.push(info);
                }
            }
        }
        info!(path = %path.display(), "package manager configuration loaded");
        Ok(())
    }

    /// Look up a manager by name.
    #[must_use]
    pub fn get_package_manager(&self, name: &str) -> Option<PackageManagerInfo> {
        self.managers.read().iter().find(|m| m.name == name).cloned()
    }

    /// All registered managers.
    #[must_use]
    pub fn package_managers(&self) -> Vec<PackageManagerInfo> {
        self.managers.read().clone()
    }

    /// The platform this registry was built for.
    #[must_use]
    pub fn detector(&self) -> &PlatformDetector {
        &self.detector
    }

    /// Search every registered manager for a dependency, deduplicating the
    /// parsed package names across managers.
    #[must_use]
    pub fn search_dependency(&self, dep_name: &str) -> Vec<String> {
        info!(dep = dep_name, "searching for dependency");
        let mut results = Vec::new();
        let mut unique = AHashSet::new();

        for manager in self.managers.read().iter() {
            let command = manager.search_command(dep_name);
            debug!(manager = %manager.name, command, "searching");
            match self.runner.run(&command) {
                Ok(output) => {
                    for package in parse_search_output(&manager.name, &output, dep_name) {
                        if unique.insert(package.clone()) {
                            results.push(package);
                        }
                    }
                }
                Err(e) => {
                    warn!(manager = %manager.name, error = %e, "search failed");
                }
            }
        }
        info!(count = results.len(), "search completed");
        results
    }

    /// Find running processes of every registered manager and terminate
    /// them, gracefully first and forcefully after a 500 ms grace period.
    pub fn cancel_installation(&self, dep_name: &str) {
        info!(dep = dep_name, "attempting to cancel installation");
        let mut found = false;
        for manager in self.managers.read().iter() {
            for process in process_names(&manager.name) {
                let pids = self.runner.processes_matching(process);
                if pids.is_empty() {
                    continue;
                }
                found = true;
                info!(process, count = pids.len(), "terminating processes");
                for pid in pids {
                    self.runner.terminate(pid, CANCEL_GRACE);
                }
            }
        }
        if !found {
            info!(dep = dep_name, "no package manager processes running");
        }
    }
}

/// Parse one manager's search output into package names.
///
/// Formats: `apt` prints `name/suite ...`; `dnf`/`yum` print `name.arch`;
/// `pacman` prints `repo/name version`; `brew` prints whitespace-separated
/// tokens under `==>` headers; `choco` prints `name version` lines after a
/// banner; `scoop` quotes names; `winget` prints a table below a
/// `Name ... Id` header. Anything else falls back to the first token of
/// matching lines.
#[must_use]
pub fn parse_search_output(manager: &str, output: &str, search_term: &str) -> Vec<String> {
    let mut results = Vec::new();

    match manager {
        "apt" => {
            for line in output.lines() {
                if let Some(slash) = line.find('/') {
                    let name = &line[..slash];
                    if !name.is_empty() && name.contains(search_term) {
                        results.push(name.to_string());
                    }
                }
            }
        }
        "dnf" | "yum" => {
            for line in output.lines() {
                if let Some(dot) = line.find('.') {
                    let name = &line[..dot];
                    if !name.is_empty() && name.contains(search_term) {
                        results.push(name.to_string());
                    }
                }
            }
        }
        "pacman" => {
            for line in output.lines() {
                if let Some(slash) = line.find('/') {
                    let after = &line[slash + 1..];
                    let name = after.split_whitespace().next().unwrap_or("");
                    if !name.is_empty() && name.contains(search_term) {
                        results.push(name.to_string());
                    }
                }
            }
        }
        "brew" => {
            for line in output.lines() {
                if line.contains("==>") {
                    continue;
                }
                for token in line.split_whitespace() {
                    if token.contains(search_term) {
                        results.push(token.to_string());
                    }
                }
            }
        }
        "choco" => {
            for line in output.lines() {
                if line.contains("Chocolatey") {
                    continue;
                }
                if let Some(name) = line.split_whitespace().next() {
                    if name.contains(search_term) {
                        results.push(name.to_string());
                    }
                }
            }
        }
        "scoop" => {
            for line in output.lines() {
                if let Some(start) = line.find('\'') {
                    if let Some(len) = line[start + 1..].find('\'') {
                        let name = &line[start + 1..start + 1 + len];
                        if !name.is_empty() && name.contains(search_term) {
                            results.push(name.to_string());
                        }
                    }
                }
            }
        }
        "winget" => {
            let mut in_results = false;
            for line in output.lines() {
                if line.contains("Name") && line.contains("Id") {
                    in_results = true;
                    continue;
                }
                if !in_results || line.is_empty() || line.contains('-') {
                    continue;
                }
                if let Some(name) = line.split_whitespace().next() {
                    if name.contains(search_term) {
                        results.push(name.to_string());
                    }
                }
            }
        }
        _ => {
            for line in output.lines() {
                if line.contains(search_term) {
                    if let Some(name) = line.split_whitespace().next() {
                        results.push(name.to_string());
                    }
                }
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Runner with a fixed set of "installed" binaries and canned output.
    struct FakeRunner {
        binaries: Vec<&'static str>,
        output: String,
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, _command: &str) -> io::Result<String> {
            Ok(self.output.clone())
        }
        fn binary_exists(&self, name: &str) -> bool {
            self.binaries.contains(&name)
        }
        fn processes_matching(&self, _name: &str) -> Vec<u32> {
            Vec::new()
        }
        fn terminate(&self, _pid: u32, _grace: Duration) {}
    }

    fn registry_with(binaries: Vec<&'static str>, output: &str) -> PackageManagerRegistry {
        PackageManagerRegistry::new(
            PlatformDetector::from_identity("Ubuntu 24.04"),
            Arc::new(FakeRunner {
                binaries,
                output: output.to_string(),
            }),
        )
    }

    #[test]
    fn probing_keeps_only_present_binaries() {
        let registry = registry_with(vec!["apt", "dnf"], "");
        let names: Vec<String> = registry
            .package_managers()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["apt", "dnf"]);
        assert!(registry.get_package_manager("pacman").is_none());
    }

    #[test]
    fn command_templates_substitute_name() {
        let registry = registry_with(vec!["apt"], "");
        let apt = registry.get_package_manager("apt").unwrap();
        assert_eq!(apt.install_command("openssl"), "apt install -y openssl");
        assert_eq!(apt.uninstall_command("openssl"), "apt remove -y openssl");
        assert_eq!(apt.search_command("openssl"), "apt search openssl");
    }

    #[test]
    fn config_overlay_replaces_and_appends() {
        let registry = registry_with(vec!["apt", "mgr"], "");
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("package_managers.json");
        std::fs::write(
            &path,
            r#"{"package_managers": [
                {"name": "apt", "install_cmd": "apt-get install {}", "uninstall_cmd": "apt-get remove {}", "search_cmd": "apt-cache search {}"},
                {"name": "mgr", "install_cmd": "mgr add {}", "uninstall_cmd": "mgr del {}", "search_cmd": "mgr find {}"},
                {"name": "ghost", "install_cmd": "ghost {}", "uninstall_cmd": "", "search_cmd": ""}
            ]}"#,
        )
        .unwrap();

        registry.load_package_manager_config(&path).unwrap();
        let apt = registry.get_package_manager("apt").unwrap();
        assert_eq!(apt.install_command("x"), "apt-get install x");
        assert!(registry.get_package_manager("mgr").is_some());
        // Binaries that do not exist are not registered.
        assert!(registry.get_package_manager("ghost").is_none());
    }

    #[test]
    fn config_load_failure_is_typed() {
        let registry = registry_with(vec![], "");
        let err = registry
            .load_package_manager_config(Path::new("/no/such/config.json"))
            .unwrap_err();
        assert_eq!(err.code, DependencyErrorCode::ConfigLoadFailed);
    }

    #[test]
    fn apt_search_parsing() {
        let output = "openssl/noble 3.0.13 amd64\n  TLS toolkit\nlibssl-dev/noble 3.0.13\n";
        let results = parse_search_output("apt", output, "ssl");
        assert_eq!(results, vec!["openssl", "libssl-dev"]);
    }

    #[test]
    fn dnf_search_parsing() {
        let output = "openssl.x86_64 : toolkit\nopenssl-devel.x86_64 : headers\n";
        let results = parse_search_output("dnf", output, "openssl");
        assert_eq!(results, vec!["openssl", "openssl-devel"]);
    }

    #[test]
    fn pacman_search_parsing() {
        let output = "core/openssl 3.3.1-1\n    TLS toolkit\nextra/openssl-1.1 1.1.1\n";
        let results = parse_search_output("pacman", output, "openssl");
        assert_eq!(results, vec!["openssl", "openssl-1.1"]);
    }

    #[test]
    fn brew_search_parsing() {
        let output = "==> Formulae\nopenssl@3 openssl@1.1\n";
        let results = parse_search_output("brew", output, "openssl");
        assert_eq!(results, vec!["openssl@3", "openssl@1.1"]);
    }

    #[test]
    fn scoop_search_parsing() {
        let output = "Results from 'main' bucket:\n    'openssl' (3.3.1)\n";
        let results = parse_search_output("scoop", output, "openssl");
        assert_eq!(results, vec!["openssl"]);
    }

    #[test]
    fn winget_search_parsing() {
        let output = "Name       Id            Version\nopenssl    ShiningLight  3.3.1\n";
        let results = parse_search_output("winget", output, "openssl");
        assert_eq!(results, vec!["openssl"]);
    }

    #[test]
    fn search_deduplicates_across_managers() {
        let registry = registry_with(vec!["apt", "dnf"], "openssl/noble 3\nopenssl.x86_64 x\n");
        let results = registry.search_dependency("openssl");
        assert_eq!(results, vec!["openssl"]);
    }
}
