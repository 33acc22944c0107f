//! Manifest parsing: `package.json`, `package.xml`, `package.yaml`.

use crate::error::{GraphError, Result};
use ahash::AHashMap;
use meridian_core::Version;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;
use tracing::debug;

/// Recognized manifest file names, tried in this fixed order.
pub const MANIFEST_FILES: [&str; 3] = ["package.json", "package.xml", "package.yaml"];

/// Prefix marking a dependency as an OS package rather than a component.
pub const SYSTEM_PREFIX: &str = "system:";

/// A parsed component manifest: the package name and its declared
/// dependencies with required versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Package name.
    pub name: String,
    /// Dependency name -> required version.
    pub deps: AHashMap<String, Version>,
}

impl Manifest {
    /// Parse the first recognized manifest found in `dir`, or `None` when the
    /// directory holds none.
    ///
    /// # Errors
    /// Propagates parse failures of whichever manifest was found.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>> {
        for file in MANIFEST_FILES {
            let path = dir.join(file);
            if path.exists() {
                debug!(path = %path.display(), "parsing manifest");
                let manifest = Self::from_file(&path)?;
                return Ok(Some(manifest));
            }
        }
        Ok(None)
    }

    /// Parse a manifest file, dispatching on its file name.
    ///
    /// # Errors
    /// Returns [`GraphError::Manifest`] on malformed content and
    /// [`GraphError::Io`] when the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GraphError::io(path, e))?;
        match path.file_name().and_then(|n| n.to_str()) {
            Some("package.xml") => Self::from_xml(path, &content),
            Some("package.yaml") => Self::from_yaml(path, &content),
            _ => Self::from_json(path, &content),
        }
    }

    /// Parse `package.json`: requires `name`, accepts an optional
    /// `dependencies` object of name -> version string.
    fn from_json(path: &Path, content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| GraphError::manifest(path, e.to_string()))?;

        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| GraphError::manifest(path, "missing package name"))?
            .to_string();

        let mut deps = AHashMap::new();
        if let Some(map) = value.get("dependencies").and_then(|d| d.as_object()) {
            for (dep, version) in map {
                let raw = version.as_str().ok_or_else(|| {
                    GraphError::manifest(path, format!("dependency '{dep}' version is not a string"))
                })?;
                let parsed = Version::parse(raw).map_err(|e| {
                    GraphError::manifest(path, format!("dependency '{dep}': {e}"))
                })?;
                deps.insert(dep.clone(), parsed);
            }
        }

        Ok(Self { name, deps })
    }

    /// Parse `package.xml`: root `<package>` with a required `<name>` child
    /// and zero or more `<depend>` children whose text is a dependency name.
    /// The XML form carries no versions, so dependencies default to `0.0.0`.
    fn from_xml(path: &Path, content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        let mut buf = Vec::new();

        let mut saw_package = false;
        let mut in_name = false;
        let mut in_depend = false;
        let mut name: Option<String> = None;
        let mut deps = AHashMap::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"package" => saw_package = true,
                    b"name" if saw_package => in_name = true,
                    b"depend" if saw_package => in_depend = true,
                    _ => {}
                },
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"name" => in_name = false,
                    b"depend" => in_depend = false,
                    _ => {}
                },
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| GraphError::manifest(path, e.to_string()))?;
                    let text = text.trim();
                    if !text.is_empty() {
                        if in_name {
                            name = Some(text.to_string());
                        } else if in_depend {
                            deps.insert(text.to_string(), Version::default());
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(GraphError::manifest(path, e.to_string())),
            }
            buf.clear();
        }

        if !saw_package {
            return Err(GraphError::manifest(path, "missing root <package> element"));
        }
        let name = name.ok_or_else(|| GraphError::manifest(path, "missing package name"))?;
        Ok(Self { name, deps })
    }

    /// Parse `package.yaml`: requires `name`, accepts an optional
    /// `dependencies` mapping of name -> version string.
    fn from_yaml(path: &Path, content: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| GraphError::manifest(path, e.to_string()))?;

        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| GraphError::manifest(path, "missing package name"))?
            .to_string();

        let mut deps = AHashMap::new();
        if let Some(map) = value.get("dependencies").and_then(|d| d.as_mapping()) {
            for (dep, version) in map {
                let dep = dep.as_str().ok_or_else(|| {
                    GraphError::manifest(path, "dependency name is not a string")
                })?;
                let raw = version.as_str().ok_or_else(|| {
                    GraphError::manifest(path, format!("dependency '{dep}' version is not a string"))
                })?;
                let parsed = Version::parse(raw).map_err(|e| {
                    GraphError::manifest(path, format!("dependency '{dep}': {e}"))
                })?;
                deps.insert(dep.to_string(), parsed);
            }
        }

        Ok(Self { name, deps })
    }

    /// Component dependencies only, with `system:` entries filtered out.
    #[must_use]
    pub fn component_deps(&self) -> impl Iterator<Item = (&String, &Version)> {
        self.deps
            .iter()
            .filter(|(name, _)| !name.starts_with(SYSTEM_PREFIX))
    }

    /// OS-package dependencies, with the `system:` prefix stripped.
    #[must_use]
    pub fn system_deps(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.deps.iter().filter_map(|(name, version)| {
            name.strip_prefix(SYSTEM_PREFIX).map(|bare| (bare, version))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fake_path(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn json_manifest() {
        let content = r#"{
            "name": "camera-driver",
            "dependencies": {
                "core-runtime": "1.2.0",
                "system:libusb": "1.0.27"
            }
        }"#;
        let manifest = Manifest::from_json(&fake_path("package.json"), content).unwrap();
        assert_eq!(manifest.name, "camera-driver");
        assert_eq!(manifest.deps.len(), 2);
        assert_eq!(
            manifest.deps["core-runtime"],
            Version::parse("1.2.0").unwrap()
        );
    }

    #[test]
    fn json_requires_name() {
        let err = Manifest::from_json(&fake_path("package.json"), r#"{"dependencies": {}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing package name"));
    }

    #[test]
    fn json_rejects_bad_dep_version() {
        let content = r#"{"name": "x", "dependencies": {"y": "not-a-version"}}"#;
        assert!(Manifest::from_json(&fake_path("package.json"), content).is_err());
    }

    #[test]
    fn xml_manifest() {
        let content = r"
            <package>
                <name>focuser-driver</name>
                <depend>core-runtime</depend>
                <depend>indi-bridge</depend>
            </package>";
        let manifest = Manifest::from_xml(&fake_path("package.xml"), content).unwrap();
        assert_eq!(manifest.name, "focuser-driver");
        assert_eq!(manifest.deps.len(), 2);
        // XML dependencies carry no version and default to 0.0.0.
        assert_eq!(manifest.deps["core-runtime"], Version::default());
    }

    #[test]
    fn xml_requires_root_and_name() {
        assert!(Manifest::from_xml(&fake_path("package.xml"), "<other/>").is_err());
        assert!(Manifest::from_xml(&fake_path("package.xml"), "<package></package>").is_err());
    }

    #[test]
    fn yaml_manifest() {
        let content = "name: mount-driver\ndependencies:\n  core-runtime: 2.0.0\n";
        let manifest = Manifest::from_yaml(&fake_path("package.yaml"), content).unwrap();
        assert_eq!(manifest.name, "mount-driver");
        assert_eq!(
            manifest.deps["core-runtime"],
            Version::parse("2.0.0").unwrap()
        );
    }

    #[test]
    fn system_dep_routing() {
        let content = r#"{
            "name": "guider",
            "dependencies": {
                "core-runtime": "1.0.0",
                "system:openssl": "3.0.0"
            }
        }"#;
        let manifest = Manifest::from_json(&fake_path("package.json"), content).unwrap();

        let component: Vec<_> = manifest.component_deps().map(|(n, _)| n.clone()).collect();
        assert_eq!(component, vec!["core-runtime"]);

        let system: Vec<_> = manifest.system_deps().map(|(n, _)| n.to_string()).collect();
        assert_eq!(system, vec!["openssl"]);
    }
}
