//! Cross-format manifest resolution scenarios.

use meridian_core::Version;
use meridian_graph::{DependencyGraph, Manifest, MANIFEST_FILES};
use std::fs;
use tempfile::TempDir;

#[test]
fn manifest_file_order_is_fixed() {
    assert_eq!(
        MANIFEST_FILES,
        ["package.json", "package.xml", "package.yaml"]
    );
}

#[test]
fn json_wins_when_multiple_manifests_exist() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "from-json"}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("package.xml"),
        "<package><name>from-xml</name></package>",
    )
    .unwrap();

    let manifest = Manifest::from_dir(dir.path()).unwrap().unwrap();
    assert_eq!(manifest.name, "from-json");
}

#[test]
fn resolution_mixes_manifest_formats() {
    let root = TempDir::new().unwrap();

    let json_pkg = root.path().join("json-pkg");
    fs::create_dir(&json_pkg).unwrap();
    fs::write(
        json_pkg.join("package.json"),
        r#"{"name": "sequencer", "dependencies": {"scheduler": "1.0.0"}}"#,
    )
    .unwrap();

    let xml_pkg = root.path().join("xml-pkg");
    fs::create_dir(&xml_pkg).unwrap();
    fs::write(
        xml_pkg.join("package.xml"),
        "<package><name>planner</name><depend>scheduler</depend></package>",
    )
    .unwrap();

    let yaml_pkg = root.path().join("yaml-pkg");
    fs::create_dir(&yaml_pkg).unwrap();
    fs::write(
        yaml_pkg.join("package.yaml"),
        "name: dome-control\ndependencies:\n  scheduler: 1.2.0\n",
    )
    .unwrap();

    let graph = DependencyGraph::new();
    let order = graph
        .resolve_dependencies(&[json_pkg, xml_pkg, yaml_pkg])
        .unwrap();

    for name in ["sequencer", "planner", "dome-control", "scheduler"] {
        assert!(order.iter().any(|n| n == name), "missing {name} in {order:?}");
    }
    // Deduplicated: the shared dependency appears exactly once.
    assert_eq!(order.iter().filter(|n| n.as_str() == "scheduler").count(), 1);
}

#[test]
fn self_dependency_is_skipped() {
    let root = TempDir::new().unwrap();
    let a = root.path().join("a");
    fs::create_dir(&a).unwrap();
    // A package cannot depend on itself; the self edge is skipped, so the
    // manifest still resolves.
    fs::write(
        a.join("package.json"),
        r#"{"name": "loop", "dependencies": {"loop": "1.0.0"}}"#,
    )
    .unwrap();

    let graph = DependencyGraph::new();
    let order = graph.resolve_dependencies(&[a]).unwrap();
    assert_eq!(order, vec!["loop"]);
}

#[test]
fn prerelease_versions_survive_resolution() {
    let root = TempDir::new().unwrap();
    let a = root.path().join("a");
    fs::create_dir(&a).unwrap();
    fs::write(
        a.join("package.json"),
        r#"{"name": "imager", "dependencies": {"driver": "2.1.0-beta"}}"#,
    )
    .unwrap();

    let manifest = Manifest::from_dir(&a).unwrap().unwrap();
    assert_eq!(manifest.deps["driver"], Version::parse("2.1.0-beta").unwrap());
}
