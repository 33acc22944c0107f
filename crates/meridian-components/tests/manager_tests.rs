//! End-to-end component lifecycle scenarios.

use meridian_components::{
    ComponentEvent, ComponentManager, ComponentOptions, ComponentState, DependencyDecl,
    LoadParams, NullLoader,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn manager() -> ComponentManager {
    ComponentManager::new(Arc::new(NullLoader::new()))
}

fn params(name: &str) -> LoadParams {
    LoadParams::new(name, format!("./components/{name}.so"))
}

#[tokio::test]
async fn load_registers_component_in_created_state() {
    let manager = manager();
    let mut logger = params("LoggerComponent");
    logger.version = Some("1.0.0".to_string());

    manager.load_component(logger).await.unwrap();

    assert!(manager.has_component("LoggerComponent"));
    assert_eq!(
        manager.get_component_state("LoggerComponent"),
        Some(ComponentState::Created)
    );
    assert!(manager.get_component("LoggerComponent").is_some());
}

#[tokio::test]
async fn duplicate_load_is_rejected_without_corrupting_state() {
    let manager = manager();
    manager.load_component(params("camera")).await.unwrap();
    assert!(manager.load_component(params("camera")).await.is_err());

    // The original registration is untouched.
    assert_eq!(
        manager.get_component_state("camera"),
        Some(ComponentState::Created)
    );
}

#[tokio::test]
async fn lifecycle_happy_path() {
    let manager = manager();
    let mut logger = params("LoggerComponent");
    logger.version = Some("1.0.0".to_string());
    manager.load_component(logger).await.unwrap();

    let events: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.add_event_listener(
        ComponentEvent::StateChanged,
        Arc::new(move |_, _, data| sink.lock().push(data.clone())),
    );

    manager.initialize_component("LoggerComponent").unwrap();
    manager.start_component("LoggerComponent").await.unwrap();
    assert_eq!(
        manager.get_component_state("LoggerComponent"),
        Some(ComponentState::Running)
    );
    assert!(!events.lock().is_empty());

    manager.pause_component("LoggerComponent").unwrap();
    manager.resume_component("LoggerComponent").unwrap();
    manager.stop_component("LoggerComponent").unwrap();
    assert_eq!(
        manager.get_component_state("LoggerComponent"),
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn starting_a_created_component_initializes_it() {
    let manager = manager();
    manager.load_component(params("LoggerComponent")).await.unwrap();

    manager.start_component("LoggerComponent").await.unwrap();
    assert_eq!(
        manager.get_component_state("LoggerComponent"),
        Some(ComponentState::Running)
    );
}

#[tokio::test]
async fn invalid_transition_forces_error_state() {
    let manager = manager();
    manager.load_component(params("focuser")).await.unwrap();

    // Created -> Paused is not a legal transition.
    assert!(manager.pause_component("focuser").is_err());
    assert_eq!(
        manager.get_component_state("focuser"),
        Some(ComponentState::Error)
    );
    assert!(manager.get_last_error().is_some());

    manager.clear_errors();
    assert!(manager.get_last_error().is_none());
}

#[tokio::test]
async fn disabled_blocks_until_reenabled() {
    let manager = manager();
    manager.load_component(params("mount")).await.unwrap();
    manager.disable_component("mount").unwrap();

    // A rejected operation must not displace the Disabled state.
    assert!(manager.initialize_component("mount").is_err());
    assert_eq!(
        manager.get_component_state("mount"),
        Some(ComponentState::Disabled)
    );

    manager.enable_component("mount").unwrap();
    assert_eq!(
        manager.get_component_state("mount"),
        Some(ComponentState::Created)
    );
    manager.initialize_component("mount").unwrap();
}

#[tokio::test]
async fn disabled_component_cannot_be_unloaded() {
    let manager = manager();
    manager.load_component(params("mount")).await.unwrap();
    manager.disable_component("mount").unwrap();

    assert!(manager.unload_component("mount").is_err());
    assert!(manager.has_component("mount"));
    assert_eq!(
        manager.get_component_state("mount"),
        Some(ComponentState::Disabled)
    );

    // Re-enabling unblocks the unload.
    manager.enable_component("mount").unwrap();
    manager.unload_component("mount").unwrap();
    assert!(!manager.has_component("mount"));
}

#[tokio::test]
async fn unload_expires_weak_handles_and_graph_node() {
    let manager = manager();
    manager.load_component(params("camera")).await.unwrap();
    let weak = manager.get_component("camera").unwrap();
    assert!(weak.upgrade().is_some());

    manager.unload_component("camera").unwrap();
    assert!(!manager.has_component("camera"));
    assert!(weak.upgrade().is_none());
    assert!(!manager.graph().contains("camera"));
}

#[tokio::test]
async fn event_ordering_across_load_and_unload() {
    let manager = manager();
    let events: Arc<Mutex<Vec<ComponentEvent>>> = Arc::new(Mutex::new(Vec::new()));
    for event in [
        ComponentEvent::PreLoad,
        ComponentEvent::PostLoad,
        ComponentEvent::StateChanged,
        ComponentEvent::PreUnload,
        ComponentEvent::PostUnload,
    ] {
        let sink = events.clone();
        manager.add_event_listener(event, Arc::new(move |_, e, _| sink.lock().push(e)));
    }

    manager.load_component(params("guider")).await.unwrap();
    manager.initialize_component("guider").unwrap();
    manager.start_component("guider").await.unwrap();
    manager.unload_component("guider").unwrap();

    let seen = events.lock().clone();
    let pos = |e: ComponentEvent| seen.iter().position(|x| *x == e).unwrap();
    assert!(pos(ComponentEvent::PreLoad) < pos(ComponentEvent::PostLoad));
    assert!(pos(ComponentEvent::PostLoad) < pos(ComponentEvent::StateChanged));
    assert!(pos(ComponentEvent::StateChanged) < pos(ComponentEvent::PreUnload));
    assert!(pos(ComponentEvent::PreUnload) < pos(ComponentEvent::PostUnload));
}

#[tokio::test]
async fn dependencies_wire_into_the_graph() {
    let manager = manager();
    let mut core = params("core-runtime");
    core.version = Some("2.0.0".to_string());
    manager.load_component(core).await.unwrap();

    let mut camera = params("camera");
    camera.dependencies = vec![DependencyDecl {
        name: "core-runtime".to_string(),
        version: Some("1.0.0".to_string()),
    }];
    manager.load_component(camera).await.unwrap();

    assert_eq!(
        manager.graph().get_dependencies("camera"),
        vec!["core-runtime"]
    );
    let tree = manager.print_dependency_tree();
    assert!(tree.contains("camera -> [core-runtime]"));
}

#[tokio::test]
async fn dependency_on_missing_component_fails_and_rolls_back() {
    let manager = manager();
    let mut camera = params("camera");
    camera.dependencies = vec![DependencyDecl {
        name: "ghost".to_string(),
        version: None,
    }];

    assert!(manager.load_component(camera).await.is_err());
    assert!(!manager.has_component("camera"));
    assert!(!manager.graph().contains("camera"));
}

#[tokio::test]
async fn dependency_version_mismatch_fails_load() {
    let manager = manager();
    let mut core = params("core-runtime");
    core.version = Some("1.0.0".to_string());
    manager.load_component(core).await.unwrap();

    let mut camera = params("camera");
    camera.dependencies = vec![DependencyDecl {
        name: "core-runtime".to_string(),
        version: Some("2.0.0".to_string()),
    }];
    assert!(manager.load_component(camera).await.is_err());
    assert!(!manager.has_component("camera"));
}

#[tokio::test]
async fn component_info_and_doc() {
    let manager = manager();
    let mut cam = params("camera");
    cam.version = Some("1.2.3".to_string());
    cam.options = Some(ComponentOptions {
        config: serde_json::json!({"doc": "Drives the imaging camera", "gain": 50}),
        ..ComponentOptions::default()
    });
    manager.load_component(cam).await.unwrap();

    let info = manager.get_component_info("camera").unwrap();
    assert_eq!(info["name"], "camera");
    assert_eq!(info["state"], ComponentState::Created.code());
    assert_eq!(info["config"]["gain"], 50);

    assert_eq!(manager.get_component_doc("camera"), "Drives the imaging camera");
    assert_eq!(manager.get_component_doc("nope"), "");
    assert!(manager.get_component_info("nope").is_none());
}

#[tokio::test]
async fn update_config_emits_config_changed() {
    let manager = manager();
    manager.load_component(params("camera")).await.unwrap();

    let received: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
    let sink = received.clone();
    manager.add_event_listener(
        ComponentEvent::ConfigChanged,
        Arc::new(move |_, _, data| *sink.lock() = Some(data.clone())),
    );

    let config = serde_json::json!({"exposure": 120});
    manager.update_config("camera", config.clone()).unwrap();
    assert_eq!(received.lock().clone(), Some(config.clone()));
    assert_eq!(manager.get_config("camera"), Some(config));
}

#[tokio::test]
async fn groups_collect_components() {
    let manager = manager();
    manager.load_component(params("camera")).await.unwrap();
    manager.load_component(params("filterwheel")).await.unwrap();

    manager.add_to_group("camera", "imaging");
    manager.add_to_group("filterwheel", "imaging");
    manager.add_to_group("camera", "imaging");

    assert_eq!(
        manager.get_group_components("imaging"),
        vec!["camera", "filterwheel"]
    );
    assert!(manager.get_group_components("empty").is_empty());
}

#[tokio::test]
async fn batch_load_and_unload() {
    let manager = manager();
    let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    assert!(manager.batch_load(&names).await);
    assert_eq!(manager.get_component_list(), vec!["a", "b", "c"]);

    assert!(manager.batch_unload(&names));
    assert!(manager.get_component_list().is_empty());
    // Unloading again fails per item and reports aggregate failure.
    assert!(!manager.batch_unload(&names));
}

#[tokio::test]
async fn performance_metrics_respect_monitoring_flag() {
    let manager = manager();
    manager.load_component(params("camera")).await.unwrap();

    let metrics = manager.get_performance_metrics();
    assert_eq!(metrics["camera"]["state"], ComponentState::Created.code());
    assert_eq!(metrics["camera"]["error_count"], 0);

    manager.enable_performance_monitoring(false);
    assert_eq!(manager.get_performance_metrics(), serde_json::json!({}));
}

#[tokio::test]
async fn load_params_from_json() {
    let value = serde_json::json!({
        "name": "camera",
        "path": "./camera.so",
        "version": "1.0.0",
        "dependencies": [{"name": "core", "version": "1.0.0"}],
    });
    let params = LoadParams::from_json(&value).unwrap();
    assert_eq!(params.name, "camera");
    assert_eq!(params.dependencies.len(), 1);

    assert!(LoadParams::from_json(&serde_json::json!({"path": "x"})).is_err());
}

#[tokio::test]
async fn scan_components_reports_new_modules() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("camera.so"), "elf").unwrap();

    let manager = manager();
    let new_files = manager.scan_components(dir.path()).unwrap();
    assert_eq!(new_files.len(), 1);
    assert!(new_files[0].ends_with("camera.so"));

    // A second scan with no changes reports nothing new.
    let new_files = manager.scan_components(dir.path()).unwrap();
    assert!(new_files.is_empty());
}

#[tokio::test]
async fn shutdown_unloads_everything() {
    let manager = manager();
    manager.load_component(params("a")).await.unwrap();
    manager.load_component(params("b")).await.unwrap();

    manager.shutdown();
    assert!(manager.get_component_list().is_empty());
}
