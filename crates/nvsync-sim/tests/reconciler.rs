use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use nvsync_core::{
    MeshLayerSpec, MeshSpec, PassOutcome, ReconcileError, Reconciler, ResourceKey, ResourceState, Severity,
    ViewerConfig, ViewerOptions, VolumeSpec,
};
use nvsync_sim::{EngineCall, MemoryEngine};

fn setup() -> (Arc<MemoryEngine>, Arc<Reconciler<MemoryEngine>>) {
    let engine = Arc::new(MemoryEngine::new());
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&engine)));
    (engine, reconciler)
}

fn volumes(urls: &[&str]) -> ViewerConfig {
    ViewerConfig::with_volumes(urls.iter().map(|u| VolumeSpec::new(u)).collect())
}

async fn wait_for_generation(reconciler: &Reconciler<MemoryEngine>, generation: u64) {
    while reconciler.generation() < generation {
        tokio::task::yield_now().await;
    }
}

// ── Convergence ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_config_replaces_first() {
    let (engine, reconciler) = setup();

    reconciler.submit(volumes(&["a.nii", "b.nii", "c.nii"])).await;
    let report = reconciler.submit(volumes(&["c.nii", "d.nii"])).await;

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.stats.loads, 1);
    assert_eq!(report.stats.unloads, 2);
    assert_eq!(engine.volume_urls(), vec!["c.nii", "d.nii"]);
    assert_eq!(reconciler.loaded_volumes().await, vec!["c.nii", "d.nii"]);
    assert_eq!(
        reconciler.resource_state(&ResourceKey::volume("a.nii")),
        ResourceState::Absent
    );
    assert_eq!(
        reconciler.resource_state(&ResourceKey::volume("d.nii")),
        ResourceState::Loaded
    );
}

#[tokio::test]
async fn test_unloads_precede_loads() {
    let (engine, reconciler) = setup();
    reconciler.submit(volumes(&["a.nii"])).await;
    engine.drain_calls();

    reconciler.submit(volumes(&["b.nii"])).await;
    let calls = engine.calls();
    let unload = calls.iter().position(EngineCall::is_unload).unwrap();
    let load = calls.iter().position(EngineCall::is_load).unwrap();
    assert!(unload < load);
}

#[tokio::test]
async fn test_same_config_twice_is_noop() {
    let (engine, reconciler) = setup();
    let config = ViewerConfig {
        volumes: vec![
            VolumeSpec::new("t1.nii").with_opacity(1.0).with_colormap("gray"),
            VolumeSpec::new("pet.nii").with_colormap("hot").with_modulation("t1.nii"),
        ],
        meshes: vec![MeshSpec::new("lh.pial").with_layer(MeshLayerSpec::new("lh.curv").with_opacity(0.7))],
        options: ViewerOptions::new()
            .with_crosshair_width(2.0)
            .with_native("backColor", json!([0, 0, 0, 1])),
    };

    let first = reconciler.submit(config.clone()).await;
    assert!(first.stats.engine_calls() > 0);
    engine.drain_calls();

    let second = reconciler.submit(config).await;
    assert_eq!(second.stats.engine_calls(), 0);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_opacity_change_is_one_mutation() {
    let (engine, reconciler) = setup();
    let mut config = ViewerConfig::with_volumes(vec![
        VolumeSpec::new("a.nii").with_opacity(1.0).with_colormap("gray"),
        VolumeSpec::new("b.nii").with_opacity(0.5),
    ]);
    reconciler.submit(config.clone()).await;
    engine.drain_calls();

    config.volumes[1].opacity = Some(0.2);
    let report = reconciler.submit(config).await;

    assert_eq!(report.stats.field_mutations, 1);
    assert_eq!(report.stats.loads, 0);
    assert_eq!(report.stats.unloads, 0);
    assert_eq!(engine.calls().len(), 1);
    assert_eq!(engine.volume("b.nii").unwrap().opacity, 0.2);
}

#[tokio::test]
async fn test_reorder_uses_single_call() {
    let (engine, reconciler) = setup();
    reconciler.submit(volumes(&["a.nii", "b.nii", "c.nii"])).await;
    engine.drain_calls();

    let report = reconciler.submit(volumes(&["c.nii", "a.nii", "b.nii"])).await;
    assert_eq!(report.stats.reorders, 1);
    assert_eq!(report.stats.loads + report.stats.unloads, 0);
    assert_eq!(engine.volume_urls(), vec!["c.nii", "a.nii", "b.nii"]);
}

#[tokio::test]
async fn test_modulate_alpha_applied_after_load() {
    let (engine, reconciler) = setup();
    let mut spec = VolumeSpec::new("pet.nii");
    spec.modulate_alpha = Some(true);
    let report = reconciler.submit(ViewerConfig::with_volumes(vec![spec])).await;

    assert_eq!(report.stats.field_mutations, 1);
    assert!(engine.volume("pet.nii").unwrap().modulate_alpha);
}

// ── Modulation ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_modulation_set_then_cleared() {
    let (engine, reconciler) = setup();
    let config = ViewerConfig::with_volumes(vec![
        VolumeSpec::new("a.nii").with_modulation("b.nii"),
        VolumeSpec::new("b.nii"),
    ]);
    reconciler.submit(config).await;

    let modulation: Vec<_> = engine
        .calls()
        .into_iter()
        .filter(|c| matches!(c, EngineCall::SetModulation { .. }))
        .collect();
    assert_eq!(
        modulation,
        vec![EngineCall::SetModulation {
            target: "a.nii".to_string(),
            modulator: Some("b.nii".to_string()),
        }]
    );
    assert_eq!(engine.volume("a.nii").unwrap().modulation_image.as_deref(), Some("b.nii"));
    engine.drain_calls();

    reconciler.submit(volumes(&["a.nii", "b.nii"])).await;
    assert_eq!(
        engine.calls(),
        vec![EngineCall::SetModulation {
            target: "a.nii".to_string(),
            modulator: None,
        }]
    );
    assert!(engine.volume("a.nii").unwrap().modulation_image.is_none());
}

#[tokio::test]
async fn test_unresolved_modulation_reported() {
    let (engine, reconciler) = setup();
    let config = ViewerConfig::with_volumes(vec![VolumeSpec::new("a.nii").with_modulation("missing.nii")]);
    let report = reconciler.submit(config).await;

    let warnings: Vec<_> = report.errors_with(Severity::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        warnings[0],
        ReconcileError::ModulationResolution { modulator, .. } if modulator == "missing.nii"
    ));
    assert!(!report.errors.iter().any(|e| matches!(e, ReconcileError::InvalidConfig(_))));
    assert_eq!(engine.volume_urls(), vec!["a.nii"]);
    assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::SetModulation { .. })), 0);
}

#[tokio::test]
async fn test_modulator_failing_to_load_leaves_target_unmodulated() {
    let (engine, reconciler) = setup();
    engine.fail_loads("b.nii", "decode error");
    let config = ViewerConfig::with_volumes(vec![
        VolumeSpec::new("a.nii").with_modulation("b.nii"),
        VolumeSpec::new("b.nii"),
    ]);
    let report = reconciler.submit(config).await;

    assert!(report.errors_for("b.nii").any(|e| matches!(e, ReconcileError::ResourceLoad { .. })));
    assert!(report
        .errors_for("a.nii")
        .any(|e| matches!(e, ReconcileError::ModulationResolution { .. })));
    assert!(engine.volume("a.nii").unwrap().modulation_image.is_none());
}

// ── Failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_load_isolated() {
    let (engine, reconciler) = setup();
    engine.fail_loads("x.nii", "404 Not Found");

    let report = reconciler.submit(volumes(&["x.nii", "y.nii"])).await;

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert!(report.has_errors());
    assert_eq!(report.errors_for("x.nii").count(), 1);
    assert_eq!(report.errors_for("y.nii").count(), 0);
    assert_eq!(engine.volume_urls(), vec!["y.nii"]);
    assert_eq!(
        reconciler.resource_state(&ResourceKey::volume("x.nii")),
        ResourceState::LoadFailed
    );
}

#[tokio::test]
async fn test_failed_load_retried_next_pass() {
    let (engine, reconciler) = setup();
    engine.fail_loads("x.nii", "timeout");
    reconciler.submit(volumes(&["x.nii"])).await;
    assert!(engine.volumes().is_empty());

    engine.clear_faults();
    let report = reconciler.submit(volumes(&["x.nii"])).await;
    assert!(!report.has_errors());
    assert_eq!(engine.volume_urls(), vec!["x.nii"]);
}

#[tokio::test]
async fn test_failed_mutation_retried_next_pass() {
    let (engine, reconciler) = setup();
    reconciler
        .submit(ViewerConfig::with_volumes(vec![VolumeSpec::new("a.nii").with_opacity(1.0)]))
        .await;

    engine.fail_updates("a.nii", "locked");
    let config = ViewerConfig::with_volumes(vec![VolumeSpec::new("a.nii").with_opacity(0.4)]);
    let report = reconciler.submit(config.clone()).await;
    assert!(report
        .errors_for("a.nii")
        .any(|e| matches!(e, ReconcileError::FieldMutation { field, .. } if field == "opacity")));

    engine.clear_faults();
    let report = reconciler.submit(config).await;
    assert_eq!(report.stats.field_mutations, 1);
    assert_eq!(engine.volume("a.nii").unwrap().opacity, 0.4);
}

#[tokio::test]
async fn test_duplicate_locator_first_wins() {
    let (engine, reconciler) = setup();
    let config = ViewerConfig::with_volumes(vec![
        VolumeSpec::new("a.nii").with_opacity(0.3),
        VolumeSpec::new("a.nii").with_opacity(0.9),
    ]);
    let report = reconciler.submit(config).await;

    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, ReconcileError::InvalidConfig(_))));
    assert_eq!(engine.volumes().len(), 1);
    assert_eq!(engine.volume("a.nii").unwrap().opacity, 0.3);
}

// ── Supersession ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_stale_load_discarded() {
    let (engine, reconciler) = setup();
    let gate = engine.hold_load("x.nii");

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.submit(volumes(&["x.nii"])).await })
    };
    gate.started().await;

    let second = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.submit(volumes(&["y.nii"])).await })
    };
    wait_for_generation(&reconciler, 2).await;
    gate.release();

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first.outcome, PassOutcome::Completed);
    assert_eq!(first.generation, 2);
    assert_eq!(first.superseded, vec![1]);
    assert!(first.errors.iter().any(|e| matches!(
        e,
        ReconcileError::ConfigurationRaceDiscarded { locator, .. } if locator == "x.nii"
    )));
    assert_eq!(second.outcome, PassOutcome::Coalesced);
    assert_eq!(engine.volume_urls(), vec!["y.nii"]);

    let calls = engine.calls();
    let discarded = calls
        .iter()
        .position(|c| *c == EngineCall::UnloadVolume { locator: "x.nii".to_string() })
        .unwrap();
    let next_load = calls
        .iter()
        .position(|c| *c == EngineCall::LoadVolume { locator: "y.nii".to_string() })
        .unwrap();
    assert!(discarded < next_load);
}

#[tokio::test]
async fn test_stale_load_kept_when_still_wanted() {
    let (engine, reconciler) = setup();
    let gate = engine.hold_load("x.nii");

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.submit(volumes(&["x.nii", "y.nii"])).await })
    };
    gate.started().await;

    let second = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.submit(volumes(&["x.nii", "z.nii"])).await })
    };
    wait_for_generation(&reconciler, 2).await;
    gate.release();

    let first = first.await.unwrap();
    second.await.unwrap();

    assert_eq!(first.outcome, PassOutcome::Completed);
    assert_eq!(first.generation, 2);
    assert!(first.errors.is_empty());
    assert_eq!(engine.volume_urls(), vec!["x.nii", "z.nii"]);
    assert_eq!(engine.count_calls(|c| *c == EngineCall::LoadVolume { locator: "x.nii".to_string() }), 1);
    assert_eq!(engine.count_calls(|c| *c == EngineCall::LoadVolume { locator: "y.nii".to_string() }), 0);
}

#[tokio::test]
async fn test_waiting_submissions_coalesce() {
    let (engine, reconciler) = setup();
    let gate = engine.hold_load("x.nii");

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.submit(volumes(&["x.nii"])).await })
    };
    gate.started().await;

    let mut waiting = Vec::new();
    for (i, url) in ["a.nii", "b.nii", "c.nii"].into_iter().enumerate() {
        let submitter = Arc::clone(&reconciler);
        waiting.push(tokio::spawn(async move { submitter.submit(volumes(&[url])).await }));
        wait_for_generation(&reconciler, i as u64 + 2).await;
    }
    gate.release();
    let first = first.await.unwrap();

    let mut outcomes = Vec::new();
    for task in waiting {
        outcomes.push(task.await.unwrap());
    }
    assert_eq!(engine.volume_urls(), vec!["c.nii"]);
    assert_eq!(engine.count_calls(|c| *c == EngineCall::LoadVolume { locator: "a.nii".to_string() }), 0);
    assert_eq!(engine.count_calls(|c| *c == EngineCall::LoadVolume { locator: "b.nii".to_string() }), 0);
    assert_eq!(first.outcome, PassOutcome::Completed);
    assert_eq!(first.generation, 4);
    assert_eq!(first.superseded, vec![1]);
    assert!(outcomes.iter().all(|r| r.outcome == PassOutcome::Coalesced));
}

#[tokio::test]
async fn test_abandoned_submission_still_applied() {
    let (engine, reconciler) = setup();
    let gate = engine.hold_load("x.nii");

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.submit(volumes(&["x.nii"])).await })
    };
    gate.started().await;

    // The caller gives up while the first pass still holds the lock.
    let abandoned = tokio::time::timeout(Duration::from_millis(10), reconciler.submit(volumes(&["y.nii"]))).await;
    assert!(abandoned.is_err());
    assert_eq!(reconciler.generation(), 2);
    gate.release();

    let first = first.await.unwrap();
    assert_eq!(first.outcome, PassOutcome::Completed);
    assert_eq!(first.generation, 2);
    assert_eq!(engine.volume_urls(), vec!["y.nii"]);
    assert_eq!(reconciler.loaded_volumes().await, vec!["y.nii"]);
}

// ── Meshes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mesh_layers_reconcile_by_locator() {
    let (engine, reconciler) = setup();
    let mesh = MeshSpec::new("/m/lh.pial")
        .with_layer(MeshLayerSpec::new("/m/lh.curv").with_colormap("gray"))
        .with_layer(MeshLayerSpec::new("/m/lh.thickness").with_opacity(0.5));
    let config = ViewerConfig {
        meshes: vec![mesh],
        ..ViewerConfig::new()
    };
    reconciler.submit(config).await;

    let live = engine.mesh("lh.pial").unwrap();
    assert_eq!(live.layers.len(), 2);
    assert_eq!(live.layer("lh.curv").unwrap().colormap, "gray");
    engine.drain_calls();

    let mesh = MeshSpec::new("/m/lh.pial")
        .with_layer(MeshLayerSpec::new("/m/lh.thickness").with_opacity(0.8))
        .with_layer(MeshLayerSpec::new("/m/lh.sulc"));
    let config = ViewerConfig {
        meshes: vec![mesh],
        ..ViewerConfig::new()
    };
    let report = reconciler.submit(config).await;

    assert_eq!(report.stats.unloads, 1);
    assert_eq!(report.stats.loads, 1);
    assert_eq!(report.stats.field_mutations, 1);
    assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::LoadMesh { .. })), 0);
    let live = engine.mesh("lh.pial").unwrap();
    assert!(live.layer("lh.curv").is_none());
    assert_eq!(live.layer("lh.thickness").unwrap().opacity, 0.8);
    assert_eq!(
        reconciler.loaded_layers("/m/lh.pial").await,
        vec!["/m/lh.thickness", "/m/lh.sulc"]
    );
}

#[tokio::test]
async fn test_mesh_removal_drops_layers() {
    let (engine, reconciler) = setup();
    let config = ViewerConfig {
        meshes: vec![MeshSpec::new("lh.pial").with_layer(MeshLayerSpec::new("lh.curv"))],
        ..ViewerConfig::new()
    };
    reconciler.submit(config).await;
    reconciler.submit(ViewerConfig::new()).await;

    assert!(engine.meshes().is_empty());
    assert_eq!(
        reconciler.resource_state(&ResourceKey::mesh_layer("lh.pial", "lh.curv")),
        ResourceState::Absent
    );
    assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::UnloadMeshLayer { .. })), 0);
}

#[tokio::test]
async fn test_mesh_field_update() {
    let (engine, reconciler) = setup();
    let config = ViewerConfig {
        meshes: vec![MeshSpec::new("lh.pial").with_rgba([255, 0, 0, 255])],
        ..ViewerConfig::new()
    };
    reconciler.submit(config).await;

    let config = ViewerConfig {
        meshes: vec![MeshSpec::new("lh.pial").with_rgba([0, 0, 255, 255])],
        ..ViewerConfig::new()
    };
    let report = reconciler.submit(config).await;
    assert_eq!(report.stats.field_mutations, 1);
    assert_eq!(engine.mesh("lh.pial").unwrap().rgba255, [0, 0, 255, 255]);
}

// ── Options ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_options_split_between_merge_and_setters() {
    let (engine, reconciler) = setup();
    let options = ViewerOptions::new()
        .with_crosshair_color([0.0, 1.0, 0.0, 1.0])
        .with_crosshair_width(3.0)
        .with_native("backColor", json!([1, 1, 1, 1]))
        .with_native("isColorbar", json!(true));
    let report = reconciler
        .submit(ViewerConfig {
            options,
            ..ViewerConfig::new()
        })
        .await;

    assert_eq!(report.stats.option_merges, 1);
    assert_eq!(report.stats.setter_calls, 2);
    let merged = engine.options();
    assert_eq!(merged["backColor"], json!([1, 1, 1, 1]));
    assert!(!merged.contains_key("crosshairColor"));
    assert!(!merged.contains_key("crosshairWidth"));
    let setters = engine.setters();
    assert_eq!(setters.crosshair_color, [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(setters.crosshair_width, 3.0);
}

#[tokio::test]
async fn test_setter_fires_only_on_change() {
    let (engine, reconciler) = setup();
    let config = |width: f32| ViewerConfig {
        options: ViewerOptions::new()
            .with_crosshair_width(width)
            .with_native("isColorbar", json!(true)),
        ..ViewerConfig::new()
    };
    reconciler.submit(config(1.0)).await;
    engine.drain_calls();

    let report = reconciler.submit(config(4.0)).await;
    assert_eq!(report.stats.setter_calls, 1);
    assert_eq!(report.stats.option_merges, 0);
    assert_eq!(engine.calls(), vec![EngineCall::SetCrosshairWidth { width: 4.0 }]);
}

#[tokio::test]
async fn test_malformed_setter_value_reported() {
    let (engine, reconciler) = setup();
    let options = ViewerOptions::from_json(r#"{ "crosshairColor": [1, 0], "textHeight": 0.04 }"#).unwrap();
    let report = reconciler
        .submit(ViewerConfig {
            options,
            ..ViewerConfig::new()
        })
        .await;

    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, ReconcileError::InvalidOption { key, .. } if key == "crosshairColor")));
    assert_eq!(engine.setters().crosshair_color, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(engine.options()["textHeight"], json!(0.04));
}

// ── Report sink ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_sink_receives_reports() {
    let engine = Arc::new(MemoryEngine::new());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let reconciler = Reconciler::new(Arc::clone(&engine)).with_sink(tx);
    engine.fail_loads("x.nii", "gone");

    reconciler.submit(volumes(&["x.nii"])).await;
    let reported = rx.recv().await.unwrap();
    assert_eq!(reported.locator(), Some("x.nii"));
    assert_eq!(reported.severity(), Severity::Error);
}
