use serde_json::json;

use nvsync_harness::{parse_script, replay, FailingLoad, Harness, HarnessSettings};

#[tokio::test]
async fn test_replay_volume_script() {
    let harness = Harness::default();
    let steps = parse_script(
        r#"[
            { "command": "set_volumes", "volumes": [
                { "url": "/images/mni152.nii.gz", "colormap": "gray" },
                { "url": "/images/hippo.nii.gz", "colormap": "red", "opacity": 0.5 }
            ]},
            { "command": "set_volumes", "volumes": [
                { "url": "/images/mni152.nii.gz", "colormap": "gray" },
                { "url": "/images/hippo.nii.gz", "colormap": "red", "opacity": 0.9 }
            ]},
            { "command": "get_volume", "name": "hippo.nii.gz" },
            { "command": "loaded_volumes" }
        ]"#,
    )
    .unwrap();

    let outcomes = replay(&harness, &steps).await;
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let second = outcomes[1].result.as_ref().unwrap();
    assert_eq!(second["engine_calls"], 1);

    let hippo = outcomes[2].result.as_ref().unwrap();
    assert_eq!(hippo["colormap"], "red");
    assert!((hippo["opacity"].as_f64().unwrap() - 0.9).abs() < 1e-6);

    assert_eq!(
        outcomes[3].result.as_ref().unwrap(),
        &json!(["mni152.nii.gz", "hippo.nii.gz"])
    );
}

#[tokio::test]
async fn test_failing_step_does_not_stop_replay() {
    let harness = Harness::default();
    let steps = parse_script(
        r#"[
            { "command": "get_volume", "name": "missing.nii" },
            { "command": "set_volumes", "volumes": [{ "url": "a.nii" }] },
            { "command": "get_volume", "name": "a.nii" }
        ]"#,
    )
    .unwrap();

    let outcomes = replay(&harness, &steps).await;
    assert!(!outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert!(outcomes[2].is_ok());
}

#[tokio::test]
async fn test_settings_inject_failures() {
    let settings = HarnessSettings {
        failing_loads: vec![FailingLoad {
            locator: "bad.nii".to_string(),
            reason: "HTTP 404".to_string(),
        }],
        ..HarnessSettings::default()
    };
    let harness = Harness::from_settings(&settings);

    let summary = harness
        .set_volumes(r#"[{ "url": "bad.nii" }, { "url": "good.nii" }]"#)
        .await
        .unwrap();
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("bad.nii"));
    assert_eq!(harness.loaded_volume_names(), vec!["good.nii"]);

    let report = harness.last_report().unwrap();
    assert_eq!(report["errors"][0]["kind"], "resource_load");
    assert_eq!(report["errors"][0]["cause"]["error"], "load");
}

#[tokio::test]
async fn test_meshes_and_options_commands() {
    let harness = Harness::default();
    harness
        .set_meshes(r#"[{ "url": "/meshes/lh.pial", "rgba255": [200, 200, 255, 255],
                          "layers": [{ "url": "/meshes/lh.curv", "colormap": "gray", "opacity": 0.7 }] }]"#)
        .await
        .unwrap();
    let summary = harness
        .set_options(r#"{ "crosshairWidth": 2, "backColor": [0, 0, 0, 1] }"#)
        .await
        .unwrap();
    assert_eq!(summary.engine_calls, 2);

    let mesh = harness.get_mesh("lh.pial").unwrap();
    assert_eq!(mesh["rgba255"], json!([200, 200, 255, 255]));
    assert_eq!(mesh["layers"][0]["colormap"], "gray");

    assert_eq!(harness.engine().setters().crosshair_width, 2.0);
    assert_eq!(harness.engine().options()["backColor"], json!([0, 0, 0, 1]));

    // Setting options again leaves meshes alone.
    let summary = harness.set_options(r#"{ "crosshairWidth": 2, "backColor": [0, 0, 0, 1] }"#).await.unwrap();
    assert_eq!(summary.engine_calls, 0);
}
