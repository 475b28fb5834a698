use assert_cmd::Command;
use insta::assert_json_snapshot;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/highway.json");

fn platesense() -> Command {
    let mut cmd = Command::cargo_bin("platesense").unwrap();
    // Keep the user's own config file out of the picture
    cmd.env("PLATESENSE_CONFIG", "/nonexistent/platesense.toml");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run_json(args: &[&str]) -> Value {
    let output = platesense().args(args).output().expect("failed to run platesense");
    serde_json::from_slice(&output.stdout).expect("invalid json")
}

#[test]
fn list_prints_consolidated_plates() {
    platesense()
        .args(["list", FIXTURE])
        .assert()
        .success()
        .stdout(contains("Plates (2): highway.mp4"))
        .stdout(contains("AB123CD"))
        .stdout(contains("XY98ZT"))
        .stdout(contains("frames 0-30 (5)"))
        .stdout(contains("https://example.test/crops/1-4.jpg"))
        .stdout(contains("inline image"))
        .stdout(contains("Failed recognitions:"))
        .stdout(contains("12345").not());
}

#[test]
fn list_raw_is_tab_separated() {
    platesense()
        .args(["list", "--raw", FIXTURE])
        .assert()
        .success()
        .stdout(contains("#1\tAB123CD\tAB123CD\t0.91\t0\t30"))
        .stdout(contains("#3\tXY98ZT\tXY98ZT\t0.88\t10\t12"));
}

#[test]
fn list_json_has_result_set_shape() {
    let json = run_json(&["list", "--json", FIXTURE]);
    assert_eq!(json["filename"], "highway.mp4");
    assert_eq!(json["fps"], 25.0);
    assert_eq!(json["plates"].as_array().unwrap().len(), 2);
    assert_eq!(json["plates"][0]["track_id"]["id"], 1);
    assert_eq!(json["plates"][0]["best"]["text"], "AB123CD");
    assert_eq!(json["plates"][0]["detections"].as_array().unwrap().len(), 5);
    assert_eq!(json["failures"].as_array().unwrap().len(), 1);
    assert_eq!(json["raw_boxes"].as_array().unwrap().len(), 1);
    assert_eq!(json["skipped_records"], 0);
}

#[test]
fn empty_result_shows_message_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.json");
    std::fs::write(
        &path,
        r#"[{"track_id": 1, "lp_text": "12345", "box": [0, 0, 1, 1]}, {"error": "OCR processing failed"}]"#,
    )
    .unwrap();

    platesense()
        .args(["list", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(contains("No valid license plates recognized."));
}

#[test]
fn search_ranks_results() {
    let json = run_json(&["search", "--json", FIXTURE, "xy9"]);
    let texts: Vec<&str> = json["plates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["best"]["text"].as_str().unwrap())
        .collect();
    assert_json_snapshot!(texts, @r###"
    [
      "XY98ZT",
      "AB123CD"
    ]
    "###);
}

#[test]
fn overlay_by_frame() {
    platesense()
        .args(["overlay", FIXTURE, "--frame", "2"])
        .assert()
        .success()
        .stdout(contains("Frame 2 (0.08s):"))
        .stdout(contains("AB123CD  at (110.0, 200.0)  interpolated"));
}

#[test]
fn overlay_by_time_uses_reported_fps() {
    let json = run_json(&["overlay", FIXTURE, "--time", "0.42", "--raw-boxes", "--json"]);
    assert_eq!(json["frame"], 11);
    assert_eq!(json["boxes"].as_array().unwrap().len(), 1);
    assert_eq!(json["boxes"][0]["label"], "XY98ZT");
    assert_eq!(json["boxes"][0]["interpolated"], true);
    assert_eq!(json["raw_boxes"].as_array().unwrap().len(), 0);
}

#[test]
fn overlay_shows_raw_boxes_on_request() {
    platesense()
        .args(["overlay", FIXTURE, "--frame", "10", "--raw-boxes"])
        .assert()
        .success()
        .stdout(contains("XY98ZT"))
        .stdout(contains("Raw boxes:"))
        .stdout(contains("at (398.0, 299.0)"));
}

#[test]
fn overlay_outside_any_track_fails() {
    platesense()
        .args(["overlay", FIXTURE, "--frame", "500"])
        .assert()
        .code(1);
}

#[test]
fn overlay_requires_frame_or_time() {
    platesense()
        .args(["overlay", FIXTURE])
        .assert()
        .failure()
        .stderr(contains("--frame"));
}

#[test]
fn missing_input_is_reported() {
    platesense()
        .args(["list", "/nonexistent/results.json"])
        .assert()
        .code(2)
        .stderr(contains("failed to read /nonexistent/results.json"));
}

#[test]
fn invalid_json_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    platesense()
        .args(["list", path.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(contains("is not an inference response"));
}

#[test]
fn malformed_records_are_skipped_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(
        &path,
        r#"[{"track_id": 1, "lp_text": "AB123", "box": [0, 0, 1, 1]}, {"track_id": 2, "lp_text": "CD456", "box": [1, 2, 3]}]"#,
    )
    .unwrap();

    platesense()
        .args(["list", "--raw", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("AB123"))
        .stdout(contains("CD456").not())
        .stderr(contains("skipping malformed detection record"));
}

#[test]
fn schema_prints_json_schema() {
    let json = run_json(&["schema"]);
    assert_eq!(json["title"], "ResultSet");
    assert!(json["definitions"]["TrackedPlate"].is_object());
}

#[test]
fn no_color_flag_is_accepted() {
    platesense()
        .args(["--no-color", "list", FIXTURE])
        .assert()
        .success()
        .stdout(contains("\u{1b}[").not());
}

#[test]
fn overlay_scales_to_display_size() {
    platesense()
        .args(["overlay", FIXTURE, "--frame", "10", "--raw-boxes"])
        .args(["--natural", "800x600", "--display", "400x300"])
        .assert()
        .success()
        .stdout(contains("XY98ZT  at (200.0, 150.0)  detected"))
        .stdout(contains("at (199.0, 149.5)"));
}

#[test]
fn display_size_needs_natural_size() {
    platesense()
        .args(["overlay", FIXTURE, "--frame", "10", "--display", "400x300"])
        .assert()
        .failure()
        .stderr(contains("--natural"));
}

#[test]
fn off_type_record_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("float-frame.json");
    std::fs::write(
        &path,
        r#"{"results": [{"track_id": 1, "lp_text": "AB123", "box": [0, 0, 1, 1], "frame": 2}, {"track_id": 1, "lp_text": "AB123", "box": [0, 0, 1, 1], "frame": 4.0}]}"#,
    )
    .unwrap();

    let output = platesense()
        .args(["list", "--json", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["plates"].as_array().unwrap().len(), 1);
    assert_eq!(json["skipped_records"], 1);
}
