//! End-to-end fixture tests for crossview-rs.
//!
//! Each fixture is a sequence of frames with per-view detections and the
//! expected cross-view pairs and global identities after every frame.
//!
//! Run with: cargo test --release fixture

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crossview_rs::{
    BoundingBox, CorrespondenceMatcher, Detection, FeatureVector, IdentityKey, IdentityRegistry,
    MatcherConfig, TrackId, View,
};

// ============================================================================
// Fixture JSON Schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct Fixture {
    matcher_config: MatcherConfig,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    frame_id: usize,
    inputs: Inputs,
    outputs: Outputs,
}

#[derive(Debug, Deserialize)]
struct Inputs {
    view1: Vec<DetectionJson>,
    view2: Vec<DetectionJson>,
}

#[derive(Debug, Deserialize)]
struct DetectionJson {
    track_id: TrackId,
    field_coords: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct Outputs {
    pairs: Vec<(TrackId, TrackId)>,
    global_ids: Vec<GlobalIdJson>,
}

#[derive(Debug, Deserialize)]
struct GlobalIdJson {
    view: View,
    track_id: TrackId,
    global_id: u64,
}

// ============================================================================
// Test Helpers
// ============================================================================

fn find_testdata_dir() -> PathBuf {
    let candidates = [
        PathBuf::from("testdata/fixtures"),
        PathBuf::from("../testdata/fixtures"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/fixtures"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return candidate.clone();
        }
    }
    panic!("Could not find testdata/fixtures directory");
}

fn load_fixture(scenario: &str) -> Fixture {
    let path = find_testdata_dir().join(format!("fixture_{}.json", scenario));

    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture file {:?}: {}", path, e));

    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture file {:?}: {}", path, e))
}

fn to_detections(view: View, dets: &[DetectionJson]) -> Vec<Detection> {
    dets.iter()
        .map(|d| {
            let [x, y] = d.field_coords;
            Detection::new(view, d.track_id, BoundingBox::new(x - 10.0, y - 40.0, x + 10.0, y), 0.9)
                .expect("valid detection")
                .with_features(FeatureVector::zeros().with_field_coords(d.field_coords))
        })
        .collect()
}

/// Run one fixture through matcher + registry the way the pipeline does:
/// register accepted pairs first, then resolve unmatched detections.
fn run_fixture(scenario: &str) {
    let fixture = load_fixture(scenario);
    let matcher = CorrespondenceMatcher::new(fixture.matcher_config).expect("valid matcher config");
    let mut registry = IdentityRegistry::new();

    for (step_idx, step) in fixture.steps.iter().enumerate() {
        let first = to_detections(View::First, &step.inputs.view1);
        let second = to_detections(View::Second, &step.inputs.view2);

        let matches = matcher.match_frame(&first, &second).expect("matching succeeds");

        let pairs: Vec<(TrackId, TrackId)> = matches
            .pairs
            .iter()
            .map(|p| (first[p.first].track_id, second[p.second].track_id))
            .collect();
        assert_eq!(
            pairs, step.outputs.pairs,
            "Step {} frame {}: pair mismatch",
            step_idx, step.frame_id
        );

        for p in &matches.pairs {
            registry.register(first[p.first].key(), second[p.second].key());
        }
        for &i in &matches.unmatched_first {
            registry.lookup(first[i].key());
        }
        for &i in &matches.unmatched_second {
            registry.lookup(second[i].key());
        }

        for expected in &step.outputs.global_ids {
            let key = IdentityKey::new(expected.view, expected.track_id);
            assert_eq!(
                registry.get(key),
                Some(expected.global_id),
                "Step {} frame {}: global id mismatch for {}",
                step_idx,
                step.frame_id,
                key
            );
        }
    }
}

// ============================================================================
// Fixture Tests
// ============================================================================

#[test]
fn test_fixture_crossing_players() {
    run_fixture("crossing_players");
}
