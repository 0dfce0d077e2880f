mod common;

use cropyield::core::ModelTrainer;
use cropyield::{
    FieldDataReader, FieldObservation, ModelArtifact, PipelineConfig, YieldError, YieldPredictor,
    EXPECTED_FEATURES,
};
use std::io::Write;

fn config() -> PipelineConfig {
    PipelineConfig {
        n_trees: 30,
        ..PipelineConfig::default()
    }
}

/// One observation per sampled pixel; yield grows with NDVI
fn observations() -> Vec<FieldObservation> {
    let mut out = Vec::new();
    for row in (0..common::SIZE).step_by(3) {
        for col in (0..common::SIZE).step_by(2) {
            let (lon, lat) = common::pixel_center(row, col);
            out.push(FieldObservation {
                lat,
                lon,
                observed_yield: 1.0 + 6.0 * common::ndvi_at(col),
            });
        }
    }
    out
}

#[test]
fn test_train_is_deterministic() {
    common::init_logging();
    let config = config();
    let engine = common::engine(&config);
    let observations = observations();

    let first = ModelTrainer::new(&config)
        .train(&engine, &observations, 2024)
        .unwrap();
    let second = ModelTrainer::new(&config)
        .train(&engine, &observations, 2024)
        .unwrap();

    assert_eq!(first.report, second.report);
    assert_eq!(first.artifact, second.artifact);

    let n = observations.len();
    let n_test = (0.2 * n as f64).ceil() as usize;
    assert_eq!(first.report.n_test, n_test);
    assert_eq!(first.report.n_train, n - n_test);
    assert!(first.report.r2 > 0.8, "r2 = {}", first.report.r2);
    assert!(first.report.mae.is_finite());
    assert_eq!(first.artifact.feature_names, EXPECTED_FEATURES);
}

#[test]
fn test_trained_model_round_trips_into_prediction() {
    common::init_logging();
    let config = config();
    let engine = common::engine(&config);

    let outcome = ModelTrainer::new(&config)
        .train(&engine, &observations(), 2024)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("yield.json");
    outcome.artifact.save(&path).unwrap();
    assert_eq!(ModelArtifact::load(&path).unwrap(), outcome.artifact);

    let predictor = YieldPredictor::from_path(&path, config.clone()).unwrap();
    let regions = vec![
        common::block("Low", 0..5, 0..4),
        common::block("High", 0..5, 16..20),
    ];
    let result = predictor.predict_regions(&engine, &regions, 2024).unwrap();

    assert_eq!(result.len(), 2);
    assert!(result.yields().iter().all(|y| y.is_finite()));
    assert!(
        result.rows[1].predicted_yield > result.rows[0].predicted_yield,
        "{:?}",
        result.yields()
    );
}

#[test]
fn test_training_from_csv() {
    common::init_logging();
    let config = config();
    let engine = common::engine(&config);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Farmer,Latitude,Longitude,Estimated /Observed Yield 2023").unwrap();
    for (i, o) in observations().iter().enumerate() {
        writeln!(file, "F{},{},{},{}", i, o.lat, o.lon, o.observed_yield).unwrap();
    }
    writeln!(file, "broken,,,").unwrap();
    file.flush().unwrap();

    let loaded = FieldDataReader::new().read_path(file.path()).unwrap();
    assert_eq!(loaded.len(), observations().len());

    let outcome = ModelTrainer::new(&config).train(&engine, &loaded, 2024).unwrap();
    assert!(outcome.report.n_train > 0);
}

#[test]
fn test_points_outside_the_grid_are_dropped() {
    let config = config();
    let engine = common::engine(&config);

    // Only one observation lands on the grid: nothing to split
    let observations = vec![
        FieldObservation {
            lat: 25.95,
            lon: 85.05,
            observed_yield: 3.0,
        },
        FieldObservation {
            lat: 10.0,
            lon: 70.0,
            observed_yield: 2.0,
        },
    ];
    let result = ModelTrainer::new(&config).train(&engine, &observations, 2024);
    assert!(matches!(result, Err(YieldError::InsufficientData(_))));
}
