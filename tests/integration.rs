use std::{path::PathBuf, time::Instant};

use ocrkit::{models::ModelSuite, DetectionOptions, RapidOCRBuilder};

// Needs the latin v5 suite and a sample image under tests/data. Execution
// providers that fail to load fall back to the CPU silently, so this only
// shows the configured providers don't crash.
#[test]
#[ignore = "needs model files under tests/data/models"]
fn real_models_read_sample_image() {
    let _ = env_logger::builder().is_test(true).try_init();

    let image = image::open("tests/data/test_image.png").expect("Failed to load test image");
    let cache = PathBuf::from(std::env!("CARGO_TARGET_TMPDIR")).join(".engine_cache");
    std::fs::create_dir_all(&cache).expect("Failed to create temp dir");
    let ocr = RapidOCRBuilder::new()
        .models_dir("tests/data/models", ModelSuite::V5_LATIN)
        .with_engine_cache_path(cache)
        .max_side_len(2048)
        .build()
        .expect("Failed to build engine");

    let start = Instant::now();
    let result = ocr.detect(&image, &DetectionOptions::default());
    log::debug!("{:?}", start.elapsed());
    log::debug!("{result}");

    assert!(!result.text_blocks.is_empty());
    assert!(result.text_blocks.iter().any(|block| !block.text_line.is_empty()));
    assert_eq!(result.text.lines().count(), result.text_blocks.len());
}
