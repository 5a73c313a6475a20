use std::path::PathBuf;

use ocrkit::{models::DEFAULT_MODELS_DIR, DetectionOptions, RapidOCRBuilder};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let images = std::env::args().skip(1).collect::<Vec<_>>();
    if images.is_empty() {
        eprintln!("usage: ocrkit <image>...");
        eprintln!("models are read from {DEFAULT_MODELS_DIR}");
        std::process::exit(2);
    }

    let cache = PathBuf::from(".cache");
    std::fs::create_dir_all(&cache).expect("Failed to create engine cache dir");
    let builder = RapidOCRBuilder::new().with_engine_cache_path(cache);
    #[cfg(feature = "debug")]
    let builder = builder.with_observer(
        ocrkit::observer::ImageDumpObserver::new("debug_images")
            .expect("Failed to create debug image dir"),
    );
    let ocr = builder.build().expect("Failed to build engine");

    let options = DetectionOptions::default();
    for path in images {
        let image = match image::open(&path) {
            Ok(image) => image,
            Err(err) => {
                log::error!("Failed to load {path}: {err}");
                continue;
            }
        };
        let result = ocr.detect(&image, &options);
        log::debug!("{result}");
        println!("== {path} ({:.1}ms)", result.total_time_ms);
        print!("{}", result.text);
    }
}
