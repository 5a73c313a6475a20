//! Hooks for watching a detection pass from the outside, e.g. to dump the
//! intermediate images while tuning thresholds.

use std::time::Duration;

use image::RgbImage;
use ndarray::ArrayView2;

use crate::TextBox;

/// Pipeline states, in the order a detection pass goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resized,
    Detected,
    Cropped,
    Classified,
    Rotated,
    Recognized,
    Assembled,
}

/// Every method defaults to doing nothing. `on_region` is called from worker
/// threads.
pub trait Observer: Send + Sync {
    fn on_padded_image(&self, _image: &RgbImage) {}

    fn on_probability_map(&self, _map: ArrayView2<f32>) {}

    /// Boxes in original image coordinates, in detection order.
    fn on_text_boxes(&self, _boxes: &[TextBox]) {}

    /// A region crop after the angle correction, right before recognition.
    fn on_region(&self, _index: usize, _image: &RgbImage) {}

    fn on_stage(&self, _stage: Stage, _elapsed: Duration) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

#[cfg(feature = "debug")]
pub use dump::ImageDumpObserver;

#[cfg(feature = "debug")]
mod dump {
    use std::path::PathBuf;

    use super::*;
    use crate::util::to_luma_image;

    /// Writes `padded.png`, `probability_map.png` and `region_<n>.png` into a
    /// directory.
    #[derive(Debug, Clone)]
    pub struct ImageDumpObserver {
        dir: PathBuf,
    }

    impl ImageDumpObserver {
        pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
            let dir = dir.into();
            std::fs::create_dir_all(&dir)?;
            Ok(Self { dir })
        }

        fn save(&self, name: &str, result: image::ImageResult<()>) {
            if let Err(err) = result {
                log::warn!("Failed to write {name} to {}: {err}", self.dir.display());
            }
        }
    }

    impl Observer for ImageDumpObserver {
        fn on_padded_image(&self, image: &RgbImage) {
            self.save("padded.png", image.save(self.dir.join("padded.png")));
        }

        fn on_probability_map(&self, map: ArrayView2<f32>) {
            let path = self.dir.join("probability_map.png");
            self.save("probability_map.png", to_luma_image(map).save(path));
        }

        fn on_text_boxes(&self, boxes: &[TextBox]) {
            log::debug!("{} text boxes", boxes.len());
        }

        fn on_region(&self, index: usize, image: &RgbImage) {
            let name = format!("region_{index}.png");
            self.save(&name, image.save(self.dir.join(&name)));
        }

        fn on_stage(&self, stage: Stage, elapsed: Duration) {
            log::debug!("{stage:?} after {elapsed:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<Stage>>,
    }

    impl Observer for Recorder {
        fn on_stage(&self, stage: Stage, _elapsed: Duration) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn defaults_are_no_ops() {
        let observer: &dyn Observer = &NoopObserver;
        observer.on_padded_image(&RgbImage::new(1, 1));
        observer.on_text_boxes(&[]);
        observer.on_stage(Stage::Assembled, Duration::ZERO);
    }

    #[test]
    fn overridden_methods_are_called() {
        let recorder = Recorder::default();
        let observer: &dyn Observer = &recorder;
        observer.on_stage(Stage::Resized, Duration::ZERO);
        observer.on_region(0, &RgbImage::new(1, 1));
        observer.on_stage(Stage::Detected, Duration::ZERO);
        assert_eq!(*recorder.stages.lock().unwrap(), vec![Stage::Resized, Stage::Detected]);
    }
}
