use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use angle_net::{aggregate_angles, AngleNet};
use crnn_net::CrnnNet;
use dbnet::{find_text_boxes, DbNet};

pub mod angle_net;
pub mod contours;
pub mod crnn_net;
pub mod crop;
pub mod dbnet;
mod error;
pub mod geometry;
pub mod models;
pub mod observer;
mod result;
pub mod session;
pub mod util;

use crop::{rotate_crop, DEFAULT_VERTICAL_ASPECT_RATIO};
pub use error::{OcrError, Result};
use image::{imageops, DynamicImage, Rgb, RgbImage};
use models::{ModelSuite, DEFAULT_MODELS_DIR};
use observer::{NoopObserver, Observer, Stage};
use rayon::prelude::*;
pub use result::*;
use session::{ModelKind, OnnxModel};
use tracing::instrument;
use util::{make_padding, Scale};

pub use ort as runtime;

pub struct RapidOCRBuilder {
    threads: usize,
    models_dir: PathBuf,
    suite: ModelSuite,
    det_path: Option<PathBuf>,
    cls_path: Option<PathBuf>,
    rec_path: Option<PathBuf>,
    keys_path: Option<PathBuf>,
    use_classifier: bool,
    max_side_len: u32,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
    observer: Arc<dyn Observer>,
}

impl RapidOCRBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Looks up every model of `suite` in `dir`. Paths set explicitly with the
    /// other methods still win.
    pub fn models_dir(mut self, dir: impl Into<PathBuf>, suite: ModelSuite) -> Self {
        self.models_dir = dir.into();
        self.suite = suite;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn cls_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.cls_path = Some(path.into());
        self.use_classifier = true;
        self
    }

    pub fn without_cls_model(mut self) -> Self {
        self.use_classifier = false;
        self
    }

    /// Recognizer model. Without [`keys_file`](Self::keys_file) the vocabulary
    /// is read from the model's metadata.
    pub fn rec_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.rec_path = Some(path.into());
        self
    }

    pub fn keys_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.keys_path = Some(path.into());
        self
    }

    pub fn max_side_len(mut self, max_side_len: u32) -> Self {
        self.max_side_len = max_side_len;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    fn load(&self, kind: ModelKind, path: &Path) -> Result<OnnxModel> {
        OnnxModel::load(
            kind,
            path,
            self.threads,
            &self.execution_providers,
            self.cache_path.as_deref(),
        )
    }

    #[instrument(skip(self), level = "debug")]
    fn init_models(&mut self) -> Result<(DbNet, Option<AngleNet>, CrnnNet)> {
        let suite_paths = self.suite.paths(&self.models_dir);
        let det_path = self.det_path.take().unwrap_or(suite_paths.detector);
        let cls_path = self.cls_path.take().unwrap_or(suite_paths.classifier);
        let keys_path = match (self.keys_path.take(), &self.rec_path) {
            (Some(keys), _) => Some(keys),
            (None, Some(_)) => None,
            (None, None) => suite_paths.keys,
        };
        let rec_path = self.rec_path.take().unwrap_or(suite_paths.recognizer);

        let det_model = DbNet::new(self.load(
            ModelKind::Detector {
                max_side_len: self.max_side_len,
            },
            &det_path,
        )?);
        let cls_model = if self.use_classifier {
            Some(AngleNet::new(self.load(ModelKind::Classifier, &cls_path)?))
        } else {
            None
        };
        let rec_model = CrnnNet::load(
            self.load(ModelKind::Recognizer, &rec_path)?,
            keys_path.as_deref(),
        )?;

        Ok((det_model, cls_model, rec_model))
    }

    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<RapidOCR> {
        let (det_model, cls_model, rec_model) = self.init_models()?;
        Ok(RapidOCR::new(det_model, cls_model, rec_model).with_shared_observer(self.observer))
    }
}

impl Default for RapidOCRBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            suite: ModelSuite::default(),
            det_path: None,
            cls_path: None,
            rec_path: None,
            keys_path: None,
            use_classifier: true,
            max_side_len: 1024,
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
            observer: Arc::new(NoopObserver),
        }
    }
}

pub struct RapidOCR {
    det_model: DbNet,
    cls_model: Option<AngleNet>,
    rec_model: CrnnNet,
    observer: Arc<dyn Observer>,
}

impl RapidOCR {
    pub fn new(det_model: DbNet, cls_model: Option<AngleNet>, rec_model: CrnnNet) -> Self {
        Self {
            det_model,
            cls_model,
            rec_model,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(self, observer: impl Observer + 'static) -> Self {
        self.with_shared_observer(Arc::new(observer))
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs the whole pipeline on one image.
    ///
    /// Never fails: a detector failure gives an empty result and a failed
    /// region keeps its block with a skipped angle or an empty line. Box
    /// coordinates are in `image`'s pixel space and blocks come in detection
    /// order.
    #[instrument(skip(self, image))]
    pub fn detect(&self, image: &DynamicImage, options: &DetectionOptions) -> OcrResult {
        let start = Instant::now();
        let reached = |stage: Stage| self.observer.on_stage(stage, start.elapsed());

        let image = image.to_rgb8();
        let max_side = image.width().max(image.height());
        if max_side == 0 {
            log::warn!("Empty image, nothing to detect");
            return OcrResult::empty(elapsed_ms(start.elapsed()));
        }
        let long_side = if options.img_resize == 0 || options.img_resize > max_side {
            max_side
        } else {
            options.img_resize
        };
        let resize = long_side + 2 * options.padding;

        let padded = make_padding(&image, options.padding);
        self.observer.on_padded_image(&padded);
        let scale = Scale::new(padded.width(), padded.height(), resize);
        reached(Stage::Resized);

        let detect_start = Instant::now();
        let pred = match self.det_model.probability_map(&padded, &scale) {
            Ok(pred) => pred,
            Err(err) => {
                log::warn!("Text detection failed, returning empty result: {err}");
                return OcrResult::empty(elapsed_ms(start.elapsed()));
            }
        };
        self.observer.on_probability_map(pred.view());
        let padded_boxes = find_text_boxes(pred.view(), &scale, options);
        let padding = options.padding as f32;
        let text_boxes = padded_boxes
            .iter()
            .map(|text_box| text_box.translate(-padding, -padding))
            .collect::<Vec<_>>();
        let detect_time_ms = elapsed_ms(detect_start.elapsed());
        log::debug!(
            "Detector found {} text boxes in {detect_time_ms}ms",
            text_boxes.len()
        );
        self.observer.on_text_boxes(&text_boxes);
        reached(Stage::Detected);

        let crops = padded_boxes
            .par_iter()
            .map(|text_box| {
                rotate_crop(&padded, &text_box.points, options.vertical_aspect_ratio)
                    .unwrap_or_else(|err| {
                        log::warn!("Failed to crop text box: {err}");
                        RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]))
                    })
            })
            .collect::<Vec<_>>();
        reached(Stage::Cropped);

        let angles = match &self.cls_model {
            Some(cls_model) if options.do_angle => {
                let angles = crops
                    .par_iter()
                    .map(|crop| cls_model.get_angle(crop))
                    .collect::<Vec<_>>();
                aggregate_angles(&angles, options.most_angle)
            }
            _ => vec![Angle::skipped(0.0); crops.len()],
        };
        reached(Stage::Classified);

        let crops = crops
            .into_par_iter()
            .zip(angles.par_iter())
            .map(|(crop, angle)| match angle.index {
                AngleIndex::Rotated => imageops::rotate180(&crop),
                _ => crop,
            })
            .collect::<Vec<_>>();
        reached(Stage::Rotated);

        let text_lines = crops
            .par_iter()
            .enumerate()
            .map(|(index, crop)| {
                self.observer.on_region(index, crop);
                self.rec_model.get_text_line(crop)
            })
            .collect::<Vec<_>>();
        reached(Stage::Recognized);

        let text_blocks = text_boxes
            .into_iter()
            .zip(angles)
            .zip(text_lines)
            .map(|((text_box, angle), text_line)| TextBlock {
                block_time_ms: angle.time_ms + text_line.time_ms,
                text_box,
                angle,
                text_line,
            })
            .collect::<Vec<_>>();
        let text = text_blocks
            .iter()
            .map(|block| block.text() + "\n")
            .collect::<String>();
        reached(Stage::Assembled);

        OcrResult {
            text_blocks,
            detect_time_ms,
            total_time_ms: elapsed_ms(start.elapsed()),
            text,
        }
    }
}

fn elapsed_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOptions {
    /// White border added around the image before detection.
    pub padding: u32,
    /// Target long side of the detector input, `0` keeps the original size.
    /// Images are never scaled up past their own long side.
    pub img_resize: u32,
    pub box_score_thresh: f32,
    pub box_thresh: f32,
    pub unclip_ratio: f32,
    pub do_angle: bool,
    pub most_angle: bool,
    /// Crops at least this many times taller than wide are rotated by 90
    /// degrees before recognition.
    pub vertical_aspect_ratio: f32,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            padding: 50,
            img_resize: 1024,
            box_score_thresh: 0.5,
            box_thresh: 0.3,
            unclip_ratio: 1.6,
            do_angle: true,
            most_angle: true,
            vertical_aspect_ratio: DEFAULT_VERTICAL_ASPECT_RATIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

pub const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];
