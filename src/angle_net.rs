use std::time::Instant;

use image::{imageops::FilterType, RgbImage};
use tracing::instrument;

use crate::{
    session::Inference, util::subtract_mean_normalize, Angle, AngleIndex, OcrError, Result,
};

const DEST_WIDTH: u32 = 192;
const DEST_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// Upright and upside down. Further outputs of the model are ignored.
const ANGLE_CLASSES: usize = 2;

/// Winner of the image-wide vote when both orientations score the same.
pub const MOST_ANGLE_TIE_BREAK: AngleIndex = AngleIndex::Upright;

/// Upright / upside-down text line classifier.
pub struct AngleNet {
    model: Box<dyn Inference>,
}

impl AngleNet {
    pub fn new(model: impl Inference + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    /// Classifies one region. A failed inference call degrades to a skipped
    /// angle so the region is recognized as is.
    #[instrument(level = "trace", skip(self, image))]
    pub fn get_angle(&self, image: &RgbImage) -> Angle {
        let start = Instant::now();
        match self.classify(image) {
            Ok((index, score)) => Angle {
                index,
                score,
                time_ms: start.elapsed().as_secs_f64() * 1000.0,
            },
            Err(err) => {
                log::warn!("Angle classification failed, skipping rotation: {err}");
                Angle::skipped(start.elapsed().as_secs_f64() * 1000.0)
            }
        }
    }

    fn classify(&self, image: &RgbImage) -> Result<(AngleIndex, f32)> {
        let resized =
            image::imageops::resize(image, DEST_WIDTH, DEST_HEIGHT, FilterType::CatmullRom);
        let input = subtract_mean_normalize(&resized, &MEAN_VALUES, &NORM_VALUES);
        let output = self.model.run(input)?;

        // First maximum wins.
        let (index, score) = output
            .iter()
            .copied()
            .take(ANGLE_CLASSES)
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (index, score)| match best {
                Some((_, best_score)) if score <= best_score => best,
                _ => Some((index, score)),
            })
            .ok_or(OcrError::EmptyOutput)?;

        let index = if index == 0 {
            AngleIndex::Upright
        } else {
            AngleIndex::Rotated
        };
        Ok((index, score))
    }
}

/// Applies the image-wide vote when `most_angle` is set: scores are summed
/// per orientation and the larger total is assigned to every classified
/// region. Skipped regions stay skipped.
pub fn aggregate_angles(angles: &[Angle], most_angle: bool) -> Vec<Angle> {
    if !most_angle {
        return angles.to_vec();
    }

    let total = |index: AngleIndex| -> f32 {
        angles
            .iter()
            .filter(|angle| angle.index == index)
            .map(|angle| angle.score)
            .sum()
    };
    let upright = total(AngleIndex::Upright);
    let rotated = total(AngleIndex::Rotated);
    let winner = if upright > rotated {
        AngleIndex::Upright
    } else if rotated > upright {
        AngleIndex::Rotated
    } else {
        MOST_ANGLE_TIE_BREAK
    };
    log::debug!("Angle vote: upright {upright}, rotated {rotated}, picked {winner:?}");

    angles
        .iter()
        .map(|angle| match angle.index {
            AngleIndex::Skipped => *angle,
            _ => Angle {
                index: winner,
                ..*angle
            },
        })
        .collect()
}
