use std::{path::Path, time::Instant};

use image::{imageops::FilterType, RgbImage};
use ndarray::{ArrayView2, Axis};
use tracing::instrument;

use crate::{session::Inference, util::subtract_mean_normalize, OcrError, Result, TextLine};

const DEST_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

pub const CHARACTER_METADATA_KEY: &str = "character";

const BLANK: &str = "#";
const SPACE: &str = " ";

/// Index to glyph table of the recognizer. Index 0 is the CTC blank and the
/// last entry is a space.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    keys: Vec<String>,
}

impl Vocabulary {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = std::iter::once(BLANK.to_string())
            .chain(keys.into_iter().map(Into::into))
            .chain(std::iter::once(SPACE.to_string()))
            .collect::<Vec<_>>();
        log::debug!("Vocabulary has {} keys", keys.len());
        Self { keys }
    }

    /// One glyph per line. Empty lines are kept so indices line up with the
    /// model's output.
    pub fn from_keys_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => OcrError::KeysNotFound(path.to_path_buf()),
            _ => OcrError::Io(err),
        })?;
        let contents = contents.strip_prefix('\u{feff}').unwrap_or(&contents);
        Ok(Self::from_keys(contents.lines()))
    }

    /// Newline separated glyphs embedded in the model. Empty entries are
    /// dropped.
    pub fn from_metadata(characters: &str) -> Self {
        Self::from_keys(
            characters
                .split(['\r', '\n'])
                .filter(|key| !key.is_empty()),
        )
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }
}

/// Greedy CTC decode of a `[time, vocabulary]` score matrix: per step take
/// the first maximum, drop blanks, out-of-range indices and repeats of the
/// previous step's pick.
pub fn ctc_greedy_decode(scores: ArrayView2<f32>, vocabulary: &Vocabulary) -> TextLine {
    let mut chars = Vec::new();
    let mut char_scores = Vec::new();
    let mut last_index = 0;

    for step in scores.axis_iter(Axis(0)) {
        let mut max_index = 0;
        let mut max_value = f32::NEG_INFINITY;
        for (index, &value) in step.iter().enumerate() {
            if value > max_value {
                max_index = index;
                max_value = value;
            }
        }

        if max_index != last_index {
            if let Some(key) = vocabulary.get(max_index).filter(|_| max_index > 0) {
                chars.push(key.to_string());
                char_scores.push(max_value);
            }
        }
        last_index = max_index;
    }

    TextLine {
        chars,
        char_scores,
        time_ms: 0.0,
    }
}

pub struct CrnnNet {
    model: Box<dyn Inference>,
    vocabulary: Vocabulary,
}

impl CrnnNet {
    pub fn new(model: impl Inference + 'static, vocabulary: Vocabulary) -> Self {
        Self {
            model: Box::new(model),
            vocabulary,
        }
    }

    /// Reads the vocabulary from `keys_path`, or from the model's
    /// `character` metadata when no path is given.
    #[instrument(level = "debug", skip(model))]
    pub fn load(model: impl Inference + 'static, keys_path: Option<&Path>) -> Result<Self> {
        let vocabulary = match keys_path {
            Some(path) => Vocabulary::from_keys_file(path)?,
            None => {
                let characters = model
                    .metadata(CHARACTER_METADATA_KEY)?
                    .ok_or(OcrError::MissingVocabulary)?;
                Vocabulary::from_metadata(&characters)
            }
        };
        Ok(Self::new(model, vocabulary))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Recognizes one region. A failed inference call yields an empty line.
    #[instrument(level = "trace", skip(self, image))]
    pub fn get_text_line(&self, image: &RgbImage) -> TextLine {
        let start = Instant::now();
        let mut line = self.recognize(image).unwrap_or_else(|err| {
            log::warn!("Text recognition failed, returning empty line: {err}");
            TextLine::default()
        });
        line.time_ms = start.elapsed().as_secs_f64() * 1000.0;
        line
    }

    fn recognize(&self, image: &RgbImage) -> Result<TextLine> {
        let scale = DEST_HEIGHT as f32 / image.height().max(1) as f32;
        let dest_width = ((image.width() as f32 * scale) as u32).clamp(1, u16::MAX as u32);
        let resized =
            image::imageops::resize(image, dest_width, DEST_HEIGHT, FilterType::CatmullRom);

        let input = subtract_mean_normalize(&resized, &MEAN_VALUES, &NORM_VALUES);
        let output = self.model.run(input)?;
        log::trace!("Output tensor size: {:?}", output.shape());

        let shape = output.shape().to_vec();
        let (steps, classes) = match shape.as_slice() {
            [.., steps, classes] => (*steps, *classes),
            _ => return Err(OcrError::UnexpectedShape(shape)),
        };
        if steps * classes != output.len() {
            return Err(OcrError::UnexpectedShape(shape));
        }
        let scores = output.into_shape((steps, classes))?;

        Ok(ctc_greedy_decode(scores.view(), &self.vocabulary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4, ArrayD, IxDyn};

    fn vocabulary() -> Vocabulary {
        Vocabulary::from_keys(["a", "b", "c"])
    }

    /// One row per step, one-hot at the given index with score `0.9`.
    fn one_hot(indices: &[usize], classes: usize) -> Array2<f32> {
        let mut scores = Array2::from_elem((indices.len(), classes), 0.01);
        for (step, &index) in indices.iter().enumerate() {
            scores[[step, index]] = 0.9;
        }
        scores
    }

    #[test]
    fn vocabulary_is_wrapped_in_blank_and_space() {
        let vocabulary = vocabulary();
        assert_eq!(vocabulary.len(), 5);
        assert_eq!(vocabulary.get(0), Some("#"));
        assert_eq!(vocabulary.get(1), Some("a"));
        assert_eq!(vocabulary.get(4), Some(" "));
        assert_eq!(vocabulary.get(5), None);
    }

    #[test]
    fn metadata_vocabulary_drops_empty_entries() {
        let vocabulary = Vocabulary::from_metadata("a\r\nb\n\nc\n");
        assert_eq!(vocabulary, Vocabulary::from_keys(["a", "b", "c"]));
    }

    #[test]
    fn missing_keys_file_is_reported() {
        let err = Vocabulary::from_keys_file(Path::new("does/not/exist.txt")).unwrap_err();
        assert!(matches!(err, OcrError::KeysNotFound(_)));
    }

    #[test]
    fn keys_file_drops_byte_order_mark() {
        let path =
            std::env::temp_dir().join(format!("ocrkit_keys_bom_{}.txt", std::process::id()));
        std::fs::write(&path, "\u{feff}a\nb\n\nc\n").unwrap();
        let vocabulary = Vocabulary::from_keys_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(vocabulary.unwrap(), Vocabulary::from_keys(["a", "b", "", "c"]));
    }

    #[test]
    fn repeats_collapse_to_one_char() {
        let line = ctc_greedy_decode(one_hot(&[1, 1, 1, 1], 5).view(), &vocabulary());
        assert_eq!(line.text(), "a");
        assert_eq!(line.char_scores, vec![0.9]);
    }

    #[test]
    fn blanks_separate_repeats() {
        let line = ctc_greedy_decode(one_hot(&[1, 0, 1, 2, 2, 0, 3], 5).view(), &vocabulary());
        assert_eq!(line.text(), "aabc");
        assert_eq!(line.chars.len(), line.char_scores.len());
    }

    #[test]
    fn leading_blanks_and_trailing_space() {
        let line = ctc_greedy_decode(one_hot(&[0, 0, 3, 4, 1], 5).view(), &vocabulary());
        assert_eq!(line.text(), "c a");
    }

    #[test]
    fn indices_outside_vocabulary_are_dropped() {
        let line = ctc_greedy_decode(one_hot(&[1, 7, 2], 8).view(), &vocabulary());
        assert_eq!(line.text(), "ab");
    }

    #[test]
    fn out_of_range_still_breaks_repeats() {
        let line = ctc_greedy_decode(one_hot(&[1, 7, 1], 8).view(), &vocabulary());
        assert_eq!(line.text(), "aa");
    }

    #[test]
    fn all_blank_is_empty() {
        let line = ctc_greedy_decode(one_hot(&[0, 0, 0], 5).view(), &vocabulary());
        assert!(line.is_empty());
    }

    #[test]
    fn recognizer_input_keeps_aspect() {
        let net = CrnnNet::new(
            |input: Array4<f32>| -> Result<ArrayD<f32>> {
                assert_eq!(input.dim(), (1, 3, 48, 192));
                let scores = one_hot(&[2, 2, 0, 3], 5);
                Ok(scores.into_shape(IxDyn(&[1, 4, 5]))?)
            },
            vocabulary(),
        );
        let line = net.get_text_line(&RgbImage::new(80, 20));
        assert_eq!(line.text(), "bc");
    }

    #[test]
    fn recognizer_failure_gives_empty_line() {
        let net = CrnnNet::new(
            |_: Array4<f32>| -> Result<ArrayD<f32>> { Err(OcrError::EmptyOutput) },
            vocabulary(),
        );
        let line = net.get_text_line(&RgbImage::new(80, 20));
        assert!(line.is_empty());
    }

    struct Embedded;

    impl Inference for Embedded {
        fn run(&self, _input: Array4<f32>) -> Result<ArrayD<f32>> {
            Err(OcrError::EmptyOutput)
        }

        fn metadata(&self, key: &str) -> Result<Option<String>> {
            Ok((key == CHARACTER_METADATA_KEY).then(|| "x\ny\nz".to_string()))
        }
    }

    #[test]
    fn vocabulary_falls_back_to_metadata() {
        let net = CrnnNet::load(Embedded, None).unwrap();
        assert_eq!(net.vocabulary(), &Vocabulary::from_keys(["x", "y", "z"]));
    }

    #[test]
    fn missing_vocabulary_is_reported() {
        let model = |_: Array4<f32>| -> Result<ArrayD<f32>> { Err(OcrError::EmptyOutput) };
        let err = CrnnNet::load(model, None).err().unwrap();
        assert!(matches!(err, OcrError::MissingVocabulary));
    }
}
