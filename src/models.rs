//! File names of the PP-OCR model suites the pipeline is known to work with.
//! Fetching the files is up to the caller.

use std::path::{Path, PathBuf};

/// Where the default builder looks for [`ModelSuite::V5_LATIN`].
pub const DEFAULT_MODELS_DIR: &str = "models/v5";

const DET_V5_MOBILE: &str = "ch_PP-OCRv5_mobile_det.onnx";
const DET_V4_MOBILE: &str = "ch_PP-OCRv4_det_infer.onnx";
const DET_V3_ENGLISH: &str = "en_PP-OCRv3_det_infer.onnx";
const CLS_MOBILE: &str = "ch_ppocr_mobile_v2.0_cls_infer.onnx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSuite {
    pub name: &'static str,
    pub detector: &'static str,
    pub classifier: &'static str,
    pub recognizer: &'static str,
    /// Separate keys file. `None` means the recognizer embeds its vocabulary.
    pub keys: Option<&'static str>,
}

/// Resolved file locations of a suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub classifier: PathBuf,
    pub recognizer: PathBuf,
    pub keys: Option<PathBuf>,
}

impl ModelSuite {
    pub const V5_LATIN: ModelSuite = ModelSuite {
        name: "Latin V5 Mobile",
        detector: DET_V5_MOBILE,
        classifier: CLS_MOBILE,
        recognizer: "latin_PP-OCRv5_rec_mobile_infer.onnx",
        keys: Some("ppocrv5_latin_dict.txt"),
    };

    pub const V5_CHINESE: ModelSuite = ModelSuite {
        name: "Chinese V5 Mobile",
        detector: DET_V5_MOBILE,
        classifier: CLS_MOBILE,
        recognizer: "ch_PP-OCRv5_rec_mobile_infer.onnx",
        keys: None,
    };

    pub const V5_ENGLISH: ModelSuite = ModelSuite {
        name: "English V5 Mobile",
        detector: DET_V5_MOBILE,
        classifier: CLS_MOBILE,
        recognizer: "en_PP-OCRv5_rec_mobile_infer.onnx",
        keys: None,
    };

    pub const V4_CHINESE: ModelSuite = ModelSuite {
        name: "Chinese V4 Mobile",
        detector: DET_V4_MOBILE,
        classifier: CLS_MOBILE,
        recognizer: "ch_PP-OCRv4_rec_infer.onnx",
        keys: None,
    };

    pub const V4_ENGLISH: ModelSuite = ModelSuite {
        name: "English V4 Mobile",
        detector: DET_V3_ENGLISH,
        classifier: CLS_MOBILE,
        recognizer: "en_PP-OCRv4_rec_infer.onnx",
        keys: None,
    };

    pub const ALL: [ModelSuite; 5] = [
        Self::V5_LATIN,
        Self::V5_CHINESE,
        Self::V5_ENGLISH,
        Self::V4_CHINESE,
        Self::V4_ENGLISH,
    ];

    /// Case-insensitive lookup by display name.
    pub fn by_name(name: &str) -> Option<ModelSuite> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.name.eq_ignore_ascii_case(name))
    }

    pub fn paths(&self, dir: &Path) -> ModelPaths {
        ModelPaths {
            detector: dir.join(self.detector),
            classifier: dir.join(self.classifier),
            recognizer: dir.join(self.recognizer),
            keys: self.keys.map(|keys| dir.join(keys)),
        }
    }
}

impl Default for ModelSuite {
    fn default() -> Self {
        Self::V5_LATIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_suite_is_latin_with_keys_file() {
        let paths = ModelSuite::default().paths(Path::new(DEFAULT_MODELS_DIR));
        assert_eq!(
            paths.detector,
            PathBuf::from("models/v5/ch_PP-OCRv5_mobile_det.onnx")
        );
        assert_eq!(
            paths.keys,
            Some(PathBuf::from("models/v5/ppocrv5_latin_dict.txt"))
        );
    }

    #[test]
    fn embedded_vocabulary_suites_have_no_keys() {
        let paths = ModelSuite::V4_CHINESE.paths(Path::new("m"));
        assert_eq!(paths.keys, None);
        assert_eq!(paths.recognizer, PathBuf::from("m/ch_PP-OCRv4_rec_infer.onnx"));
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(
            ModelSuite::by_name("english v5 mobile"),
            Some(ModelSuite::V5_ENGLISH)
        );
        assert_eq!(ModelSuite::by_name("Klingon"), None);
    }
}
