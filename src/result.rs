use std::fmt;

use geo::{coord, Coord};

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text_blocks: Vec<TextBlock>,
    pub detect_time_ms: f64,
    pub total_time_ms: f64,
    /// Every block's text followed by a newline, in detection order.
    pub text: String,
}

impl OcrResult {
    pub fn empty(total_time_ms: f64) -> Self {
        Self {
            text_blocks: Vec::new(),
            detect_time_ms: 0.0,
            total_time_ms,
            text: String::new(),
        }
    }
}

impl fmt::Display for OcrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "OcrResult: {} blocks, detector {:.1}ms, total {:.1}ms",
            self.text_blocks.len(),
            self.detect_time_ms,
            self.total_time_ms
        )?;
        for block in &self.text_blocks {
            writeln!(f, "  {block}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TextBlock {
    pub text_box: TextBox,
    pub angle: Angle,
    pub text_line: TextLine,
    pub block_time_ms: f64,
}

impl TextBlock {
    pub fn text(&self) -> String {
        self.text_line.text()
    }
}

impl fmt::Display for TextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.text_box.points;
        write!(
            f,
            "[({}, {}) ({}, {}) ({}, {}) ({}, {})] score {:.3}, angle {:?} {:.3}: {:?}",
            a.x,
            a.y,
            b.x,
            b.y,
            c.x,
            c.y,
            d.x,
            d.y,
            self.text_box.score,
            self.angle.index,
            self.angle.score,
            self.text()
        )
    }
}

/// Oriented quadrilateral ordered top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub points: [Coord<f32>; 4],
    pub score: f32,
}

impl TextBox {
    pub fn translate(&self, dx: f32, dy: f32) -> TextBox {
        TextBox {
            points: self.points.map(|p| p + coord! { x: dx, y: dy }),
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLine {
    pub chars: Vec<String>,
    pub char_scores: Vec<f32>,
    pub time_ms: f64,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.chars.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AngleIndex {
    /// Classification disabled or failed, leave the region as is.
    Skipped,
    Upright,
    /// Upside down, rotate by 180 degrees before recognition.
    Rotated,
}

impl AngleIndex {
    pub fn value(self) -> i32 {
        match self {
            AngleIndex::Skipped => -1,
            AngleIndex::Upright => 0,
            AngleIndex::Rotated => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angle {
    pub index: AngleIndex,
    pub score: f32,
    pub time_ms: f64,
}

impl Angle {
    pub fn skipped(time_ms: f64) -> Self {
        Self {
            index: AngleIndex::Skipped,
            score: 0.0,
            time_ms,
        }
    }
}
