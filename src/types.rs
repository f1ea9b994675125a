use serde::{Deserialize, Serialize};

/// One detected text region, as returned by the vision model.
///
/// `box_2d` is `[ymin, xmin, ymax, xmax]` on a 0-1000 scale independent of
/// the actual image pixel size. Boxes are trusted upstream data: a box with
/// `ymin > ymax` simply renders degenerate, it is not rejected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Annotation {
    pub original: String,
    pub translation: String,
    pub box_2d: [i32; 4],
}

impl Annotation {
    /// Numeric- or symbol-only segments come back with `translation` equal
    /// to `original`; such annotations get a box but no label.
    pub fn is_identical(&self) -> bool {
        self.original.trim() == self.translation.trim()
    }
}

/// User-applied label displacement, in the same 0-1000 normalized scale as
/// `box_2d`. Owned by the app in a sparse per-index map; the overlay engine
/// only reads it and reports changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_parses_from_model_json() {
        let json = r#"{
            "original": "Hello",
            "translation": "你好",
            "box_2d": [120, 80, 180, 400]
        }"#;
        let ann: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(ann.box_2d, [120, 80, 180, 400]);
        assert!(!ann.is_identical());
    }

    #[test]
    fn numeric_segments_are_identical_after_trim() {
        let ann = Annotation {
            original: "2024 ".to_string(),
            translation: " 2024".to_string(),
            box_2d: [0, 0, 50, 100],
        };
        assert!(ann.is_identical());
    }

    #[test]
    fn missing_offset_defaults_to_zero() {
        let off = Offset::default();
        assert_eq!(off, Offset::new(0.0, 0.0));
    }
}
