use std::fmt;

use crate::common::RoiBox;
use crate::error::DatasetError;
use crate::Result;

/// One detection as written to a per-class results file.
///
/// The box is kept in the 1-based inclusive convention of the annotation files.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    pub image_id: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl ResultLine {
    /// Builds a line from a zero-based detection box.
    pub fn from_detection(image_id: &str, bbox: &RoiBox, confidence: f32) -> Self {
        let (x1, y1, x2, y2) = bbox.to_one_based();
        Self {
            image_id: image_id.to_string(),
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    /// The box back in zero-based coordinates.
    pub fn zero_based_box(&self) -> RoiBox {
        RoiBox::from_one_based(self.x1, self.y1, self.x2, self.y2)
    }

    pub fn parse(line: &str) -> Result<Self> {
        let malformed = |reason: &str| DatasetError::MalformedResultLine {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(malformed("expected 6 whitespace separated fields"));
        }

        let mut numbers = [0f32; 5];
        for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
            *slot = field.parse().map_err(|_| malformed("non-numeric field"))?;
        }

        Ok(Self {
            image_id: fields[0].to_string(),
            confidence: numbers[0],
            x1: numbers[1],
            y1: numbers[2],
            x2: numbers[3],
            y2: numbers[4],
        })
    }
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.3} {:.1} {:.1} {:.1} {:.1}",
               self.image_id, self.confidence, self.x1, self.y1, self.x2, self.y2)
    }
}
