use serde::{Deserialize, Serialize};
use crate::common::BBox;
use crate::detection_runners::ort_detector::nms::Nms;

/// One detected object in one image.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: i64,
    pub bbox: BBox,
    pub label: Option<String>,
    pub confidence: f32,
}

impl Nms for Detection {
    fn iou(&self, other: &Self) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}

impl Detection {
    pub fn new(class_id: i64, bbox: BBox, confidence: f32) -> Self {
        Self {
            class_id,
            bbox,
            label: None,
            confidence,
        }
    }

    /// Sets the optional class name of the detection.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn get_label(&self) -> String {
        self.label.clone().unwrap_or(format!("# {}", self.class_id))
    }
}
