use ndarray::{ArrayView, Axis, IxDyn};
use crate::common::{BBox, Detection};
use crate::data::{X, Xs};
use crate::error::DetectError;
use crate::predictor::output_format::{labelled, OutputFormat};

/// Post-processed SSD style output: `boxes [N, 4]` as `x1, y1, x2, y2`,
/// `labels [N]` and `scores [N]`, optionally with a leading batch axis of 1.
#[derive(Debug, Clone)]
pub struct SsdFormat {
    boxes: String,
    labels: String,
    scores: String,
    score_threshold: f32,
}

impl Default for SsdFormat {
    fn default() -> Self {
        Self {
            boxes: "boxes".to_string(),
            labels: "labels".to_string(),
            scores: "scores".to_string(),
            score_threshold: 0.0,
        }
    }
}

impl SsdFormat {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_output_names(mut self, boxes: &str, labels: &str, scores: &str) -> Self {
        self.boxes = boxes.to_string();
        self.labels = labels.to_string();
        self.scores = scores.to_string();
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }
}

fn squeezed<'a>(name: &str, x: &'a X, rank: usize) -> Result<ArrayView<'a, f32, IxDyn>, DetectError> {
    let view = x.view();
    if view.ndim() == rank {
        return Ok(view);
    }
    if view.ndim() == rank + 1 && view.shape()[0] == 1 {
        return Ok(view.index_axis_move(Axis(0), 0));
    }
    Err(DetectError::Format(format!(
        "output `{}` has shape {:?}, expected rank {}",
        name,
        x.shape(),
        rank
    )))
}

impl OutputFormat for SsdFormat {
    fn format(&self, native: &Xs, names: Option<&[String]>) -> Result<Vec<Detection>, DetectError> {
        let boxes = squeezed(&self.boxes, native.require(&self.boxes)?, 2)?;
        let labels = squeezed(&self.labels, native.require(&self.labels)?, 1)?;
        let scores = squeezed(&self.scores, native.require(&self.scores)?, 1)?;

        let n = scores.len();
        if boxes.shape() != [n, 4] || labels.len() != n {
            return Err(DetectError::Format(format!(
                "inconsistent SSD outputs: boxes {:?}, labels {:?}, scores {:?}",
                boxes.shape(),
                labels.shape(),
                scores.shape()
            )));
        }

        let detections = (0..n)
            .filter(|&i| scores[[i]] >= self.score_threshold)
            .map(|i| {
                let bbox = BBox::from_xyxy(boxes[[i, 0]], boxes[[i, 1]], boxes[[i, 2]], boxes[[i, 3]]);
                let det = Detection::new(labels[[i]].round() as i64, bbox, scores[[i]]);
                labelled(det, names)
            })
            .collect();
        Ok(detections)
    }
}
