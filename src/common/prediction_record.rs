use image::DynamicImage;
use ndarray::{Array1, Array2};
use crate::common::{Detection, Record};

/// Output row of the batch prediction stage.
///
/// Columns are fixed: `boxes` (`N x 4`, `x1, y1, x2, y2` in input pixels),
/// `labels` (`N` class ids) and `scores` (`N` confidences), row `i` of each
/// describing the same object. `kept` carries the input columns requested
/// through `keep_columns`, taken from the batch before preprocessing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionRecord {
    pub detections: Vec<Detection>,
    pub kept: Record,
}

impl PredictionRecord {
    pub fn new(detections: Vec<Detection>, kept: Record) -> Self {
        Self { detections, kept }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn boxes(&self) -> Array2<f32> {
        let mut boxes = Array2::zeros((self.detections.len(), 4));
        for (mut row, det) in boxes.rows_mut().into_iter().zip(&self.detections) {
            for (cell, v) in row.iter_mut().zip(det.bbox.xyxy()) {
                *cell = v;
            }
        }
        boxes
    }

    pub fn labels(&self) -> Array1<i64> {
        self.detections.iter().map(|d| d.class_id).collect()
    }

    pub fn scores(&self) -> Array1<f32> {
        self.detections.iter().map(|d| d.confidence).collect()
    }

    /// Detections at or above `threshold`.
    pub fn above(&self, threshold: f32) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(move |d| d.confidence >= threshold)
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        self.kept.image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BBox;

    #[test]
    fn test_columns_line_up() {
        let record = PredictionRecord::new(
            vec![
                Detection::new(3, BBox::from_xyxy(1., 2., 3., 4.), 0.9),
                Detection::new(7, BBox::from_xyxy(5., 6., 7., 8.), 0.4),
            ],
            Record::new(),
        );

        let boxes = record.boxes();
        assert_eq!(boxes.shape(), &[2, 4]);
        assert_eq!(boxes.row(1).to_vec(), vec![5., 6., 7., 8.]);
        assert_eq!(record.labels().to_vec(), vec![3, 7]);
        assert_eq!(record.scores().to_vec(), vec![0.9, 0.4]);
        assert_eq!(record.above(0.5).count(), 1);
    }

    #[test]
    fn test_empty_record_has_zero_rows() {
        let record = PredictionRecord::default();
        assert_eq!(record.boxes().shape(), &[0, 4]);
        assert!(record.is_empty());
    }
}
