use ndarray::parallel::prelude::*;
use ndarray::{s, Axis};
use crate::common::{BBox, BoxType, ClssType, Detection, ModelVersion, YoloPreds};
use crate::data::Xs;
use crate::detection_runners::ort_detector::nms::nms;
use crate::error::DetectError;
use crate::predictor::output_format::{labelled, OutputFormat};

/// Raw YOLO head output, decoded by layout, filtered and de-duplicated with NMS.
#[derive(Debug, Clone)]
pub struct YoloFormat {
    layout: YoloPreds,
    nc: Option<usize>,
    confidence: f32,
    iou: f32,
    min_size: f32,
}

impl YoloFormat {
    pub fn new(version: ModelVersion) -> Self {
        Self::with_layout(version.layout())
    }

    pub fn with_layout(layout: YoloPreds) -> Self {
        Self {
            layout,
            nc: None,
            confidence: 0.25,
            iou: 0.45,
            min_size: 0.,
        }
    }

    /// Number of classes. Taken from the class names or the output shape when unset.
    pub fn with_nc(mut self, nc: usize) -> Self {
        self.nc = Some(nc);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_iou(mut self, iou: f32) -> Self {
        self.iou = iou;
        self
    }

    /// Drops boxes narrower or shorter than `min_size` pixels.
    pub fn with_min_size(mut self, min_size: f32) -> Self {
        self.min_size = min_size;
        self
    }

    fn resolve_nc(&self, values: usize, names: Option<&[String]>) -> usize {
        match (self.nc, names, &self.layout.clss) {
            (Some(nc), _, _) => nc,
            (None, Some(names), _) => names.len(),
            (None, None, ClssType::Clss) => values.saturating_sub(4),
            (None, None, ClssType::ConfClss) => values.saturating_sub(5),
            (None, None, ClssType::ConfCls) => 1,
        }
    }
}

impl OutputFormat for YoloFormat {
    fn format(&self, native: &Xs, names: Option<&[String]>) -> Result<Vec<Detection>, DetectError> {
        let x = native
            .first()
            .ok_or_else(|| DetectError::Format("model produced no outputs".into()))?;
        let mut preds = x.view();
        if preds.ndim() == 3 && preds.shape()[0] == 1 {
            preds = preds.index_axis_move(Axis(0), 0);
        }
        if preds.ndim() != 2 {
            return Err(DetectError::Format(format!(
                "expected 2-D predictions per image, got shape {:?}",
                x.shape()
            )));
        }

        let values = if self.layout.is_anchors_first() {
            preds.shape()[1]
        } else {
            preds.shape()[0]
        };
        let nc = self.resolve_nc(values, names);
        if values < self.layout.row_len(nc) {
            return Err(DetectError::Format(format!(
                "{} values per anchor cannot hold {} classes ({:?})",
                values, nc, self.layout.clss
            )));
        }

        let parsed = self.layout.parse_preds(preds, nc);

        let mut detections: Vec<Detection> = parsed
            .bboxes
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .filter_map(|(i, bbox)| {
                // confidence & class_id
                let (class_id, confidence) = match &parsed.ids {
                    Some(ids) => (ids[[i, 0]] as i64, parsed.clss[[i, 0]]),
                    None => {
                        let (class_id, &confidence) = parsed
                            .clss
                            .slice(s![i, ..])
                            .into_iter()
                            .enumerate()
                            .max_by(|a, b| a.1.total_cmp(b.1))?;

                        match &parsed.confs {
                            None => (class_id as i64, confidence),
                            Some(confs) => (class_id as i64, confidence * confs[[i, 0]]),
                        }
                    }
                };

                // filtering low scores
                if confidence < self.confidence {
                    return None;
                }

                let bbox = match self.layout.bbox {
                    BoxType::Cxcywh => BBox::from_cxcywh(bbox[0], bbox[1], bbox[2], bbox[3]),
                    BoxType::Xyxy => BBox::from_xyxy(bbox[0], bbox[1], bbox[2], bbox[3]),
                };

                // filtering unreliably small objects
                if bbox.width() < self.min_size || bbox.height() < self.min_size {
                    return None;
                }

                Some(labelled(Detection::new(class_id, bbox, confidence), names))
            })
            .collect();

        if self.layout.apply_nms {
            nms(&mut detections, self.iou);
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::X;

    #[test]
    fn test_decode_v8_layout_with_nms() {
        // [values = 4 + 2 classes, anchors = 3]; anchors 0 and 1 overlap.
        let x = X::from_shape_vec(
            &[1, 6, 3],
            vec![
                50., 52., 200., // cx
                50., 50., 200., // cy
                20., 20., 30., // w
                20., 20., 30., // h
                0.9, 0.6, 0.1, // class 0
                0.0, 0.1, 0.8, // class 1
            ],
        )
        .unwrap();
        let mut xs = Xs::new();
        xs.push_kv("output0", x).unwrap();

        let names = vec!["poster".to_string(), "title".to_string()];
        let dets = YoloFormat::new(ModelVersion::YoloV8)
            .format(&xs, Some(&names))
            .unwrap();

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[0].bbox.xyxy(), [40., 40., 60., 60.]);
        assert_eq!(dets[1].label.as_deref(), Some("title"));
    }

    #[test]
    fn test_decode_v10_layout_without_nms() {
        // [anchors = 2, x1 y1 x2 y2 score class]
        let x = X::from_shape_vec(
            &[2, 6],
            vec![
                0., 0., 10., 10., 0.7, 3., //
                1., 1., 11., 11., 0.1, 3., //
            ],
        )
        .unwrap();
        let mut xs = Xs::new();
        xs.push_kv("output0", x).unwrap();

        let dets = YoloFormat::new(ModelVersion::YoloV10).format(&xs, None).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 3);
    }

    #[test]
    fn test_too_few_values_is_a_format_error() {
        let mut xs = Xs::new();
        xs.push_kv("output0", X::from_shape_vec(&[6, 3], vec![0.; 18]).unwrap()).unwrap();
        let format = YoloFormat::new(ModelVersion::YoloV8).with_nc(80);
        assert!(matches!(format.format(&xs, None), Err(DetectError::Format(_))));
    }
}
