//! Prediction layouts of the YOLO heads the crate can decode.

use ndarray::{ArrayView, Axis, IxDyn};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ModelVersion {
    YoloV5,
    YoloV6,
    YoloV7,
    YoloV8,
    YoloV9,
    YoloV10,
    #[default] YoloV11,
}

impl ModelVersion {
    pub fn name(&self) -> &'static str {
        match self {
            Self::YoloV5 => "YoloV5",
            Self::YoloV6 => "YoloV6",
            Self::YoloV7 => "YoloV7",
            Self::YoloV8 => "YoloV8",
            Self::YoloV9 => "YoloV9",
            Self::YoloV10 => "YoloV10",
            Self::YoloV11 => "YoloV11",
        }
    }

    pub fn from(version: &str) -> Option<ModelVersion> {
        match version.to_lowercase().trim_start_matches("yolo") {
            "v5" => Some(ModelVersion::YoloV5),
            "v6" => Some(ModelVersion::YoloV6),
            "v7" => Some(ModelVersion::YoloV7),
            "v8" => Some(ModelVersion::YoloV8),
            "v9" => Some(ModelVersion::YoloV9),
            "v10" => Some(ModelVersion::YoloV10),
            "v11" => Some(ModelVersion::YoloV11),
            _ => None,
        }
    }

    /// Output layout produced by this version's detection head.
    pub fn layout(&self) -> YoloPreds {
        match self {
            Self::YoloV5 | Self::YoloV6 | Self::YoloV7 => YoloPreds::n_a_cxcywh_confclss(),
            Self::YoloV8 | Self::YoloV9 | Self::YoloV11 => YoloPreds::n_cxcywh_clss_a(),
            Self::YoloV10 => YoloPreds::n_a_xyxy_confcls().apply_nms(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxType {
    Cxcywh,
    Xyxy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClssType {
    /// Per-class scores only.
    Clss,
    /// Objectness followed by per-class scores.
    ConfClss,
    /// Best score followed by its class id.
    ConfCls,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnchorsPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YoloPreds {
    pub clss: ClssType,
    pub bbox: BoxType,
    pub anchors: AnchorsPosition,
    pub apply_nms: bool,
}

/// Column slices of one image's predictions, each `[anchors, k]`.
pub struct ParsedPreds<'a> {
    pub bboxes: ArrayView<'a, f32, IxDyn>,
    pub ids: Option<ArrayView<'a, f32, IxDyn>>,
    pub clss: ArrayView<'a, f32, IxDyn>,
    pub confs: Option<ArrayView<'a, f32, IxDyn>>,
}

impl YoloPreds {
    pub fn apply_nms(mut self, x: bool) -> Self {
        self.apply_nms = x;
        self
    }

    pub fn n_a_cxcywh_confclss() -> Self {
        // YOLOv5 | YOLOv6 | YOLOv7 : NACxcywhConfClss
        Self {
            bbox: BoxType::Cxcywh,
            clss: ClssType::ConfClss,
            anchors: AnchorsPosition::Before,
            apply_nms: true,
        }
    }

    pub fn n_cxcywh_clss_a() -> Self {
        // YOLOv8 | YOLOv9 | YOLOv11 : NCxcywhClssA
        Self {
            bbox: BoxType::Cxcywh,
            clss: ClssType::Clss,
            anchors: AnchorsPosition::After,
            apply_nms: true,
        }
    }

    pub fn n_a_xyxy_confcls() -> Self {
        // YOLOv10 : NAXyxyConfCls
        Self {
            bbox: BoxType::Xyxy,
            clss: ClssType::ConfCls,
            anchors: AnchorsPosition::Before,
            apply_nms: true,
        }
    }

    pub fn is_anchors_first(&self) -> bool {
        matches!(self.anchors, AnchorsPosition::Before)
    }

    /// Number of values per anchor for `nc` classes.
    pub fn row_len(&self, nc: usize) -> usize {
        match self.clss {
            ClssType::Clss => 4 + nc,
            ClssType::ConfClss => 5 + nc,
            ClssType::ConfCls => 6,
        }
    }

    /// Splits one image's `[anchors, values]` (or `[values, anchors]`) prediction matrix.
    pub fn parse_preds<'a>(&self, x: ArrayView<'a, f32, IxDyn>, nc: usize) -> ParsedPreds<'a> {
        let x = if self.is_anchors_first() {
            x
        } else {
            x.reversed_axes()
        };

        let (bboxes, rest) = x.split_at(Axis(1), 4);

        match self.clss {
            ClssType::ConfClss => {
                let (confs, rest) = rest.split_at(Axis(1), 1);
                let (clss, _) = rest.split_at(Axis(1), nc);
                ParsedPreds { bboxes, ids: None, clss, confs: Some(confs) }
            }
            ClssType::ConfCls => {
                let (clss, rest) = rest.split_at(Axis(1), 1);
                let (ids, _) = rest.split_at(Axis(1), 1);
                ParsedPreds { bboxes, ids: Some(ids), clss, confs: None }
            }
            ClssType::Clss => {
                let (clss, _) = rest.split_at(Axis(1), nc);
                ParsedPreds { bboxes, ids: None, clss, confs: None }
            }
        }
    }
}
