use std::fmt;
use crate::common::Detection;
use crate::data::Xs;
use crate::error::DetectError;

/// Flattens one image's native model output into detections.
///
/// `names` are the class names known to the backend, indexed by class id.
pub trait OutputFormat: Send + Sync + fmt::Debug {
    fn format(&self, native: &Xs, names: Option<&[String]>) -> Result<Vec<Detection>, DetectError>;
}

pub(crate) fn labelled(detection: Detection, names: Option<&[String]>) -> Detection {
    let name = usize::try_from(detection.class_id)
        .ok()
        .and_then(|id| names.and_then(|n| n.get(id)));
    match name {
        Some(name) => detection.with_label(name),
        None => detection,
    }
}
