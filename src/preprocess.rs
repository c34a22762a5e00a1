//! Stateless per-batch transforms applied before the model.

use std::fmt;
use std::sync::Arc;
use image::DynamicImage;
use crate::common::{Batch, Value, IMAGE_COLUMN};
use crate::detection_runners::ort_detector::image_ops::chw_normalize;
use crate::error::DetectError;

type MapFn = dyn Fn(Batch) -> Result<Batch, DetectError> + Send + Sync;

/// A pure function over a batch of records.
///
/// Workers share the mapper through the checkpoint, so the function must not
/// keep state between calls.
#[derive(Clone)]
pub struct BatchMapper {
    name: String,
    f: Arc<MapFn>,
}

impl BatchMapper {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(Batch) -> Result<Batch, DetectError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            f: Arc::new(f),
        }
    }

    /// The default image preprocessor, see [`to_tensor`].
    pub fn to_tensor() -> Self {
        Self::new("to_tensor", to_tensor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform_batch(&self, batch: Batch) -> Result<Batch, DetectError> {
        (self.f)(batch)
    }
}

impl fmt::Debug for BatchMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchMapper").field("name", &self.name).finish()
    }
}

/// Replaces the `image` column of every record with a `[3, H, W]` tensor in `[0, 1]`.
///
/// Only 8-bit RGB images are accepted. Other columns pass through untouched.
pub fn to_tensor(mut batch: Batch) -> Result<Batch, DetectError> {
    for (i, record) in batch.iter_mut().enumerate() {
        let tensor = match record.get(IMAGE_COLUMN) {
            Some(Value::Image(DynamicImage::ImageRgb8(rgb))) => chw_normalize(rgb)?,
            Some(Value::Image(other)) => {
                return Err(DetectError::Format(format!(
                    "record {}: expected 3-channel 8-bit RGB, got {:?}",
                    i,
                    other.color()
                )))
            }
            Some(other) => {
                return Err(DetectError::Format(format!(
                    "record {}: `{}` column holds a {}, expected an image",
                    i,
                    IMAGE_COLUMN,
                    other.kind()
                )))
            }
            None => {
                return Err(DetectError::Format(format!(
                    "record {}: missing `{}` column",
                    i, IMAGE_COLUMN
                )))
            }
        };
        record.insert(IMAGE_COLUMN, Value::Tensor(tensor));
    }
    Ok(batch)
}
