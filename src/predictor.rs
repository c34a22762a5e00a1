//! Batch prediction: checkpoint, model-family output formats and the scoring pool.

mod batch_predictor;
mod checkpoint;
mod output_format;
mod ssd_format;
mod yolo_format;

pub use batch_predictor::{BatchPredictor, PredictionResult};
pub use checkpoint::{Checkpoint, ModelWeights, OnnxWeights};
pub use output_format::OutputFormat;
pub use ssd_format::SsdFormat;
pub use yolo_format::YoloFormat;
