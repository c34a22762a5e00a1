pub mod inference_process;
pub mod ort_detector;

pub use inference_process::InferenceBackend;
pub use ort_detector::*;
