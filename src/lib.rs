mod utils;
pub mod common;
pub mod data;
pub mod detection_runners;
pub mod error;
pub mod job;
pub mod logging;
pub mod predictor;
pub mod preprocess;
pub mod runtime;
pub mod source;
pub mod visualize;

pub use error::DetectError;

pub type Result<T, E = DetectError> = std::result::Result<T, E>;
