mod ort_engine;
pub mod image_ops;
pub mod input_wrapper;
pub mod nms;
pub mod xs;

pub use ort_engine::OrtEngine;
