mod config_ort;
mod filesystem_access;
mod predict_options;
mod runtime_config;
mod time_calc;

pub use config_ort::ConfigOrt;
pub use predict_options::PredictOptions;
pub use runtime_config::{RuntimeConfig, SpillingConfig};

pub use crate::detection_runners::ort_detector::input_wrapper::X;
pub use crate::detection_runners::ort_detector::xs::Xs;

pub use filesystem_access::FsAccess;
pub use time_calc::TimeCalc;

pub(crate) const CROSS_MARK: &str = "❌";
