mod bbox;
mod detection;
mod inference_device;
mod model_version;
mod prediction_record;
mod record;

pub use bbox::*;
pub use detection::*;
pub use inference_device::*;
pub use model_version::*;
pub use prediction_record::*;
pub use record::*;
