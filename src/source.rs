//! Image source: turns a storage location into a partitioned dataset.

mod dataset;
mod image_folder;
mod location;
mod read_task;
mod remote;

pub use dataset::Dataset;
pub use image_folder::{ImageFolder, IMAGE_EXTENSIONS};
pub use location::StorageLocation;
pub use read_task::{ColorMode, ReadOptions, ReadTask};
pub use remote::RemoteStore;
