use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use image::DynamicImage;
use crate::common::{Record, Value, IMAGE_COLUMN, PATH_COLUMN};
use crate::detection_runners::ort_detector::image_ops::resize_exact;
use crate::error::DetectError;
use crate::runtime::Block;
use crate::source::RemoteStore;

/// Pixel layout images are converted to when read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    #[default]
    Rgb,
    Rgba,
    Luma,
}

impl ColorMode {
    pub fn convert(&self, image: DynamicImage) -> DynamicImage {
        match self {
            ColorMode::Rgb => DynamicImage::ImageRgb8(image.into_rgb8()),
            ColorMode::Rgba => DynamicImage::ImageRgba8(image.into_rgba8()),
            ColorMode::Luma => DynamicImage::ImageLuma8(image.into_luma8()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub width: u32,
    pub height: u32,
    pub mode: ColorMode,
    pub include_paths: bool,
}

/// Produces one block of the dataset when run.
#[derive(Debug, Clone)]
pub enum ReadTask {
    Files {
        paths: Vec<PathBuf>,
        options: ReadOptions,
    },
    Remote {
        store: RemoteStore,
        keys: Vec<object_store::path::Path>,
        options: ReadOptions,
    },
    InMemory(Arc<Block>),
}

impl ReadTask {
    pub fn in_memory(records: Block) -> Self {
        ReadTask::InMemory(Arc::new(records))
    }

    /// Number of records the task yields.
    pub fn len(&self) -> usize {
        match self {
            ReadTask::Files { paths, .. } => paths.len(),
            ReadTask::Remote { keys, .. } => keys.len(),
            ReadTask::InMemory(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self) -> Result<Block, DetectError> {
        match self {
            ReadTask::Files { paths, options } => paths.iter().map(|p| read_image(p, options)).collect(),
            ReadTask::Remote { store, keys, options } => keys
                .iter()
                .map(|key| {
                    let uri = store.object_uri(key);
                    decode_record(&store.get(key)?, Path::new(&uri), options)
                })
                .collect(),
            ReadTask::InMemory(records) => Ok(records.as_ref().clone()),
        }
    }
}

fn read_image(path: &Path, options: &ReadOptions) -> Result<Record, DetectError> {
    let bytes = fs::read(path).map_err(|source| DetectError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    decode_record(&bytes, path, options)
}

fn decode_record(bytes: &[u8], path: &Path, options: &ReadOptions) -> Result<Record, DetectError> {
    let image = image::load_from_memory(bytes).map_err(|source| DetectError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = options.mode.convert(image);
    let image = resize_exact(&image, options.width, options.height);

    let mut record = Record::new().with(IMAGE_COLUMN, Value::Image(image));
    if options.include_paths {
        record.insert(PATH_COLUMN, Value::Text(path.to_string_lossy().to_string()));
    }
    Ok(record)
}
