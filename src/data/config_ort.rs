//! Options for building ONNX Runtime sessions.

use std::path::{Path, PathBuf};
use crate::common::InferenceDevice;
use crate::utils;

#[derive(Debug, Clone)]
pub struct ConfigOrt {
    pub onnx_path: PathBuf,
    pub device: InferenceDevice,
    pub intra_threads: usize,
    pub fp16_input: bool,

    // trt related
    pub trt_engine_cache_enable: bool,
    pub trt_engine_cache_path: PathBuf,
    pub trt_fp16_enable: bool,

    pub names: Option<Vec<String>>,
}

impl Default for ConfigOrt {
    fn default() -> Self {
        Self {
            onnx_path: PathBuf::new(),
            device: InferenceDevice::CPU,
            intra_threads: 1,
            fp16_input: false,

            trt_engine_cache_enable: true,
            trt_engine_cache_path: PathBuf::from("trt-cache"),
            trt_fp16_enable: false,

            names: None,
        }
    }
}

impl ConfigOrt {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_model<P: AsRef<Path>>(mut self, onnx_path: P) -> Self {
        self.onnx_path = onnx_path.as_ref().to_path_buf();
        self
    }

    pub fn with_device(mut self, device_type: InferenceDevice) -> Self {
        self.device = device_type;
        self
    }

    pub fn with_intra_threads(mut self, n: usize) -> Self {
        self.intra_threads = n.max(1);
        self
    }

    pub fn with_fp16_input(mut self, x: bool) -> Self {
        self.fp16_input = x;
        self
    }

    pub fn with_trt_fp16(mut self, x: bool) -> Self {
        self.trt_fp16_enable = x;
        self
    }

    pub fn with_trt_engine_cache(mut self, enable: bool, path: &Path) -> Self {
        self.trt_engine_cache_enable = enable;
        self.trt_engine_cache_path = path.to_path_buf();
        self
    }

    pub fn with_names(mut self, names: &[&str]) -> Self {
        self.names = Some(names.iter().map(|x| x.to_string()).collect::<Vec<String>>());
        self
    }

    /// Reads class names from a file with one name per line.
    pub fn with_labels_file<P: AsRef<Path>>(mut self, labels_path: P) -> anyhow::Result<Self> {
        let names = utils::file_to_vec(labels_path.as_ref())?;
        if names.is_empty() {
            anyhow::bail!("Labels file {} is empty", labels_path.as_ref().display());
        }
        self.names = Some(names);
        Ok(self)
    }
}
