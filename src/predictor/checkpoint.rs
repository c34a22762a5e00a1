use std::fmt;
use std::fs;
use std::sync::Arc;
use crate::common::{Batch, InferenceDevice};
use crate::data::ConfigOrt;
use crate::detection_runners::{InferenceBackend, OrtEngine};
use crate::error::DetectError;
use crate::preprocess::BatchMapper;
use crate::runtime::WorkerSlot;
use crate::utils::human_bytes;

/// Model weights that can be instantiated once per worker.
pub trait ModelWeights: Send + Sync + fmt::Debug {
    /// Builds a backend bound to the CPUs and GPUs of `slot`.
    fn load(&self, slot: &WorkerSlot) -> anyhow::Result<Box<dyn InferenceBackend>>;
}

/// ONNX weights read once and kept in memory, so every worker builds its
/// session from the same bytes.
#[derive(Clone)]
pub struct OnnxWeights {
    config: ConfigOrt,
    bytes: Arc<Vec<u8>>,
    batched: bool,
}

impl OnnxWeights {
    pub fn from_config(config: ConfigOrt) -> Result<Self, DetectError> {
        let bytes = fs::read(&config.onnx_path).map_err(|source| DetectError::Unreadable {
            path: config.onnx_path.clone(),
            source,
        })?;
        log::info!(
            "Loaded weights {} ({})",
            config.onnx_path.display(),
            human_bytes(bytes.len() as f64)
        );
        Ok(Self {
            config,
            bytes: Arc::new(bytes),
            batched: true,
        })
    }

    /// Whether the model's input has a leading batch axis. Defaults to `true`.
    pub fn with_batched(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    pub fn config(&self) -> &ConfigOrt {
        &self.config
    }
}

impl fmt::Debug for OnnxWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxWeights")
            .field("onnx_path", &self.config.onnx_path)
            .field("device", &self.config.device)
            .field("bytes", &self.bytes.len())
            .field("batched", &self.batched)
            .finish()
    }
}

impl ModelWeights for OnnxWeights {
    fn load(&self, slot: &WorkerSlot) -> anyhow::Result<Box<dyn InferenceBackend>> {
        let device = match (self.config.device.is_gpu(), slot.gpu_ids.first()) {
            (true, Some(&id)) => self.config.device.on_gpu(id),
            (true, None) => anyhow::bail!(
                "{} requested but worker {} holds no GPU, set num_gpus_per_worker",
                self.config.device.str(),
                slot.index
            ),
            (false, _) => InferenceDevice::CPU,
        };
        let config = self
            .config
            .clone()
            .with_device(device)
            .with_intra_threads(slot.cpus);
        Ok(Box::new(OrtEngine::new(&config, &self.bytes, self.batched)?))
    }
}

/// Immutable bundle of weights and preprocessing shared by every worker.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    weights: Arc<dyn ModelWeights>,
    preprocessor: Option<BatchMapper>,
}

impl Checkpoint {
    pub fn new<W: ModelWeights + 'static>(weights: W, preprocessor: BatchMapper) -> Self {
        Self {
            weights: Arc::new(weights),
            preprocessor: Some(preprocessor),
        }
    }

    /// For inputs that are already tensors.
    pub fn without_preprocessor<W: ModelWeights + 'static>(weights: W) -> Self {
        Self {
            weights: Arc::new(weights),
            preprocessor: None,
        }
    }

    pub fn weights(&self) -> &dyn ModelWeights {
        self.weights.as_ref()
    }

    pub fn preprocessor(&self) -> Option<&BatchMapper> {
        self.preprocessor.as_ref()
    }

    pub fn preprocess(&self, batch: Batch) -> Result<Batch, DetectError> {
        match &self.preprocessor {
            Some(mapper) => mapper.transform_batch(batch),
            None => Ok(batch),
        }
    }
}
