//! The movie-poster detection job run by the binary.

use std::path::PathBuf;
use crate::common::{InferenceDevice, ModelVersion};
use crate::data::{ConfigOrt, PredictOptions, RuntimeConfig, SpillingConfig};
use crate::error::DetectError;
use crate::predictor::{BatchPredictor, Checkpoint, OnnxWeights, PredictionResult, SsdFormat, YoloFormat};
use crate::preprocess::BatchMapper;
use crate::runtime::Runtime;
use crate::source::{ColorMode, ImageFolder, StorageLocation};
use crate::visualize::CocoIds;

pub const FILES_DIR: &str = "data/movie-posters";
pub const MODEL_PATH: &str = "models/ssd300_vgg16.onnx";
pub const OUTPUT_DIR: &str = "predictions";
pub const IMAGE_SIZE: (u32, u32) = (300, 300);
pub const BATCH_SIZE: usize = 128;
pub const SCORING_WORKERS: usize = 4;
pub const CPUS_PER_WORKER: usize = 4;
pub const GPUS_PER_WORKER: usize = 1;
pub const NUM_GPUS: usize = 4;
pub const OBJECT_STORE_MEMORY: usize = 100 * 1_000_000_000;
pub const SCORE_THRESHOLD: f32 = 0.5;

/// Output layout of the exported model.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// torchvision SSD: `boxes`, `labels`, `scores`.
    #[default]
    Ssd,
    Yolo(ModelVersion),
}

impl ModelFormat {
    /// `ssd`, or a YOLO version such as `yolov8`.
    pub fn from_str(format: &str) -> Option<Self> {
        match format.trim().to_lowercase().as_str() {
            "ssd" => Some(ModelFormat::Ssd),
            other => ModelVersion::from(other).map(ModelFormat::Yolo),
        }
    }

    /// Class numbering the model's labels follow.
    pub fn class_ids(&self) -> CocoIds {
        match self {
            ModelFormat::Ssd => CocoIds::Torchvision,
            ModelFormat::Yolo(_) => CocoIds::Contiguous,
        }
    }
}

/// Job settings: constants above, each overridable from the environment.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub files_dir: String,
    pub model_path: PathBuf,
    pub model_batched: bool,
    pub model_format: ModelFormat,
    pub image_size: (u32, u32),
    pub labels_path: Option<PathBuf>,
    pub device: InferenceDevice,
    pub output_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub score_threshold: f32,
    pub batch_size: usize,
    pub min_scoring_workers: usize,
    pub max_scoring_workers: usize,
    pub cpus_per_worker: usize,
    pub gpus_per_worker: usize,
    pub num_cpus: Option<usize>,
    pub num_gpus: usize,
    pub object_store_memory: usize,
    pub spilling: SpillingConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            files_dir: FILES_DIR.to_string(),
            model_path: PathBuf::from(MODEL_PATH),
            model_batched: false,
            model_format: ModelFormat::Ssd,
            image_size: IMAGE_SIZE,
            labels_path: None,
            device: InferenceDevice::CUDA(0),
            output_dir: PathBuf::from(OUTPUT_DIR),
            font_path: None,
            score_threshold: SCORE_THRESHOLD,
            batch_size: BATCH_SIZE,
            min_scoring_workers: SCORING_WORKERS,
            max_scoring_workers: SCORING_WORKERS,
            cpus_per_worker: CPUS_PER_WORKER,
            gpus_per_worker: GPUS_PER_WORKER,
            num_cpus: None,
            num_gpus: NUM_GPUS,
            object_store_memory: OBJECT_STORE_MEMORY,
            spilling: SpillingConfig::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DetectError> {
    value
        .trim()
        .parse()
        .map_err(|_| DetectError::Config(format!("{}: cannot parse `{}`", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DetectError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(DetectError::Config(format!("{}: expected a boolean, got `{}`", key, value))),
    }
}

impl JobConfig {
    pub fn from_env() -> Result<Self, DetectError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, starting from the defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, DetectError> {
        let mut config = Self::default();

        if let Some(v) = lookup("FILES_DIR") {
            config.files_dir = v;
        }
        if let Some(v) = lookup("MODEL_PATH") {
            config.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MODEL_BATCHED") {
            config.model_batched = parse_bool("MODEL_BATCHED", &v)?;
        }
        if let Some(v) = lookup("MODEL_FORMAT") {
            config.model_format = ModelFormat::from_str(&v).ok_or_else(|| {
                DetectError::Config(format!("MODEL_FORMAT: `{}` is neither `ssd` nor a YOLO version", v))
            })?;
        }
        // `N` for a square input, `W,H` otherwise.
        if let Some(v) = lookup("IMAGE_SIZE") {
            config.image_size = match v.split_once(',') {
                Some((w, h)) => (parse("IMAGE_SIZE", w)?, parse("IMAGE_SIZE", h)?),
                None => {
                    let n = parse("IMAGE_SIZE", &v)?;
                    (n, n)
                }
            };
        }
        if let Some(v) = lookup("LABELS_PATH") {
            config.labels_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DEVICE") {
            config.device = InferenceDevice::from_str(&v, 0).ok_or_else(|| {
                DetectError::Config(format!(
                    "DEVICE: `{}` is not one of {:?}",
                    v,
                    InferenceDevice::all_inference_devices()
                ))
            })?;
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FONT_PATH") {
            config.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SCORE_THRESHOLD") {
            config.score_threshold = parse("SCORE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            config.batch_size = parse("BATCH_SIZE", &v)?;
        }
        // `N` for a fixed pool, `MIN,MAX` for a bounded one.
        if let Some(v) = lookup("SCORING_WORKERS") {
            let (min, max) = match v.split_once(',') {
                Some((min, max)) => (parse("SCORING_WORKERS", min)?, parse("SCORING_WORKERS", max)?),
                None => {
                    let n = parse("SCORING_WORKERS", &v)?;
                    (n, n)
                }
            };
            config.min_scoring_workers = min;
            config.max_scoring_workers = max;
        }
        if let Some(v) = lookup("CPUS_PER_WORKER") {
            config.cpus_per_worker = parse("CPUS_PER_WORKER", &v)?;
        }
        if let Some(v) = lookup("GPUS_PER_WORKER") {
            config.gpus_per_worker = parse("GPUS_PER_WORKER", &v)?;
        }
        if let Some(v) = lookup("NUM_CPUS") {
            config.num_cpus = Some(parse("NUM_CPUS", &v)?);
        }
        if let Some(v) = lookup("NUM_GPUS") {
            config.num_gpus = parse("NUM_GPUS", &v)?;
        }
        if let Some(v) = lookup("OBJECT_STORE_MEMORY") {
            config.object_store_memory = parse("OBJECT_STORE_MEMORY", &v)?;
        }
        if let Some(v) = lookup("OBJECT_SPILLING_CONFIG") {
            config.spilling = SpillingConfig::from_json(&v)?;
        }

        Ok(config)
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut runtime = RuntimeConfig::new()
            .with_object_store_memory(self.object_store_memory)
            .with_spilling(self.spilling.clone())
            .with_num_gpus(self.num_gpus);
        if let Some(n) = self.num_cpus {
            runtime = runtime.with_num_cpus(n);
        }
        runtime
    }

    pub fn predict_options(&self) -> PredictOptions {
        PredictOptions::new()
            .with_batch_size(self.batch_size)
            .with_scoring_workers(self.min_scoring_workers, self.max_scoring_workers)
            .with_cpus_per_worker(self.cpus_per_worker)
            .with_gpus_per_worker(self.gpus_per_worker)
            .with_feature_columns(&["image"])
            .with_keep_columns(&["image"])
    }
}

/// Reads the images, scores them with the configured checkpoint and returns
/// the records in dataset order.
pub fn run(config: &JobConfig) -> anyhow::Result<PredictionResult> {
    let runtime = Runtime::init(config.runtime_config())?;

    let location = StorageLocation::parse(&config.files_dir)?;
    let dataset = ImageFolder::new(location)
        .with_size(config.image_size.0, config.image_size.1)
        .with_mode(ColorMode::Rgb)
        .read()?;

    let mut ort = ConfigOrt::new()
        .with_model(&config.model_path)
        .with_device(config.device);
    if let Some(labels) = &config.labels_path {
        ort = ort.with_labels_file(labels)?;
    }
    let weights = OnnxWeights::from_config(ort)?.with_batched(config.model_batched);
    let checkpoint = Checkpoint::new(weights, BatchMapper::to_tensor());

    let predictor = match config.model_format {
        ModelFormat::Ssd => BatchPredictor::from_checkpoint(checkpoint, SsdFormat::new()),
        ModelFormat::Yolo(version) => BatchPredictor::from_checkpoint(checkpoint, YoloFormat::new(version)),
    };
    let result = predictor.predict(&runtime, &dataset, &config.predict_options())?;
    Ok(result)
}
