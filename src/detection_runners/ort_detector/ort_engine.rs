//! ONNX Runtime backend.

use std::time::Instant;
use anyhow::Result;
use half::f16;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session, SessionOutputs},
    value::{DynValue, TensorRef},
};
use regex::Regex;
use crate::common::InferenceDevice;
use crate::data::{ConfigOrt, TimeCalc, CROSS_MARK};
use crate::detection_runners::inference_process::InferenceBackend;
use crate::detection_runners::ort_detector::input_wrapper::X;
use crate::detection_runners::ort_detector::xs::Xs;
use crate::utils::human_bytes;

/// ONNXRuntime session owned by one scoring worker.
#[derive(Debug)]
pub struct OrtEngine {
    session: Session,
    device: InferenceDevice,
    input_name: String,
    output_names: Vec<String>,
    batched: bool,
    fp16_input: bool,
    names: Option<Vec<String>>,
    pub infer_time: TimeCalc,
}

impl OrtEngine {
    /// Builds a session from in-memory weights.
    ///
    /// `batched` says whether the model's first input carries a batch axis. Models
    /// exported per image (input `[C, H, W]`) are run once per item of a batch.
    pub fn new(config: &ConfigOrt, weights: &[u8], batched: bool) -> Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().with_name("batch_detect").commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;

        let device = config.device;
        match device {
            InferenceDevice::TensorRT(device_id) => {
                let cache_path = config.trt_engine_cache_path.to_string_lossy().to_string();
                log::info!("🐢 Initial model serialization with TensorRT may takes some time...");
                builder = builder
                    .with_execution_providers([
                        TensorRTExecutionProvider::default()
                            .with_device_id(device_id as i32)
                            .with_fp16(config.trt_fp16_enable)
                            .with_engine_cache(config.trt_engine_cache_enable)
                            .with_engine_cache_path(cache_path)
                            .build()
                            .error_on_failure(),
                    ])
                    .map_err(|e| anyhow::anyhow!("{CROSS_MARK} TensorRT initialization failed: {e}"))?;
            }
            InferenceDevice::CUDA(device_id) => {
                builder = builder
                    .with_execution_providers([
                        CUDAExecutionProvider::default()
                            .with_device_id(device_id as i32)
                            .build()
                            .error_on_failure(),
                    ])
                    .map_err(|e| anyhow::anyhow!("{CROSS_MARK} CUDA initialization failed: {e}"))?;
            }
            InferenceDevice::CPU => {}
        }

        let session = builder.commit_from_memory(weights)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => anyhow::bail!("Model has no inputs"),
        };
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        log::info!(
            "Backend: ONNXRuntime | Device: {} | Weights: {} | Input: {} | Outputs: {:?}",
            device,
            human_bytes(weights.len() as f64),
            input_name,
            output_names,
        );

        let mut engine = Self {
            session,
            device,
            input_name,
            output_names,
            batched,
            fp16_input: config.fp16_input,
            names: None,
            infer_time: TimeCalc::default(),
        };

        // Class names: user-defined.or(parsed)
        engine.names = match (&config.names, engine.fetch_names()) {
            (Some(names), Some(parsed)) if names.len() != parsed.len() => {
                anyhow::bail!(
                    "The lengths of parsed class names: {} and user-defined class names: {} do not match.",
                    parsed.len(),
                    names.len(),
                );
            }
            (Some(names), _) => Some(names.clone()),
            (None, parsed) => parsed,
        };

        Ok(engine)
    }

    fn run_once(&mut self, x: &Array<f32, IxDyn>) -> Result<Xs> {
        let input = x.as_standard_layout();
        let t_run = Instant::now();
        let ys = if self.fp16_input {
            let input = input.mapv(f16::from_f32);
            let outputs = self.session.run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(input.view())?
            ])?;
            Self::extract(&outputs, &self.output_names)?
        } else {
            let outputs = self.session.run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(input.view())?
            ])?;
            Self::extract(&outputs, &self.output_names)?
        };
        self.infer_time.add_or_push(0, t_run.elapsed());
        Ok(ys)
    }

    fn extract(outputs: &SessionOutputs, names: &[String]) -> Result<Xs> {
        let mut ys = Xs::new();
        for name in names {
            let y = Self::tensor_postprocess(&outputs[name.as_str()])
                .map_err(|e| anyhow::anyhow!("output `{name}`: {e}"))?;
            ys.push_kv(name, X::from(y))?;
        }
        Ok(ys)
    }

    /// Converts any numeric output to `f32`. Detection heads commonly emit `int64` labels.
    fn tensor_postprocess(x: &DynValue) -> Result<Array<f32, IxDyn>> {
        if let Ok(y) = x.try_extract_array::<f32>() {
            return Ok(y.into_owned());
        }
        if let Ok(y) = x.try_extract_array::<i64>() {
            return Ok(y.mapv(|v| v as f32));
        }
        if let Ok(y) = x.try_extract_array::<i32>() {
            return Ok(y.mapv(|v| v as f32));
        }
        if let Ok(y) = x.try_extract_array::<f16>() {
            return Ok(y.mapv(f16::to_f32));
        }
        if let Ok(y) = x.try_extract_array::<f64>() {
            return Ok(y.mapv(|v| v as f32));
        }
        anyhow::bail!("Unsupported ort tensor type")
    }

    pub fn try_fetch(&self, key: &str) -> Option<String> {
        match self.session.metadata() {
            Err(_) => None,
            Ok(metadata) => metadata.custom(key).unwrap_or_default(),
        }
    }

    fn fetch_names(&self) -> Option<Vec<String>> {
        // String format: `{0: 'person', 1: 'bicycle', 2: 'sports ball', ..., 27: "yellow_lady's_slipper"}`
        self.try_fetch("names").map(|names| parse_names(&names))
    }

    pub fn device(&self) -> &InferenceDevice {
        &self.device
    }
}

impl InferenceBackend for OrtEngine {
    fn forward(&mut self, batch: &X) -> Result<Vec<Xs>> {
        if !self.batched {
            let mut ys = Vec::with_capacity(batch.shape()[0]);
            for x in batch.unstack() {
                ys.push(self.run_once(&x)?);
            }
            return Ok(ys);
        }

        let n = batch.shape()[0];
        let ys = self.run_once(batch)?;
        Ok(ys.split_batch(n)?)
    }

    fn class_names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    fn describe(&self) -> String {
        format!("ONNXRuntime on {} ({} runs, avg {:.2?})", self.device, self.infer_time.n(), self.infer_time.avg())
    }
}

fn parse_names(names: &str) -> Vec<String> {
    let re = Regex::new(r#"(['"])([-()\w '"]+)(['"])"#).expect("static regex");
    let mut names_ = vec![];
    for (_, [_, name, _]) in re.captures_iter(names).map(|x| x.extract()) {
        names_.push(name.to_string());
    }
    names_
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_from_metadata() {
        let names = parse_names("{0: 'person', 1: 'bicycle', 2: 'sports ball'}");
        assert_eq!(names, vec!["person", "bicycle", "sports ball"]);
    }
}
