use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::common::{Batch, PredictionRecord, Value};
use crate::data::{PredictOptions, TimeCalc, X};
use crate::detection_runners::InferenceBackend;
use crate::error::DetectError;
use crate::predictor::{Checkpoint, OutputFormat};
use crate::runtime::{Block, ExecutionStats, Plan, PoolConfig, Runtime, Stage, StageWorker, WorkerSlot};
use crate::source::Dataset;
use crate::utils::trace;

/// Runs a checkpoint over a dataset on a pool of scoring workers.
#[derive(Debug, Clone)]
pub struct BatchPredictor {
    checkpoint: Checkpoint,
    format: Arc<dyn OutputFormat>,
}

/// Prediction records in dataset order, with run statistics.
#[derive(Debug)]
pub struct PredictionResult {
    pub records: Vec<PredictionRecord>,
    pub stats: ExecutionStats,
}

impl PredictionResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PredictionRecord> {
        self.records.iter()
    }

    pub fn num_detections(&self) -> usize {
        self.records.iter().map(PredictionRecord::len).sum()
    }

    /// Average time per batch spent preprocessing, in the model, and formatting output.
    pub fn stage_averages(&self) -> [Duration; 3] {
        let t = &self.stats.timings;
        [t.avg_i(0), t.avg_i(1), t.avg_i(2)]
    }
}

impl BatchPredictor {
    pub fn from_checkpoint<F: OutputFormat + 'static>(checkpoint: Checkpoint, format: F) -> Self {
        Self {
            checkpoint,
            format: Arc::new(format),
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn predict(
        &self,
        runtime: &Runtime,
        dataset: &Dataset,
        options: &PredictOptions,
    ) -> Result<PredictionResult, DetectError> {
        options.validate()?;

        let plan = Plan {
            read_tasks: dataset.read_tasks().to_vec(),
            stage: ScoringStage {
                checkpoint: self.checkpoint.clone(),
                format: Arc::clone(&self.format),
                options: options.clone(),
            },
            pool: PoolConfig {
                min_workers: options.min_scoring_workers,
                max_workers: options.max_scoring_workers,
                cpus_per_worker: options.num_cpus_per_worker,
                gpus_per_worker: options.num_gpus_per_worker,
            },
        };

        let execution = runtime.execute(plan)?;
        let result = PredictionResult {
            records: execution.outputs,
            stats: execution.stats,
        };

        let [pre, infer, post] = result.stage_averages();
        log::info!(
            "Scored {} image(s), {} detection(s) | per batch: preprocess {:.2?}, inference {:.2?}, format {:.2?}",
            result.len(),
            result.num_detections(),
            pre,
            infer,
            post
        );
        Ok(result)
    }
}

struct ScoringStage {
    checkpoint: Checkpoint,
    format: Arc<dyn OutputFormat>,
    options: PredictOptions,
}

impl Stage for ScoringStage {
    type Output = PredictionRecord;
    type Worker = ScoringWorker;

    fn name(&self) -> &str {
        "batch_predict"
    }

    fn start(&self, slot: &WorkerSlot) -> Result<ScoringWorker, DetectError> {
        let backend = self
            .checkpoint
            .weights()
            .load(slot)
            .map_err(|e| DetectError::worker(slot.index, format!("backend failed to start: {e:#}")))?;
        log::debug!("Worker {}: {}", slot.index, backend.describe());

        Ok(ScoringWorker {
            index: slot.index,
            backend,
            checkpoint: self.checkpoint.clone(),
            format: Arc::clone(&self.format),
            options: self.options.clone(),
            timings: Default::default(),
        })
    }
}

struct ScoringWorker {
    index: usize,
    backend: Box<dyn InferenceBackend>,
    checkpoint: Checkpoint,
    format: Arc<dyn OutputFormat>,
    options: PredictOptions,
    timings: TimeCalc,
}

impl ScoringWorker {
    fn score_batch(&mut self, batch: Batch) -> Result<Vec<PredictionRecord>, DetectError> {
        let n = batch.len();
        let t_start = Instant::now();

        let kept = batch
            .iter()
            .map(|record| {
                record.select(&self.options.keep_columns).map_err(|column| {
                    DetectError::Format(format!("keep column `{}` missing from input record", column))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let batch = self.checkpoint.preprocess(batch)?;
        if batch.len() != n {
            return Err(DetectError::Format(format!(
                "preprocessing returned {} records for {}",
                batch.len(),
                n
            )));
        }

        let feature = &self.options.feature_columns[0];
        let features = batch
            .iter()
            .map(|record| match record.get(feature) {
                Some(Value::Tensor(t)) => Ok(t),
                Some(other) => Err(DetectError::Format(format!(
                    "feature column `{}` holds a {}, expected a tensor",
                    feature,
                    other.kind()
                ))),
                None => Err(DetectError::Format(format!("feature column `{}` missing", feature))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let input = X::stack(&features)?;
        let t_pre = trace("Scoring", "preprocess", t_start, Duration::ZERO);

        let native = self
            .backend
            .forward(&input)
            .map_err(|e| DetectError::worker(self.index, format!("forward pass failed: {e:#}")))?;
        if native.len() != n {
            return Err(DetectError::worker(
                self.index,
                format!("model returned {} outputs for a batch of {}", native.len(), n),
            ));
        }
        let t_infer = trace("Scoring", "inference", t_start, t_pre);

        let names = self.backend.class_names();
        let records = native
            .iter()
            .zip(kept)
            .map(|(xs, kept)| Ok(PredictionRecord::new(self.format.format(xs, names)?, kept)))
            .collect::<Result<Vec<_>, DetectError>>()?;
        let t_post = trace("Scoring", "format", t_start, t_infer);

        self.timings.add_or_push(0, t_pre);
        self.timings.add_or_push(1, t_infer - t_pre);
        self.timings.add_or_push(2, t_post - t_infer);
        Ok(records)
    }
}

impl StageWorker for ScoringWorker {
    type Output = PredictionRecord;

    fn process(&mut self, block: Block) -> Result<Vec<PredictionRecord>, DetectError> {
        let mut out = Vec::with_capacity(block.len());
        let mut records = block.into_iter().peekable();
        while records.peek().is_some() {
            let batch: Batch = records.by_ref().take(self.options.batch_size).collect();
            out.extend(self.score_batch(batch)?);
        }
        Ok(out)
    }

    fn timings(&self) -> TimeCalc {
        self.timings.clone()
    }
}
