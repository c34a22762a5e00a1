use crate::common::IMAGE_COLUMN;
use crate::error::DetectError;

/// Sizing and column selection for one `BatchPredictor::predict` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictOptions {
    pub batch_size: usize,
    pub min_scoring_workers: usize,
    pub max_scoring_workers: usize,
    pub num_cpus_per_worker: usize,
    pub num_gpus_per_worker: usize,
    pub feature_columns: Vec<String>,
    pub keep_columns: Vec<String>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            min_scoring_workers: 1,
            max_scoring_workers: 1,
            num_cpus_per_worker: 1,
            num_gpus_per_worker: 0,
            feature_columns: vec![IMAGE_COLUMN.to_string()],
            keep_columns: vec![],
        }
    }
}

impl PredictOptions {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_scoring_workers(mut self, min: usize, max: usize) -> Self {
        self.min_scoring_workers = min;
        self.max_scoring_workers = max;
        self
    }

    pub fn with_cpus_per_worker(mut self, n: usize) -> Self {
        self.num_cpus_per_worker = n;
        self
    }

    pub fn with_gpus_per_worker(mut self, n: usize) -> Self {
        self.num_gpus_per_worker = n;
        self
    }

    pub fn with_feature_columns(mut self, columns: &[&str]) -> Self {
        self.feature_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_keep_columns(mut self, columns: &[&str]) -> Self {
        self.keep_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        if self.batch_size == 0 {
            return Err(DetectError::Config("batch_size must be at least 1".into()));
        }
        if self.min_scoring_workers == 0 {
            return Err(DetectError::Config("min_scoring_workers must be at least 1".into()));
        }
        if self.min_scoring_workers > self.max_scoring_workers {
            return Err(DetectError::Config(format!(
                "min_scoring_workers ({}) exceeds max_scoring_workers ({})",
                self.min_scoring_workers, self.max_scoring_workers
            )));
        }
        if self.num_cpus_per_worker == 0 {
            return Err(DetectError::Config("num_cpus_per_worker must be at least 1".into()));
        }
        // One tensor per model input.
        if self.feature_columns.len() != 1 {
            return Err(DetectError::Config(format!(
                "exactly one feature column is supported, got {:?}",
                self.feature_columns
            )));
        }
        Ok(())
    }
}
