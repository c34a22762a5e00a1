use crate::common::Record;
use crate::source::ReadTask;

/// A lazily read, partitioned collection of records.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    read_tasks: Vec<ReadTask>,
}

impl Dataset {
    pub fn new(read_tasks: Vec<ReadTask>) -> Self {
        Self { read_tasks }
    }

    /// Splits in-memory records into `partitions` contiguous blocks.
    pub fn from_records(records: Vec<Record>, partitions: usize) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let chunk = records.len().div_ceil(partitions.clamp(1, records.len()));
        let read_tasks = records
            .chunks(chunk)
            .map(|c| ReadTask::in_memory(c.to_vec()))
            .collect();
        Self { read_tasks }
    }

    pub fn read_tasks(&self) -> &[ReadTask] {
        &self.read_tasks
    }

    pub fn num_blocks(&self) -> usize {
        self.read_tasks.len()
    }

    /// Records the dataset yields once read.
    pub fn count(&self) -> usize {
        self.read_tasks.iter().map(ReadTask::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
