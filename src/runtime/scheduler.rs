//! Runs a plan: read tasks feed the object store, a pool of workers maps blocks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use crate::data::TimeCalc;
use crate::error::DetectError;
use crate::runtime::object_store::{Block, ObjectRef, ObjectStore};
use crate::runtime::resources::{PoolConfig, ResourcePool, WorkerSlot};
use crate::source::ReadTask;

/// A stateless transformation applied by every worker of the pool.
///
/// `start` runs on the worker's own thread, so per-worker state (a loaded model)
/// never crosses threads.
pub trait Stage: Sync {
    type Output: Send;
    type Worker: StageWorker<Output = Self::Output>;

    fn name(&self) -> &str;

    fn start(&self, slot: &WorkerSlot) -> Result<Self::Worker, DetectError>;
}

pub trait StageWorker {
    type Output;

    /// Maps a block to exactly one output per input record, in order.
    fn process(&mut self, block: Block) -> Result<Vec<Self::Output>, DetectError>;

    fn timings(&self) -> TimeCalc {
        TimeCalc::default()
    }
}

/// Everything needed to run one job.
pub struct Plan<S> {
    pub read_tasks: Vec<ReadTask>,
    pub stage: S,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub workers: usize,
    pub blocks: usize,
    pub records: usize,
    pub spilled_blocks: usize,
    pub elapsed: Duration,
    /// Per-stage timings merged across workers.
    pub timings: TimeCalc,
}

#[derive(Debug)]
pub struct Execution<T> {
    pub outputs: Vec<T>,
    pub stats: ExecutionStats,
}

struct Task {
    index: usize,
    records: usize,
    object: ObjectRef,
}

enum Event<T> {
    Block { index: usize, outputs: Vec<T> },
    Failed(DetectError),
    Done(TimeCalc),
}

pub(crate) fn execute<S: Stage>(
    store: &ObjectStore,
    resources: &ResourcePool,
    plan: Plan<S>,
) -> Result<Execution<S::Output>, DetectError> {
    let t_start = Instant::now();
    let reservation = resources.reserve(&plan.pool)?;
    let spilled_before = store.stats().total_spilled;
    let n_blocks = plan.read_tasks.len();

    log::info!(
        "Running `{}` on {} worker(s) over {} block(s)",
        plan.stage.name(),
        reservation.len(),
        n_blocks
    );

    let failed = AtomicBool::new(false);
    let read_records = AtomicUsize::new(0);
    let (task_tx, task_rx) = crossbeam_channel::unbounded::<Task>();
    let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event<S::Output>>();

    let stage = &plan.stage;
    let mut first_error: Option<DetectError> = None;
    let mut blocks: Vec<Option<Vec<S::Output>>> = (0..n_blocks).map(|_| None).collect();
    let mut timings = TimeCalc::default();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(reservation.len());
        for slot in reservation.slots() {
            let tasks = task_rx.clone();
            let events = event_tx.clone();
            let failed = &failed;
            let spawned = thread::Builder::new()
                .name(format!("scoring-worker-{}", slot.index))
                .spawn_scoped(scope, move || run_worker(stage, slot, store, tasks, events, failed));
            match spawned {
                Ok(handle) => handles.push((slot.index, handle)),
                Err(e) => {
                    failed.store(true, Ordering::SeqCst);
                    first_error.get_or_insert(DetectError::worker(slot.index, format!("failed to spawn: {e}")));
                    break;
                }
            }
        }
        drop(event_tx);

        let read = plan
            .read_tasks
            .par_iter()
            .enumerate()
            .try_for_each(|(index, task)| -> Result<(), DetectError> {
                if failed.load(Ordering::SeqCst) {
                    return Ok(());
                }
                let block = task.read()?;
                let records = block.len();
                read_records.fetch_add(records, Ordering::SeqCst);
                let object = store.put(block)?;
                // The receiver outlives this loop, so sending cannot fail.
                let _ = task_tx.send(Task { index, records, object });
                Ok(())
            });
        drop(task_tx);
        if let Err(e) = read {
            failed.store(true, Ordering::SeqCst);
            first_error.get_or_insert(e);
        }

        for event in event_rx.iter() {
            match event {
                Event::Block { index, outputs } => blocks[index] = Some(outputs),
                Event::Failed(e) => {
                    failed.store(true, Ordering::SeqCst);
                    first_error.get_or_insert(e);
                }
                Event::Done(t) => timings.merge(&t),
            }
        }

        for (worker, handle) in handles {
            if handle.join().is_err() {
                first_error.get_or_insert(DetectError::worker(worker, "worker panicked"));
            }
        }
    });

    for task in task_rx.try_iter() {
        store.release(task.object);
    }

    if let Some(e) = first_error {
        log::error!("`{}` failed: {}", plan.stage.name(), e);
        return Err(e);
    }

    let mut outputs = Vec::with_capacity(read_records.load(Ordering::SeqCst));
    for (index, block) in blocks.into_iter().enumerate() {
        match block {
            Some(block) => outputs.extend(block),
            None => return Err(DetectError::worker(0, format!("block {index} was never processed"))),
        }
    }

    let records = read_records.load(Ordering::SeqCst);
    if outputs.len() != records {
        return Err(DetectError::worker(
            0,
            format!("{} outputs for {} input records", outputs.len(), records),
        ));
    }

    let stats = ExecutionStats {
        workers: reservation.len(),
        blocks: n_blocks,
        records,
        spilled_blocks: store.stats().total_spilled - spilled_before,
        elapsed: t_start.elapsed(),
        timings,
    };
    log::info!(
        "`{}` finished: {} record(s) in {:.2?} ({} block(s) spilled)",
        plan.stage.name(),
        stats.records,
        stats.elapsed,
        stats.spilled_blocks
    );

    Ok(Execution { outputs, stats })
}

fn run_worker<S: Stage>(
    stage: &S,
    slot: &WorkerSlot,
    store: &ObjectStore,
    tasks: Receiver<Task>,
    events: Sender<Event<S::Output>>,
    failed: &AtomicBool,
) {
    let mut worker = match stage.start(slot) {
        Ok(worker) => worker,
        Err(e) => {
            failed.store(true, Ordering::SeqCst);
            let _ = events.send(Event::Failed(e));
            return;
        }
    };
    log::debug!("Worker {} ready ({} CPU(s), GPUs {:?})", slot.index, slot.cpus, slot.gpu_ids);

    for task in tasks.iter() {
        if failed.load(Ordering::SeqCst) {
            store.release(task.object);
            continue;
        }

        let event = match store.take(task.object).and_then(|block| worker.process(block)) {
            Ok(outputs) if outputs.len() == task.records => Event::Block {
                index: task.index,
                outputs,
            },
            Ok(outputs) => Event::Failed(DetectError::worker(
                slot.index,
                format!(
                    "block {} produced {} outputs for {} records",
                    task.index,
                    outputs.len(),
                    task.records
                ),
            )),
            Err(e) => Event::Failed(e),
        };
        if matches!(event, Event::Failed(_)) {
            failed.store(true, Ordering::SeqCst);
        }
        let _ = events.send(event);
    }

    let _ = events.send(Event::Done(worker.timings()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Record, Value};

    struct Double;

    struct DoubleWorker;

    impl Stage for Double {
        type Output = f32;
        type Worker = DoubleWorker;

        fn name(&self) -> &str {
            "double"
        }

        fn start(&self, _slot: &WorkerSlot) -> Result<DoubleWorker, DetectError> {
            Ok(DoubleWorker)
        }
    }

    impl StageWorker for DoubleWorker {
        type Output = f32;

        fn process(&mut self, block: Block) -> Result<Vec<f32>, DetectError> {
            block
                .iter()
                .map(|r| match r.get("x").and_then(Value::as_tensor) {
                    Some(t) => Ok(t.sum() * 2.0),
                    None => Err(DetectError::Format("missing x".into())),
                })
                .collect()
        }
    }

    fn numbers(range: std::ops::Range<usize>) -> Vec<Record> {
        range
            .map(|i| {
                let t = ndarray::Array::from_elem(ndarray::IxDyn(&[1]), i as f32);
                Record::new().with("x", Value::Tensor(t))
            })
            .collect()
    }

    fn pool(workers: usize) -> PoolConfig {
        PoolConfig {
            min_workers: 1,
            max_workers: workers,
            cpus_per_worker: 1,
            gpus_per_worker: 0,
        }
    }

    #[test]
    fn test_outputs_follow_block_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(1 << 20, dir.path()).unwrap();
        let resources = ResourcePool::new(4, 0);

        let read_tasks = (0..8).map(|b| ReadTask::in_memory(numbers(b * 5..b * 5 + 5))).collect();
        let plan = Plan { read_tasks, stage: Double, pool: pool(4) };

        let execution = execute(&store, &resources, plan).unwrap();
        let expected: Vec<f32> = (0..40).map(|i| i as f32 * 2.0).collect();
        assert_eq!(execution.outputs, expected);
        assert_eq!(execution.stats.workers, 4);
        assert_eq!(execution.stats.records, 40);
        assert_eq!(resources.available_cpus(), 4);
    }

    #[test]
    fn test_worker_error_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(1 << 20, dir.path()).unwrap();
        let resources = ResourcePool::new(2, 0);

        let mut bad = numbers(0..3);
        bad[1] = Record::new().with("y", Value::Text("nope".into()));
        let read_tasks = vec![ReadTask::in_memory(numbers(0..3)), ReadTask::in_memory(bad)];
        let plan = Plan { read_tasks, stage: Double, pool: pool(2) };

        let err = execute(&store, &resources, plan).unwrap_err();
        assert!(matches!(err, DetectError::Format(_)));
        assert_eq!(store.stats().in_memory_blocks, 0);
    }

    #[test]
    fn test_spilled_blocks_are_processed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(0, dir.path()).unwrap();
        let resources = ResourcePool::new(2, 0);

        let read_tasks = (0..3).map(|b| ReadTask::in_memory(numbers(b * 2..b * 2 + 2))).collect();
        let plan = Plan { read_tasks, stage: Double, pool: pool(2) };

        let execution = execute(&store, &resources, plan).unwrap();
        assert_eq!(execution.outputs.len(), 6);
        assert_eq!(execution.stats.spilled_blocks, 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
