//! CPU and GPU accounting for the scoring pool.

use std::sync::Arc;
use parking_lot::Mutex;
use crate::error::DetectError;

/// Resources a pool of identical workers asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub cpus_per_worker: usize,
    pub gpus_per_worker: usize,
}

/// What one worker was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    pub index: usize,
    pub cpus: usize,
    pub gpu_ids: Vec<usize>,
}

#[derive(Debug)]
struct Available {
    cpus: usize,
    gpus: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
    total_cpus: usize,
    total_gpus: usize,
    available: Arc<Mutex<Available>>,
}

impl ResourcePool {
    pub fn new(num_cpus: usize, num_gpus: usize) -> Self {
        Self {
            total_cpus: num_cpus,
            total_gpus: num_gpus,
            available: Arc::new(Mutex::new(Available {
                cpus: num_cpus,
                gpus: (0..num_gpus).collect(),
            })),
        }
    }

    /// CPUs visible to this process.
    pub fn detect_cpus() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn total_cpus(&self) -> usize {
        self.total_cpus
    }

    pub fn total_gpus(&self) -> usize {
        self.total_gpus
    }

    /// Reserves as many workers as fit, up to `max_workers`.
    ///
    /// Fails when fewer than `min_workers` fit. Resources go back to the pool when
    /// the returned reservation is dropped.
    pub fn reserve(&self, config: &PoolConfig) -> Result<Reservation, DetectError> {
        let mut available = self.available.lock();

        let by_cpu = available.cpus / config.cpus_per_worker.max(1);
        let by_gpu = match config.gpus_per_worker {
            0 => usize::MAX,
            n => available.gpus.len() / n,
        };
        let capacity = by_cpu.min(by_gpu);

        if capacity < config.min_workers {
            return Err(DetectError::Resource(format!(
                "cannot place {} workers with {} CPU(s) and {} GPU(s) each: {} CPU(s) and {} GPU(s) available",
                config.min_workers,
                config.cpus_per_worker,
                config.gpus_per_worker,
                available.cpus,
                available.gpus.len(),
            )));
        }

        let n = capacity.min(config.max_workers);
        let mut slots = Vec::with_capacity(n);
        for index in 0..n {
            available.cpus -= config.cpus_per_worker;
            let gpu_ids: Vec<usize> = available.gpus.drain(..config.gpus_per_worker).collect();
            slots.push(WorkerSlot {
                index,
                cpus: config.cpus_per_worker,
                gpu_ids,
            });
        }

        Ok(Reservation {
            slots,
            available: Arc::clone(&self.available),
        })
    }

    pub fn available_cpus(&self) -> usize {
        self.available.lock().cpus
    }

    pub fn available_gpus(&self) -> usize {
        self.available.lock().gpus.len()
    }
}

/// Resources held by a running pool.
#[derive(Debug)]
pub struct Reservation {
    slots: Vec<WorkerSlot>,
    available: Arc<Mutex<Available>>,
}

impl Reservation {
    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut available = self.available.lock();
        for slot in self.slots.drain(..) {
            available.cpus += slot.cpus;
            available.gpus.extend(slot.gpu_ids);
        }
        available.gpus.sort_unstable();
    }
}
