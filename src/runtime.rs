//! Process-wide execution context: object store, resources and the scheduler.

pub mod object_store;
pub mod resources;
pub mod scheduler;

pub use object_store::{Block, ObjectRef, ObjectStore, StoreStats};
pub use resources::{PoolConfig, Reservation, ResourcePool, WorkerSlot};
pub use scheduler::{Execution, ExecutionStats, Plan, Stage, StageWorker};

use crate::data::RuntimeConfig;
use crate::error::DetectError;
use crate::utils::human_bytes;

/// Explicit handle to the execution context. Create one per process and pass it
/// to every job.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    store: ObjectStore,
    resources: ResourcePool,
}

impl Runtime {
    pub fn init(config: RuntimeConfig) -> Result<Self, DetectError> {
        config.validate()?;

        let num_cpus = config.num_cpus.unwrap_or_else(ResourcePool::detect_cpus);
        let store = ObjectStore::new(config.object_store_memory, config.spilling.directory())?;
        let resources = ResourcePool::new(num_cpus, config.num_gpus);

        log::info!(
            "Runtime ready | CPUs: {} | GPUs: {} | Object store: {} | Spill dir: {}",
            num_cpus,
            config.num_gpus,
            human_bytes(config.object_store_memory as f64),
            store.spill_dir().display(),
        );

        Ok(Self {
            config,
            store,
            resources,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn object_store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn resources(&self) -> &ResourcePool {
        &self.resources
    }

    pub fn execute<S: Stage>(&self, plan: Plan<S>) -> Result<Execution<S::Output>, DetectError> {
        scheduler::execute(&self.store, &self.resources, plan)
    }
}
