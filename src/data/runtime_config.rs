use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::data::FsAccess;
use crate::error::DetectError;

/// Where blocks go when the object store is over its memory cap.
///
/// Serialized the same way as the `object_spilling_config` JSON accepted by the
/// entrypoint: `{"type": "filesystem", "params": {"directory_path": "/spill"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum SpillingConfig {
    Filesystem { directory_path: PathBuf },
}

impl SpillingConfig {
    pub fn filesystem<P: AsRef<Path>>(directory_path: P) -> Self {
        SpillingConfig::Filesystem {
            directory_path: directory_path.as_ref().to_path_buf(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DetectError> {
        serde_json::from_str(json)
            .map_err(|e| DetectError::Config(format!("invalid object spilling config: {e}")))
    }

    pub fn directory(&self) -> &Path {
        match self {
            SpillingConfig::Filesystem { directory_path } => directory_path,
        }
    }
}

impl Default for SpillingConfig {
    fn default() -> Self {
        let directory_path = FsAccess::Cache
            .path_with_subs(&["spill"])
            .unwrap_or_else(|_| std::env::temp_dir().join("batch_detect").join("spill"));
        SpillingConfig::Filesystem { directory_path }
    }
}

/// Process-wide runtime settings, fixed for the lifetime of a `Runtime`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Memory cap of the object store in bytes.
    pub object_store_memory: usize,
    pub spilling: SpillingConfig,
    /// CPUs the scheduler may hand out. `None` uses the machine's parallelism.
    pub num_cpus: Option<usize>,
    /// GPUs the scheduler may hand out, identified by ids `0..num_gpus`.
    pub num_gpus: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            object_store_memory: 2 * 1024 * 1024 * 1024,
            spilling: SpillingConfig::default(),
            num_cpus: None,
            num_gpus: 0,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_object_store_memory(mut self, bytes: usize) -> Self {
        self.object_store_memory = bytes;
        self
    }

    pub fn with_spilling(mut self, spilling: SpillingConfig) -> Self {
        self.spilling = spilling;
        self
    }

    pub fn with_num_cpus(mut self, n: usize) -> Self {
        self.num_cpus = Some(n);
        self
    }

    pub fn with_num_gpus(mut self, n: usize) -> Self {
        self.num_gpus = n;
        self
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        if self.object_store_memory == 0 {
            return Err(DetectError::Config("object_store_memory must be greater than 0".into()));
        }
        if self.num_cpus == Some(0) {
            return Err(DetectError::Config("num_cpus must be greater than 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spilling_config_json() {
        let json = r#"{"type": "filesystem", "params": {"directory_path": "/home/ec2-user/spilling"}}"#;
        let config = SpillingConfig::from_json(json).unwrap();
        assert_eq!(config.directory(), Path::new("/home/ec2-user/spilling"));

        let back = serde_json::to_string(&config).unwrap();
        assert_eq!(SpillingConfig::from_json(&back).unwrap(), config);
    }

    #[test]
    fn test_unknown_spilling_type_is_rejected() {
        let json = r#"{"type": "smart_open", "params": {"uri": "s3://bucket"}}"#;
        assert!(matches!(SpillingConfig::from_json(json), Err(DetectError::Config(_))));
    }

    #[test]
    fn test_validate() {
        assert!(RuntimeConfig::new().validate().is_ok());
        assert!(RuntimeConfig::new().with_object_store_memory(0).validate().is_err());
        assert!(RuntimeConfig::new().with_num_cpus(0).validate().is_err());
    }
}
