use std::path::PathBuf;

/// Well-known base directories, used for defaults such as the spill location.
#[derive(Debug)]
pub enum FsAccess {
    Cache,
}

impl FsAccess {
    /// Base path with the crate's own subdirectory appended.
    fn get_path(&self) -> anyhow::Result<PathBuf> {
        let base_path = match self {
            FsAccess::Cache => dirs::cache_dir(),
        };

        let mut path = base_path.ok_or_else(|| {
            anyhow::anyhow!("Unsupported operating system. Supported OS: Linux, MacOS, Windows.")
        })?;

        path.push("batch_detect");
        Ok(path)
    }

    /// Path under the crate directory with the given subdirectories appended. Not created.
    ///
    /// Examples:
    /// `~/.cache/batch_detect/spill`.
    pub fn path_with_subs(&self, subs: &[&str]) -> anyhow::Result<PathBuf> {
        let mut d = self.get_path()?;
        for sub in subs {
            d.push(sub);
        }
        Ok(d)
    }
}
