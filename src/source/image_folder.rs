use std::path::{Path, PathBuf};
use crate::error::DetectError;
use crate::source::{ColorMode, Dataset, ReadOptions, ReadTask, RemoteStore, StorageLocation};

pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "tiff", "tif", "bmp", "gif", "webp"];

/// A folder of images, one per file, read into fixed-size records.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    location: StorageLocation,
    options: ReadOptions,
    parallelism: Option<usize>,
    store: Option<RemoteStore>,
}

impl ImageFolder {
    pub fn new<L: Into<StorageLocation>>(location: L) -> Self {
        Self {
            location: location.into(),
            options: ReadOptions {
                width: 300,
                height: 300,
                mode: ColorMode::Rgb,
                include_paths: false,
            },
            parallelism: None,
            store: None,
        }
    }

    /// Reads from an already connected bucket instead of connecting by URI.
    pub fn from_store(store: RemoteStore) -> Self {
        let uri = store.uri();
        let scheme = uri.split_once("://").map(|(s, _)| s.to_string()).unwrap_or_default();
        let mut folder = Self::new(StorageLocation::Remote { scheme, uri });
        folder.store = Some(store);
        folder
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.options.width = width;
        self.options.height = height;
        self
    }

    pub fn with_mode(mut self, mode: ColorMode) -> Self {
        self.options.mode = mode;
        self
    }

    pub fn with_include_paths(mut self, include_paths: bool) -> Self {
        self.options.include_paths = include_paths;
        self
    }

    /// Number of read tasks the files are split into.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = Some(n);
        self
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Lists the images and plans the read tasks. Nothing is decoded yet.
    pub fn read(&self) -> Result<Dataset, DetectError> {
        if self.options.width == 0 || self.options.height == 0 {
            return Err(DetectError::Config(format!(
                "image size must be positive, got {}x{}",
                self.options.width, self.options.height
            )));
        }

        let read_tasks: Vec<ReadTask> = match &self.location {
            StorageLocation::Local(root) => {
                let files = discover(root)?;
                self.split(&files)?
                    .into_iter()
                    .map(|paths| ReadTask::Files {
                        paths,
                        options: self.options,
                    })
                    .collect()
            }
            StorageLocation::Remote { uri, .. } => {
                let store = match &self.store {
                    Some(store) => store.clone(),
                    None => RemoteStore::connect(uri)?,
                };
                let keys = discover_remote(&store)?;
                self.split(&keys)?
                    .into_iter()
                    .map(|keys| ReadTask::Remote {
                        store: store.clone(),
                        keys,
                        options: self.options,
                    })
                    .collect()
            }
        };
        let found: usize = read_tasks.iter().map(ReadTask::len).sum();

        log::info!(
            "Found {} image(s) under {} in {} read task(s)",
            found,
            self.location,
            read_tasks.len()
        );
        Ok(Dataset::new(read_tasks))
    }

    /// Contiguous chunks, one per read task.
    fn split<T: Clone>(&self, items: &[T]) -> Result<Vec<Vec<T>>, DetectError> {
        if items.is_empty() {
            return Err(DetectError::Storage(format!(
                "no images ({}) under {}",
                IMAGE_EXTENSIONS.join(", "),
                self.location
            )));
        }

        let parallelism = self
            .parallelism
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .clamp(1, items.len());
        let chunk = items.len().div_ceil(parallelism);
        Ok(items.chunks(chunk).map(<[T]>::to_vec).collect())
    }
}

fn has_image_extension(extension: Option<&str>) -> bool {
    extension
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_image(path: &Path) -> bool {
    has_image_extension(path.extension().and_then(|e| e.to_str()))
}

/// Supported image files under `root`, sorted.
fn discover(root: &Path) -> Result<Vec<PathBuf>, DetectError> {
    if !root.exists() {
        return Err(DetectError::Storage(format!("{} is unreachable", root.display())));
    }
    if root.is_file() {
        return Ok(if is_image(root) { vec![root.to_path_buf()] } else { vec![] });
    }

    let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
    let entries = glob::glob(&pattern).map_err(|e| DetectError::Storage(format!("{}: {}", root.display(), e)))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() && is_image(&path) => files.push(path),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(DetectError::Unreadable {
                    path,
                    source: e.into_error(),
                });
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Supported image objects under the store's prefix, sorted by key.
fn discover_remote(store: &RemoteStore) -> Result<Vec<object_store::path::Path>, DetectError> {
    let mut keys: Vec<_> = store
        .list()?
        .into_iter()
        .map(|meta| meta.location)
        .filter(|key| has_image_extension(key.extension()))
        .collect();
    keys.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
    Ok(keys)
}
