use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use crate::error::DetectError;

/// Blocking handle over a bucket-style object store.
///
/// Read tasks run on the rayon pool, so every call drives its own future to
/// completion on a small private tokio runtime.
#[derive(Clone)]
pub struct RemoteStore {
    store: Arc<dyn ObjectStore>,
    io: Arc<tokio::runtime::Runtime>,
    root: String,
    prefix: Option<ObjectPath>,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("store", &self.store.to_string())
            .field("uri", &self.uri())
            .finish()
    }
}

impl RemoteStore {
    /// Connects to `scheme://bucket/prefix`, taking credentials and region from
    /// the usual environment variables of each provider.
    pub fn connect(uri: &str) -> Result<Self, DetectError> {
        let (scheme, _) = uri
            .split_once("://")
            .ok_or_else(|| DetectError::Storage(format!("{} is not a storage URI", uri)))?;

        let built = match scheme.to_lowercase().as_str() {
            "s3" | "s3a" => AmazonS3Builder::from_env()
                .with_url(uri)
                .build()
                .map(|s| Arc::new(s) as Arc<dyn ObjectStore>),
            "gs" => GoogleCloudStorageBuilder::from_env()
                .with_url(uri)
                .build()
                .map(|s| Arc::new(s) as Arc<dyn ObjectStore>),
            "az" | "abfs" | "abfss" | "azure" => MicrosoftAzureBuilder::from_env()
                .with_url(uri)
                .build()
                .map(|s| Arc::new(s) as Arc<dyn ObjectStore>),
            other => {
                return Err(DetectError::Storage(format!(
                    "unsupported storage scheme `{}` in {}",
                    other, uri
                )))
            }
        };
        let store = built.map_err(|e| DetectError::Storage(format!("{}: {}", uri, e)))?;
        Self::new(store, uri)
    }

    /// Wraps an already configured store. `uri` names the bucket and optional prefix.
    pub fn new(store: Arc<dyn ObjectStore>, uri: &str) -> Result<Self, DetectError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| DetectError::Storage(format!("{} is not a storage URI", uri)))?;
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(DetectError::Storage(format!("{} names no bucket", uri)));
        }

        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::parse(prefix).map_err(|e| DetectError::Storage(format!("{}: {}", uri, e)))?)
        };

        let io = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("storage-io")
            .enable_all()
            .build()
            .map_err(|e| DetectError::Storage(format!("cannot start storage runtime: {}", e)))?;

        Ok(Self {
            store,
            io: Arc::new(io),
            root: format!("{}://{}", scheme.to_lowercase(), bucket),
            prefix,
        })
    }

    pub fn uri(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", self.root, prefix),
            None => self.root.clone(),
        }
    }

    /// Full URI of an object, used as its `path` column.
    pub fn object_uri(&self, key: &ObjectPath) -> String {
        format!("{}/{}", self.root, key)
    }

    /// Every object under the prefix.
    pub fn list(&self) -> Result<Vec<ObjectMeta>, DetectError> {
        let listed: Result<Vec<ObjectMeta>, _> = self
            .io
            .block_on(self.store.list(self.prefix.as_ref()).try_collect());
        listed.map_err(|e| DetectError::Storage(format!("cannot list {}: {}", self.uri(), e)))
    }

    pub fn get(&self, key: &ObjectPath) -> Result<Vec<u8>, DetectError> {
        let fetched = self.io.block_on(async {
            let object = self.store.get(key).await?;
            object.bytes().await
        });
        fetched
            .map(|bytes| bytes.to_vec())
            .map_err(|e| DetectError::Unreadable {
                path: PathBuf::from(self.object_uri(key)),
                source: io::Error::other(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    #[test]
    fn test_lists_and_fetches_under_prefix() {
        let memory = Arc::new(InMemory::new());
        let remote = RemoteStore::new(memory.clone(), "memory://movies/posters/").unwrap();
        assert_eq!(remote.uri(), "memory://movies/posters");

        remote
            .io
            .block_on(async {
                memory.put(&ObjectPath::from("posters/a.png"), PutPayload::from(vec![1u8, 2, 3])).await?;
                memory.put(&ObjectPath::from("other/b.png"), PutPayload::from(vec![4u8])).await
            })
            .unwrap();

        let listed = remote.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(remote.object_uri(&listed[0].location), "memory://movies/posters/a.png");
        assert_eq!(remote.get(&listed[0].location).unwrap(), vec![1, 2, 3]);

        let err = remote.get(&ObjectPath::from("posters/missing.png")).unwrap_err();
        assert!(matches!(err, DetectError::Unreadable { .. }));
    }

    #[test]
    fn test_unknown_scheme_and_missing_bucket() {
        assert!(matches!(RemoteStore::connect("ftp://host/dir"), Err(DetectError::Storage(_))));
        assert!(matches!(
            RemoteStore::new(Arc::new(InMemory::new()), "memory://"),
            Err(DetectError::Storage(_))
        ));
    }
}
