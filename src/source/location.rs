use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use crate::error::DetectError;

/// Where the input images live: a local path or a bucket URI such as
/// `s3://bucket/prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    Local(PathBuf),
    Remote { scheme: String, uri: String },
}

impl StorageLocation {
    pub fn parse(location: &str) -> Result<Self, DetectError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(DetectError::Storage("empty storage location".into()));
        }

        match location.split_once("://") {
            Some(("file", path)) => Ok(StorageLocation::Local(PathBuf::from(path))),
            Some((scheme, _)) => Ok(StorageLocation::Remote {
                scheme: scheme.to_lowercase(),
                uri: location.to_string(),
            }),
            None => Ok(StorageLocation::Local(PathBuf::from(location))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageLocation::Remote { .. })
    }
}

impl FromStr for StorageLocation {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&Path> for StorageLocation {
    fn from(path: &Path) -> Self {
        StorageLocation::Local(path.to_path_buf())
    }
}

impl From<PathBuf> for StorageLocation {
    fn from(path: PathBuf) -> Self {
        StorageLocation::Local(path)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Local(path) => write!(f, "{}", path.display()),
            StorageLocation::Remote { uri, .. } => write!(f, "{}", uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locations() {
        assert_eq!(
            StorageLocation::parse("/data/posters").unwrap(),
            StorageLocation::Local(PathBuf::from("/data/posters"))
        );
        assert_eq!(
            StorageLocation::parse("file:///data/posters").unwrap(),
            StorageLocation::Local(PathBuf::from("/data/posters"))
        );

        let remote = StorageLocation::parse("s3://waleed-movies").unwrap();
        assert_eq!(remote.to_string(), "s3://waleed-movies");
        assert!(remote.is_remote());
        assert!(matches!(remote, StorageLocation::Remote { ref scheme, .. } if scheme == "s3"));

        assert!(StorageLocation::parse("  ").is_err());
    }
}
