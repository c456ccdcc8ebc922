//! Byte-object store contract and a local filesystem implementation.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::paths::Location;

/// Failure modes of an object store call.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// No object exists at the location.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Any other failure reaching or using the store.
    #[error("object store error: {0}")]
    Transport(String),
}

/// Get/put access to objects addressed by [`Location`].
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    /// Read the whole object.
    async fn get(&self, location: &Location) -> Result<Vec<u8>, ObjectStoreError>;

    /// Create or replace the object.
    async fn put(&self, location: &Location, bytes: &[u8]) -> Result<(), ObjectStoreError>;
}

/// Object store backed by a local directory: `root/container/object_path`.
///
/// Writes go to a temporary sibling file that is renamed into place, so a
/// failed `put` never leaves a partial object behind.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a location to a path under the root, refusing anything that could
    /// escape it.
    pub fn path_for(&self, location: &Location) -> Result<PathBuf, ObjectStoreError> {
        let mut path = self.root.clone();
        for part in [location.container.as_str(), location.object_path.as_str()] {
            for component in Path::new(part).components() {
                match component {
                    Component::Normal(segment) => path.push(segment),
                    Component::CurDir => {}
                    _ => {
                        return Err(ObjectStoreError::Transport(format!(
                            "refusing path outside the store root: {location}"
                        )));
                    }
                }
            }
        }
        Ok(path)
    }
}

impl ObjectStore for FsObjectStore {
    async fn get(&self, location: &Location) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.path_for(location)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), len = bytes.len(), "read object");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(location.to_string()))
            }
            Err(e) => Err(ObjectStoreError::Transport(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }

    async fn put(&self, location: &Location, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let target = self.path_for(location)?;
        let (Some(dir), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(ObjectStoreError::Transport(format!(
                "no file name in {location}"
            )));
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ObjectStoreError::Transport(format!("{}: {e}", dir.display())))?;

        let temp = dir.join(format!(
            ".{}.{}.tmp",
            name.to_string_lossy(),
            Uuid::now_v7()
        ));

        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ObjectStoreError::Transport(format!(
                "{}: {e}",
                temp.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ObjectStoreError::Transport(format!(
                "{}: {e}",
                target.display()
            )));
        }

        debug!(path = %target.display(), len = bytes.len(), "wrote object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FsObjectStore {
        FsObjectStore::new(std::env::temp_dir().join(format!("mb_store_{}", Uuid::now_v7())))
    }

    fn loc(container: &str, object_path: &str) -> Location {
        Location {
            scheme: "gs".into(),
            container: container.into(),
            object_path: object_path.into(),
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = temp_store();
        let location = loc("bucket", "docs/markdown/a.md");
        store.put(&location, b"# A\n").await.expect("put");

        assert_eq!(store.get(&location).await.expect("get"), b"# A\n");
        assert!(store.root().join("bucket/docs/markdown/a.md").is_file());
    }

    #[tokio::test]
    async fn put_replaces_and_leaves_no_temp_files() {
        let store = temp_store();
        let location = loc("bucket", "a.md");
        store.put(&location, b"one").await.unwrap();
        store.put(&location, b"two").await.unwrap();

        assert_eq!(store.get(&location).await.unwrap(), b"two");
        let entries: Vec<_> = std::fs::read_dir(store.root().join("bucket"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = temp_store();
        let err = store.get(&loc("bucket", "nope.html")).await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected() {
        let store = temp_store();
        for location in [
            loc("bucket", "../../etc/passwd"),
            loc("..", "x.html"),
            loc("bucket", "/etc/passwd"),
        ] {
            assert!(matches!(
                store.get(&location).await,
                Err(ObjectStoreError::Transport(_))
            ));
        }
    }

    #[tokio::test]
    async fn failed_put_leaves_nothing_behind() {
        let store = temp_store();
        // A directory where the object should go makes the rename fail.
        std::fs::create_dir_all(store.root().join("bucket/a.md/inner")).unwrap();

        let err = store.put(&loc("bucket", "a.md"), b"data").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::Transport(_)));

        let entries: Vec<_> = std::fs::read_dir(store.root().join("bucket"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["a.md".to_string()]);
    }
}
