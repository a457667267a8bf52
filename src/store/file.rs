use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::StoreError;

/// A JSON array persisted in a single file.
///
/// Every read-modify-write goes through the file's mutex, so writers never
/// interleave. Saves land in a sibling temp file first and are renamed over
/// the target.
pub struct JsonFile<T> {
    path: PathBuf,
    mutex: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mutex: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Seed the file with an empty array if it does not exist yet
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        let _guard = self.mutex.lock().await;
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Seeding empty store file {}", self.path.display());
                self.write(&[]).await
            }
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    pub async fn load(&self) -> Result<Vec<T>, StoreError> {
        let _guard = self.mutex.lock().await;
        self.read().await
    }

    /// Load, apply `f`, and save if `f` succeeded, all under the file lock
    pub async fn modify<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R, E>,
        E: From<StoreError>,
    {
        let locked = self.lock().await;
        let mut items = locked.load().await?;
        let result = f(&mut items)?;
        locked.save(&items).await?;
        Ok(result)
    }

    /// Hold the file lock across several operations
    pub async fn lock(&self) -> Locked<'_, T> {
        Locked {
            file: self,
            _guard: self.mutex.lock().await,
        }
    }

    async fn read(&self) -> Result<Vec<T>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| StoreError::json(&self.path, e))
    }

    async fn write(&self, items: &[T]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(items).map_err(|e| StoreError::json(&self.path, e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }
}

/// Exclusive access to a [`JsonFile`] for multi-step updates
pub struct Locked<'a, T> {
    file: &'a JsonFile<T>,
    _guard: MutexGuard<'a, ()>,
}

impl<T> Locked<'_, T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub async fn load(&self) -> Result<Vec<T>, StoreError> {
        self.file.read().await
    }

    pub async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        self.file.write(items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file: JsonFile<String> = JsonFile::new(temp_dir.path().join("missing.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_file_reads_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("blank.json");
        std::fs::write(&path, "  \n").unwrap();
        let file: JsonFile<String> = JsonFile::new(path);
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_exists_seeds_array() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        let file: JsonFile<String> = JsonFile::new(&path);
        file.ensure_exists().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.trim(), "[]");
    }

    #[tokio::test]
    async fn test_ensure_exists_keeps_content() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        std::fs::write(&path, r#"["kept"]"#).unwrap();
        let file: JsonFile<String> = JsonFile::new(&path);
        file.ensure_exists().await.unwrap();
        assert_eq!(file.load().await.unwrap(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_modify_saves_on_ok_only() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file: JsonFile<String> = JsonFile::new(temp_dir.path().join("items.json"));

        file.modify(|items| {
            items.push("a".to_string());
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

        let result: Result<(), StoreError> = file
            .modify(|items| {
                items.push("b".to_string());
                Err(StoreError::io(
                    Path::new("x"),
                    std::io::Error::new(ErrorKind::Other, "rejected"),
                ))
            })
            .await;
        assert!(result.is_err());

        assert_eq!(file.load().await.unwrap(), vec!["a".to_string()]);
        assert!(!temp_dir.path().join("items.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        std::fs::write(&path, "{not json").unwrap();
        let file: JsonFile<String> = JsonFile::new(path);
        assert!(matches!(file.load().await, Err(StoreError::Json { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_modify_loses_nothing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file: Arc<JsonFile<u32>> = Arc::new(JsonFile::new(temp_dir.path().join("n.json")));

        let mut handles = Vec::new();
        for i in 0..20 {
            let file = file.clone();
            handles.push(tokio::spawn(async move {
                file.modify(|items| {
                    items.push(i);
                    Ok::<_, StoreError>(())
                })
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut items = file.load().await.unwrap();
        items.sort();
        assert_eq!(items, (0..20).collect::<Vec<_>>());
    }
}
