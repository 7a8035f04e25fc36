use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

use crate::error::StorageError;

/// Client-local key/value persistence.
#[cfg_attr(test, automock)]
pub trait LocalStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Storage kept as a flat JSON object in a single file, so it survives
/// restarts. The file is read on every access; a missing file is empty.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> FileStorage {
        FileStorage { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.load()?;
        values.insert(key.to_owned(), value.to_owned());
        self.save(&values)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use rand::{distributions::Alphanumeric, thread_rng, Rng};

    use super::*;

    fn temp_path() -> PathBuf {
        let name: String = thread_rng().sample_iter(&Alphanumeric).take(10).collect();
        env::temp_dir().join(format!("lunch_poll_{}.json", name))
    }

    #[test]
    fn file_storage_survives_new_handle() {
        let path = temp_path();
        let mut storage = FileStorage::new(&path);
        assert_eq!(storage.get("vote").unwrap(), None);

        storage.set("vote", "p1").unwrap();
        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get("vote").unwrap().as_deref(), Some("p1"));

        storage.remove("vote").unwrap();
        assert_eq!(reopened.get("vote").unwrap(), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path();
        fs::write(&path, "{not json").unwrap();
        let storage = FileStorage::new(&path);
        match storage.get("vote") {
            Err(StorageError::Corrupt(_)) => (),
            other => panic!("expected corrupt storage, got {:?}", other),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn memory_storage_round_trips() {
        let mut storage = MemoryStorage::new();
        storage.set("vote", "p2").unwrap();
        assert_eq!(storage.get("vote").unwrap().as_deref(), Some("p2"));
        storage.remove("vote").unwrap();
        assert_eq!(storage.get("vote").unwrap(), None);
    }
}
