use std::path::PathBuf;

use crate::eid::Eid;

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn list(&self) -> Vec<String>;
}

#[derive(Clone)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: &str) -> std::io::Result<Self> {
        let path = PathBuf::from(storage_dir);
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.base_dir.join(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.base_dir.join(ident))
    }

    /// Writes to a sibling temp file first, then renames over the target,
    /// so readers never see a half-written blob.
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.base_dir.join(ident);
        let temp_path = self.base_dir.join(format!(".{}-{ident}", Eid::new()));

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, &path)
    }

    fn list(&self) -> Vec<String> {
        std::fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let path = entry.path();
                        if path.is_file() {
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .filter(|name| !name.starts_with('.'))
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();

        assert!(!storage.exists("a.json"));
        storage.write("a.json", b"{}").unwrap();
        assert!(storage.exists("a.json"));
        assert_eq!(storage.read("a.json").unwrap(), b"{}");

        storage.write("a.json", b"[]").unwrap();
        assert_eq!(storage.read("a.json").unwrap(), b"[]");
    }

    #[test]
    fn test_list_skips_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();

        storage.write("one.json", b"1").unwrap();
        storage.write("two.json", b"2").unwrap();
        std::fs::write(dir.path().join(".pending-three.json"), b"3").unwrap();

        let mut names = storage.list();
        names.sort();
        assert_eq!(names, vec!["one.json".to_string(), "two.json".to_string()]);
    }
}
