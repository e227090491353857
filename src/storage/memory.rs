use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::{validate_segments, RecordPath, RecordStore, StorageError};

/// 内存记录存储（测试替身）。
///
/// 语义与 `FsDir` 一致，额外提供：
/// - 写 / 删故障注入（`fail_writes` / `fail_deletes` / 仅分组删除的 `fail_group_deletes`）
/// - 分组删除记录（`deleted_groups`），用于断言“最后一条删除后整组落盘删除”
#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    records: Mutex<BTreeMap<RecordPath, Vec<u8>>>,
    deleted_groups: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    fail_group_deletes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("memory"),
            records: Mutex::new(BTreeMap::new()),
            deleted_groups: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_group_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    /// 只让整组删除（一段路径）失败，单条记录删除照常
    pub fn fail_group_deletes(&self, on: bool) {
        self.fail_group_deletes.store(on, Ordering::SeqCst);
    }

    /// 直接写入原始字节（绕过序列化），用于构造损坏 / 重复记录
    pub fn insert_raw(&self, group: &str, name: &str, bytes: impl Into<Vec<u8>>) {
        self.records
            .lock()
            .insert(RecordPath::new(group, name), bytes.into());
    }

    pub fn contains(&self, group: &str, name: &str) -> bool {
        self.records
            .lock()
            .contains_key(&RecordPath::new(group, name))
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.records.lock().keys().any(|p| p.group == group)
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn deleted_groups(&self) -> Vec<String> {
        self.deleted_groups.lock().clone()
    }

    fn injected(op: &'static str, path: &[&str]) -> StorageError {
        StorageError::Injected {
            op,
            segments: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn full_path(&self, path: &[&str]) -> PathBuf {
        path.iter().fold(self.root.clone(), |p, s| p.join(s))
    }
}

impl RecordStore for MemoryStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn get<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T, StorageError> {
        validate_segments(path, 2)?;
        let [group, name] = path else {
            return Err(StorageError::InvalidPath {
                segments: path.iter().map(|s| s.to_string()).collect(),
            });
        };
        let records = self.records.lock();
        let Some(bytes) = records.get(&RecordPath::new(*group, *name)) else {
            return Err(StorageError::NotFound {
                path: self.full_path(path),
            });
        };
        serde_json::from_slice(bytes).map_err(|source| StorageError::Codec {
            path: self.full_path(path),
            source,
        })
    }

    fn set<T: Serialize>(&self, value: &T, path: &[&str]) -> Result<(), StorageError> {
        validate_segments(path, 2)?;
        let [group, name] = path else {
            return Err(StorageError::InvalidPath {
                segments: path.iter().map(|s| s.to_string()).collect(),
            });
        };
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected("write", path));
        }
        let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Codec {
            path: self.full_path(path),
            source,
        })?;
        self.records
            .lock()
            .insert(RecordPath::new(*group, *name), bytes);
        Ok(())
    }

    fn del(&self, path: &[&str]) -> Result<(), StorageError> {
        validate_segments(path, 2)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete", path));
        }
        if path.len() == 1 && self.fail_group_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("group delete", path));
        }
        let mut records = self.records.lock();
        match path {
            [group] => {
                records.retain(|p, _| p.group != *group);
                self.deleted_groups.lock().push(group.to_string());
            }
            [group, name] => {
                records.remove(&RecordPath::new(*group, *name));
            }
            _ => {
                return Err(StorageError::InvalidPath {
                    segments: path.iter().map(|s| s.to_string()).collect(),
                })
            }
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<RecordPath>, StorageError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_del() {
        let m = MemoryStore::new();
        m.set(&"hello", &["g", "a.json"]).unwrap();
        let v: String = m.get(&["g", "a.json"]).unwrap();
        assert_eq!(v, "hello");
        assert!(m.contains("g", "a.json"));

        m.del(&["g", "a.json"]).unwrap();
        assert!(!m.contains("g", "a.json"));
        assert!(matches!(
            m.get::<String>(&["g", "a.json"]),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn group_delete_is_recorded() {
        let m = MemoryStore::new();
        m.set(&1u8, &["g", "a.json"]).unwrap();
        m.set(&2u8, &["h", "b.json"]).unwrap();
        m.del(&["g"]).unwrap();
        assert!(!m.has_group("g"));
        assert!(m.has_group("h"));
        assert_eq!(m.deleted_groups(), vec!["g".to_string()]);
    }

    #[test]
    fn injected_failures() {
        let m = MemoryStore::new();
        m.fail_writes(true);
        assert!(matches!(
            m.set(&1u8, &["g", "a.json"]),
            Err(StorageError::Injected { op: "write", .. })
        ));
        m.fail_writes(false);
        m.set(&1u8, &["g", "a.json"]).unwrap();

        m.fail_deletes(true);
        assert!(m.del(&["g", "a.json"]).is_err());
        assert!(m.contains("g", "a.json"));
        m.fail_deletes(false);

        m.fail_group_deletes(true);
        assert!(m.del(&["g"]).is_err());
        assert!(m.has_group("g"));
        m.del(&["g", "a.json"]).unwrap();
        assert!(!m.contains("g", "a.json"));
    }
}
