pub mod fsdir;
pub mod memory;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use fsdir::FsDir;
pub use memory::MemoryStore;

/// 记录文件的固定序列化后缀
pub const RECORD_SUFFIX: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("codec error at {path:?}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to walk {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    /// 记录路径不是 UTF-8，无法映射为 key
    #[error("non UTF-8 record path {path:?}")]
    NonUtf8Path { path: PathBuf },

    #[error("record not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("invalid record path {segments:?}")]
    InvalidPath { segments: Vec<String> },

    /// MemoryStore 的故障注入
    #[error("injected {op} failure at {segments:?}")]
    Injected {
        op: &'static str,
        segments: Vec<String>,
    },
}

/// 持久化目录中一条记录的位置：`<group>/<name>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPath {
    pub group: String,
    pub name: String,
}

impl RecordPath {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn is_record(&self) -> bool {
        self.name.ends_with(RECORD_SUFFIX)
    }
}

impl std::fmt::Display for RecordPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// 按路径段寻址的记录存储。
///
/// ## 契约
/// - 一段路径 `[group]` 指向整个分组（目录），两段 `[group, name]` 指向单条记录
/// - `set` 只接受两段路径；`del` 两种都接受，目标不存在时视为成功
/// - `list` 返回深度恰为两级的全部条目（不做后缀过滤），按路径排序
pub trait RecordStore: Send + Sync {
    fn root(&self) -> &Path;

    fn get<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T, StorageError>;

    fn set<T: Serialize>(&self, value: &T, path: &[&str]) -> Result<(), StorageError>;

    fn del(&self, path: &[&str]) -> Result<(), StorageError>;

    fn list(&self) -> Result<Vec<RecordPath>, StorageError>;
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// 路径段校验：非空、不含分隔符、不是 `.` / `..`
pub(crate) fn validate_segments(path: &[&str], max_len: usize) -> Result<(), StorageError> {
    let ok = !path.is_empty()
        && path.len() <= max_len
        && path
            .iter()
            .all(|s| !s.is_empty() && *s != "." && *s != ".." && !s.contains(is_separator));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidPath {
            segments: path.iter().map(|s| s.to_string()).collect(),
        })
    }
}
