use crate::storage::StorageError;

/// TokenStore 的错误分类。
///
/// - `DuplicateRecord`：可恢复，是否上报由调用方决定
/// - `Persistence`：RecordStore 原样透传；此时内存已变更且不回滚
/// - `MisplacedRecord`：仅出现在 `Load` 内部，记录所在位置与其内容派生的 key 不一致
/// - `Load`：bootstrap 阶段任何失败都是致命的，store 不可用
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate record")]
    DuplicateRecord,

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("record belongs at {expected}")]
    MisplacedRecord { expected: String },

    #[error("failed to load record {record}: {source}")]
    Load {
        record: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub(crate) fn load(record: impl ToString, source: impl Into<StoreError>) -> Self {
        StoreError::Load {
            record: record.to_string(),
            source: Box::new(source.into()),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateRecord)
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, StoreError::Persistence(_))
    }
}
