use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{KeyStrategy, KeyTriple, Token};
use crate::error::StoreError;
use crate::index::bootstrap;
use crate::index::tree::{Pruned, TokenTree};
use crate::stats::StoreStats;
use crate::storage::{FsDir, RecordStore};

/// 并发 token 存储：三级内存索引 + 每条记录一个文件的同步落盘镜像。
///
/// ## 锁纪律
/// - 整个 `TokenTree` 只有一把读写锁：`add` / `delete` 独占，查询共享
/// - 变更的磁盘 I/O 在独占临界区内完成；慢盘会阻塞整个 store 的读写
///
/// ## 变更是两阶段、非原子的
/// 先改内存，再落盘。落盘失败时错误原样返回，但内存变更**不回滚**：
/// token 对读者立即可见，只是尚未持久化。调用方决定重试、告警或接受分叉。
pub struct TokenStore<T, S = FsDir, K = crate::core::ContractRelayKeys> {
    pub(super) records: S,
    keys: K,
    tree: RwLock<TokenTree<T>>,
}

impl<T, K> TokenStore<T, FsDir, K>
where
    T: Token,
    K: KeyStrategy<T>,
{
    /// 在 `root` 目录下打开 store，并从磁盘重建索引
    pub fn open(root: impl Into<PathBuf>, keys: K) -> Result<Self, StoreError> {
        let root = root.into();
        let records = FsDir::open(&root).map_err(|e| StoreError::load(root.display(), e))?;
        Self::with_records(records, keys)
    }
}

impl<T, S, K> TokenStore<T, S, K>
where
    T: Token,
    S: RecordStore,
    K: KeyStrategy<T>,
{
    /// 用任意 RecordStore 构造；构造即 bootstrap，任何记录加载失败都会使构造失败
    pub fn with_records(records: S, keys: K) -> Result<Self, StoreError> {
        let store = Self {
            records,
            keys,
            tree: RwLock::new(TokenTree::default()),
        };
        bootstrap::replay(&store)?;
        Ok(store)
    }

    pub fn keys_of(&self, token: &T) -> KeyTriple {
        self.keys.keys(token)
    }

    pub fn records(&self) -> &S {
        &self.records
    }

    /// 插入 token 并写入 `<k1>/<k3>.json`。
    ///
    /// 三元组已被占用时返回 `DuplicateRecord`，不做任何修改。
    pub fn add(&self, token: impl Into<Arc<T>>) -> Result<(), StoreError> {
        let token = token.into();
        let keys = self.keys.keys(&token);

        let mut tree = self.tree.write();
        if !tree.insert(&keys, token.clone()) {
            tracing::debug!("Duplicate record {}/{}/{}", keys.k1, keys.k2, keys.k3);
            return Err(StoreError::DuplicateRecord);
        }

        let name = keys.file_name();
        if let Err(e) = self.records.set(&*token, &[keys.k1.as_str(), name.as_str()]) {
            tracing::warn!(
                "Persisting {}/{} failed, record stays in memory: {}",
                keys.k1,
                name,
                e
            );
            return Err(e.into());
        }
        tracing::debug!("Added record {}/{}/{}", keys.k1, keys.k2, keys.k3);
        Ok(())
    }

    /// 删除 token。幂等：三元组任一层不存在都直接返回 Ok。
    ///
    /// 记录文件删除失败时立即返回，不清理父层（内存已摘掉叶子）。
    /// k1 整组清空后，磁盘上的分组目录一并删除。
    pub fn delete(&self, token: &T) -> Result<(), StoreError> {
        let keys = self.keys.keys(token);

        let mut tree = self.tree.write();
        if tree.remove_leaf(&keys).is_none() {
            return Ok(());
        }

        let name = keys.file_name();
        if let Err(e) = self.records.del(&[keys.k1.as_str(), name.as_str()]) {
            tracing::warn!(
                "Deleting {}/{} failed, record already gone from memory: {}",
                keys.k1,
                name,
                e
            );
            return Err(e.into());
        }

        if tree.prune(&keys.k1, &keys.k2) == Pruned::Group {
            tracing::debug!("Group {} is empty, removing it from disk", keys.k1);
            self.records.del(&[keys.k1.as_str()])?;
        }
        tracing::debug!("Deleted record {}/{}/{}", keys.k1, keys.k2, keys.k3);
        Ok(())
    }

    /// 按 (k1, k2) 过滤；空字符串表示该层通配。结果无序。
    pub fn filter(&self, k1: &str, k2: &str) -> Vec<Arc<T>> {
        self.tree.read().filter(k1, k2)
    }

    /// 统计 k2 = `k2` 的 token 中在 `unix_secs` 时刻仍处于结算期的数量。
    ///
    /// 返回的映射至多一个键（`k2` 本身）；计数为 0 时返回空映射，不含 0 值条目。
    pub fn settling_at(&self, k2: &str, unix_secs: i64) -> HashMap<String, usize> {
        let n = self
            .filter("", k2)
            .iter()
            .filter(|t| t.is_settling_at(unix_secs))
            .count();

        let mut out = HashMap::new();
        if n > 0 {
            out.insert(k2.to_string(), n);
        }
        out
    }

    pub fn contains(&self, token: &T) -> bool {
        let keys = self.keys.keys(token);
        self.tree.read().contains(&keys)
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let tree = self.tree.read();
        StoreStats {
            root: self.records.root().to_path_buf(),
            groups: tree.group_count(),
            secondary_groups: tree.secondary_count(),
            records: tree.len(),
        }
    }
}
