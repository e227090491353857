use std::collections::HashMap;
use std::sync::Arc;

use crate::core::KeyTriple;

type Leaves<T> = HashMap<String, Arc<T>>;
type Secondary<T> = HashMap<String, Leaves<T>>;

/// `prune` 的结果：删掉了哪一层
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Pruned {
    Nothing,
    /// k1 下的某个 k2 已空并被移除
    Secondary,
    /// 整个 k1 已空并被移除（磁盘上对应整组目录也应删除）
    Group,
}

/// 三级映射 k1 -> k2 -> k3 -> token（无锁；由 TokenStore 外部加锁）。
///
/// 不变式：
/// - 每个 (k1, k2, k3) 至多一个 token，占用时插入被拒绝而不是覆盖
/// - `prune` 之后不残留空的内层映射
#[derive(Debug)]
pub struct TokenTree<T> {
    groups: HashMap<String, Secondary<T>>,
    len: usize,
}

impl<T> Default for TokenTree<T> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            len: 0,
        }
    }
}

impl<T> TokenTree<T> {
    /// 返回 false 表示该三元组已被占用（未做任何修改）
    pub fn insert(&mut self, keys: &KeyTriple, token: Arc<T>) -> bool {
        let leaves = self
            .groups
            .entry(keys.k1.clone())
            .or_default()
            .entry(keys.k2.clone())
            .or_default();
        if leaves.contains_key(&keys.k3) {
            return false;
        }
        leaves.insert(keys.k3.clone(), token);
        self.len += 1;
        true
    }

    pub fn contains(&self, keys: &KeyTriple) -> bool {
        self.groups
            .get(&keys.k1)
            .and_then(|s| s.get(&keys.k2))
            .is_some_and(|l| l.contains_key(&keys.k3))
    }

    /// 只摘叶子，不清理父层；父层清理交给 `prune`，
    /// 以便调用方在两步之间插入落盘操作。
    pub fn remove_leaf(&mut self, keys: &KeyTriple) -> Option<Arc<T>> {
        let removed = self
            .groups
            .get_mut(&keys.k1)?
            .get_mut(&keys.k2)?
            .remove(&keys.k3)?;
        self.len -= 1;
        Some(removed)
    }

    pub fn prune(&mut self, k1: &str, k2: &str) -> Pruned {
        let Some(secondary) = self.groups.get_mut(k1) else {
            return Pruned::Nothing;
        };
        let mut pruned = Pruned::Nothing;
        if secondary.get(k2).is_some_and(|l| l.is_empty()) {
            secondary.remove(k2);
            pruned = Pruned::Secondary;
        }
        if secondary.is_empty() {
            self.groups.remove(k1);
            pruned = Pruned::Group;
        }
        pruned
    }

    /// 空字符串表示“该层全部匹配”。结果无序。
    pub fn filter(&self, k1: &str, k2: &str) -> Vec<Arc<T>> {
        match (k1.is_empty(), k2.is_empty()) {
            // 所有 k1，所有 k2
            (true, true) => self
                .groups
                .values()
                .flat_map(|s| s.values())
                .flat_map(|l| l.values())
                .cloned()
                .collect(),
            // 所有 k1，指定 k2
            (true, false) => self
                .groups
                .values()
                .filter_map(|s| s.get(k2))
                .flat_map(|l| l.values())
                .cloned()
                .collect(),
            // 指定 k1，所有 k2
            (false, true) => self
                .groups
                .get(k1)
                .into_iter()
                .flat_map(|s| s.values())
                .flat_map(|l| l.values())
                .cloned()
                .collect(),
            (false, false) => self
                .groups
                .get(k1)
                .and_then(|s| s.get(k2))
                .into_iter()
                .flat_map(|l| l.values())
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn secondary_count(&self) -> usize {
        self.groups.values().map(|s| s.len()).sum()
    }
}
