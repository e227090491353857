use serde::de::DeserializeOwned;
use serde::Serialize;

/// 存储中的记录（对核心不透明）。
///
/// 核心只消费两件事：serde 序列化（落盘 / 回放），以及“在时刻 T 是否仍处于结算期”。
pub trait Token: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn is_settling_at(&self, unix_secs: i64) -> bool;
}

/// 三级索引键 (k1, k2, k3)。
///
/// - k1：外层分组，同时是磁盘上的目录名
/// - k2：仅存在于内存的二级分组（不进入磁盘路径）
/// - k3：叶子标识，同时是记录文件名的 stem
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyTriple {
    pub k1: String,
    pub k2: String,
    pub k3: String,
}

impl KeyTriple {
    pub fn new(k1: impl Into<String>, k2: impl Into<String>, k3: impl Into<String>) -> Self {
        Self {
            k1: k1.into(),
            k2: k2.into(),
            k3: k3.into(),
        }
    }

    /// 磁盘上的记录文件名：`<k3>.json`
    pub fn file_name(&self) -> String {
        format!("{}{}", self.k3, crate::storage::RECORD_SUFFIX)
    }
}

/// Key 派生策略：token -> (k1, k2, k3)。
///
/// ## 契约（重要）
/// 必须是 token 内容的纯函数、确定性输出。k2 不落盘，重启时由内容重新派生；
/// 策略若依赖外部可变状态，重启后内存索引与磁盘布局会静默分叉（核心不做校验）。
pub trait KeyStrategy<T>: Send + Sync {
    fn keys(&self, token: &T) -> KeyTriple;
}

impl<T, F> KeyStrategy<T> for F
where
    F: Fn(&T) -> KeyTriple + Send + Sync,
{
    fn keys(&self, token: &T) -> KeyTriple {
        self(token)
    }
}
