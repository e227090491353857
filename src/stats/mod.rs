use std::fmt;
use std::path::PathBuf;

/// store 概况（一次读锁内取得的一致快照）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// 持久化根目录
    pub root: PathBuf,
    /// k1 分组数（= 磁盘上的分组目录数）
    pub groups: usize,
    /// (k1, k2) 组合数
    pub secondary_groups: usize,
    pub records: usize,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           st-store Report                        ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ root: {}", self.root.display())?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║   groups (k1):      {:>10}                   ║",
            self.groups
        )?;
        writeln!(
            f,
            "║   groups (k1, k2):  {:>10}                   ║",
            self.secondary_groups
        )?;
        writeln!(
            f,
            "║   records:          {:>10}                   ║",
            self.records
        )?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
