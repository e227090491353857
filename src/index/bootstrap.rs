use std::time::Instant;

use rayon::prelude::*;

use crate::core::{KeyStrategy, Token};
use crate::error::StoreError;
use crate::index::store::TokenStore;
use crate::storage::{RecordPath, RecordStore};

/// 冷启动：从 RecordStore 重建内存索引。
///
/// 1) 枚举全部 `<k1>/<name>.json`（其他后缀忽略），按路径排序
/// 2) 并行读取 + 反序列化（rayon；保序 collect）
/// 3) 按排序顺序串行走 `TokenStore::add`，重复检测与落盘路径与运行时完全一致
///
/// 任何一条记录失败（读 / 反序列化 / 位置不符 / 重复 / 回写）都使整个构造失败，没有部分加载。
/// 此时 store 尚未对外暴露，`add` 拿写锁不会有竞争。
pub(super) fn replay<T, S, K>(store: &TokenStore<T, S, K>) -> Result<usize, StoreError>
where
    T: Token,
    S: RecordStore,
    K: KeyStrategy<T>,
{
    let started = Instant::now();
    let records = &store.records;

    let mut paths: Vec<RecordPath> = records
        .list()
        .map_err(|e| StoreError::load(records.root().display(), e))?
        .into_iter()
        .filter(RecordPath::is_record)
        .collect();
    paths.sort();

    let decoded: Vec<Result<T, StoreError>> = paths
        .par_iter()
        .map(|p| {
            records
                .get::<T>(&[p.group.as_str(), p.name.as_str()])
                .map_err(|e| StoreError::load(p, e))
        })
        .collect();

    for (path, token) in paths.iter().zip(decoded) {
        let token = token?;
        let keys = store.keys_of(&token);
        if keys.k1 != path.group || keys.file_name() != path.name {
            // 磁盘位置与内容派生的 key 不一致：key 策略不确定，或目录被手工改动过。
            // 按派生 key 回放会在另一路径重写一份，旧文件在下次启动时变成重复记录。
            let expected = format!("{}/{}", keys.k1, keys.file_name());
            tracing::error!(
                "Record {} derives location {}, key strategy may be non-deterministic",
                path,
                expected
            );
            return Err(StoreError::load(path, StoreError::MisplacedRecord { expected }));
        }
        store.add(token).map_err(|e| StoreError::load(path, e))?;
    }

    tracing::info!(
        "Loaded {} records from {:?} in {:.2?}",
        paths.len(),
        records.root(),
        started.elapsed()
    );
    Ok(paths.len())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::core::{ContractRelayKeys, ShareToken};
    use crate::error::StoreError;
    use crate::index::TokenStore;
    use crate::storage::{MemoryStore, StorageError};

    fn st(contract: &str, relay: &str, sig: &str) -> ShareToken {
        ShareToken {
            contract: contract.into(),
            relay_pubkey: relay.into(),
            public_key: format!("pk-{}", sig),
            signature: sig.into(),
            settlement_open: 100,
            settlement_close: 200,
        }
    }

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("st-store-{}-{}", tag, nanos))
    }

    fn sigs(v: Vec<Arc<ShareToken>>) -> Vec<String> {
        let mut out: Vec<String> = v.iter().map(|t| t.signature.clone()).collect();
        out.sort();
        out
    }

    fn open(dir: &Path) -> Result<TokenStore<ShareToken>, StoreError> {
        TokenStore::open(dir, ContractRelayKeys)
    }

    #[test]
    fn reopen_yields_identical_filters() {
        let dir = unique_tmp_dir("reopen");
        let tokens = [
            st("c1", "r1", "a"),
            st("c1", "r2", "b"),
            st("c2", "r1", "c"),
            st("c2", "r3", "d"),
            st("c3", "r2", "e"),
        ];

        let queries = [
            ("", ""),
            ("c1", ""),
            ("c2", ""),
            ("", "r1"),
            ("", "r2"),
            ("c2", "r3"),
            ("c3", "r1"),
        ];

        let before: Vec<Vec<String>> = {
            let s = open(&dir).unwrap();
            for t in tokens.iter() {
                s.add(t.clone()).unwrap();
            }
            s.delete(&tokens[3]).unwrap();
            queries.iter().map(|(a, b)| sigs(s.filter(a, b))).collect()
        };

        let s = open(&dir).unwrap();
        let after: Vec<Vec<String>> = queries.iter().map(|(a, b)| sigs(s.filter(a, b))).collect();
        assert_eq!(before, after);
        assert_eq!(s.len(), 4);
        assert_eq!(s.settling_at("r1", 150).get("r1"), Some(&2));
    }

    #[test]
    fn group_directory_removed_with_last_record() {
        let dir = unique_tmp_dir("group-dir");
        let s = open(&dir).unwrap();
        let a = st("c1", "r1", "a");
        let b = st("c1", "r2", "b");
        s.add(a.clone()).unwrap();
        s.add(b.clone()).unwrap();
        assert!(dir.join("c1").join("a.json").is_file());

        s.delete(&a).unwrap();
        assert!(dir.join("c1").is_dir());
        s.delete(&b).unwrap();
        assert!(!dir.join("c1").exists());

        drop(s);
        assert!(open(&dir).unwrap().is_empty());
    }

    #[test]
    fn non_record_files_are_ignored() {
        let dir = unique_tmp_dir("stray");
        {
            let s = open(&dir).unwrap();
            s.add(st("c1", "r1", "a")).unwrap();
        }
        std::fs::write(dir.join("c1").join("README.txt"), b"not a record").unwrap();
        std::fs::write(dir.join("c1").join(".a.json.tmp"), b"{half").unwrap();

        let s = open(&dir).unwrap();
        assert_eq!(sigs(s.filter("", "")), vec!["a"]);
    }

    #[test]
    fn corrupt_record_aborts_open() {
        let dir = unique_tmp_dir("corrupt");
        {
            let s = open(&dir).unwrap();
            s.add(st("c1", "r1", "a")).unwrap();
        }
        std::fs::write(dir.join("c1").join("broken.json"), b"{not json").unwrap();

        match open(&dir) {
            Err(StoreError::Load { record, source }) => {
                assert_eq!(record, "c1/broken.json");
                assert!(matches!(
                    *source,
                    StoreError::Persistence(StorageError::Codec { .. })
                ));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("open should fail on a corrupt record"),
        }
    }

    #[test]
    fn duplicate_triple_on_disk_aborts_open() {
        let dir = unique_tmp_dir("dup");
        {
            let s = open(&dir).unwrap();
            s.add(st("c1", "r1", "a")).unwrap();
        }
        // 同一内容出现在两个文件名下：派生出同一三元组
        std::fs::copy(
            dir.join("c1").join("a.json"),
            dir.join("c1").join("zz.json"),
        )
        .unwrap();

        match open(&dir) {
            Err(StoreError::Load { record, source }) => {
                assert_eq!(record, "c1/zz.json");
                assert!(source.is_duplicate());
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("open should fail on a duplicate triple"),
        }
    }

    #[test]
    fn replay_through_memory_store() {
        let m = MemoryStore::new();
        m.insert_raw("c1", "a.json", serde_json::to_vec(&st("c1", "r1", "a")).unwrap());
        m.insert_raw("c2", "b.json", serde_json::to_vec(&st("c2", "r1", "b")).unwrap());
        m.insert_raw("c2", "notes.txt", "ignored");

        let s: TokenStore<ShareToken, _, _> =
            TokenStore::with_records(m, ContractRelayKeys).unwrap();
        assert_eq!(sigs(s.filter("", "r1")), vec!["a", "b"]);
        assert_eq!(s.stats().groups, 2);
    }

    #[test]
    fn replay_fails_when_rewrite_fails() {
        let m = MemoryStore::new();
        m.insert_raw("c1", "a.json", serde_json::to_vec(&st("c1", "r1", "a")).unwrap());
        m.fail_writes(true);

        let err = TokenStore::<ShareToken, _, _>::with_records(m, ContractRelayKeys)
            .err()
            .expect("bootstrap must fail");
        match err {
            StoreError::Load { source, .. } => assert!(source.is_persistence()),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn misplaced_record_aborts_open() {
        let dir = unique_tmp_dir("misplaced");
        std::fs::create_dir_all(dir.join("wrong")).unwrap();
        std::fs::write(
            dir.join("wrong").join("a.json"),
            serde_json::to_vec(&st("c1", "r1", "a")).unwrap(),
        )
        .unwrap();

        for _ in 0..2 {
            match open(&dir) {
                Err(StoreError::Load { record, source }) => {
                    assert_eq!(record, "wrong/a.json");
                    assert!(matches!(
                        *source,
                        StoreError::MisplacedRecord { ref expected } if expected == "c1/a.json"
                    ));
                }
                Err(e) => panic!("unexpected error: {}", e),
                Ok(_) => panic!("open should fail on a misplaced record"),
            }
        }
        // 失败的启动不应在派生路径上留下副本
        assert!(!dir.join("c1").exists());
    }

    #[test]
    fn misnamed_record_aborts_open() {
        let m = MemoryStore::new();
        m.insert_raw("c1", "other.json", serde_json::to_vec(&st("c1", "r1", "a")).unwrap());

        match TokenStore::<ShareToken, _, _>::with_records(m, ContractRelayKeys) {
            Err(StoreError::Load { record, source }) => {
                assert_eq!(record, "c1/other.json");
                assert!(matches!(*source, StoreError::MisplacedRecord { .. }));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("with_records should fail on a misnamed record"),
        }
    }

    #[test]
    fn non_utf8_record_aborts_open() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = unique_tmp_dir("non-utf8");
        {
            let s = open(&dir).unwrap();
            s.add(st("c1", "r1", "a")).unwrap();
        }
        std::fs::write(
            dir.join("c1").join(OsStr::from_bytes(b"\xff.json")),
            serde_json::to_vec(&st("c1", "r1", "b")).unwrap(),
        )
        .unwrap();

        match open(&dir) {
            Err(StoreError::Load { source, .. }) => {
                assert!(matches!(
                    *source,
                    StoreError::Persistence(StorageError::NonUtf8Path { .. })
                ));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("open should fail on a non UTF-8 record name"),
        }
    }
}
