use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ignore::WalkBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::{validate_segments, RecordPath, RecordStore, StorageError, RECORD_SUFFIX};

/// 文件系统记录存储：`<root>/<group>/<name>`，内容为 JSON。
///
/// 单条记录的写入走原子替换：
/// 1) 写同目录下的 `.tmp-<pid>-<seq>`（长度与记录名无关，不会触发 NAME_MAX）
/// 2) fsync(tmpfile)
/// 3) rename(tmp, target)
///
/// 崩溃时最多留下一个 tmp 文件；它不带 `.json` 后缀，bootstrap 会忽略。
#[derive(Debug)]
pub struct FsDir {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FsDir {
    /// 打开（必要时创建）根目录
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(Self {
            root,
            tmp_seq: AtomicU64::new(0),
        })
    }

    fn resolve(&self, path: &[&str]) -> Result<PathBuf, StorageError> {
        validate_segments(path, 2)?;
        let mut p = self.root.clone();
        for seg in path {
            p.push(seg);
        }
        Ok(p)
    }
}

impl RecordStore for FsDir {
    fn root(&self) -> &Path {
        &self.root
    }

    fn get<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T, StorageError> {
        let p = self.resolve(path)?;
        let data = match fs::read(&p) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound { path: p })
            }
            Err(e) => return Err(io_err(&p)(e)),
        };
        serde_json::from_slice(&data).map_err(|source| StorageError::Codec { path: p, source })
    }

    fn set<T: Serialize>(&self, value: &T, path: &[&str]) -> Result<(), StorageError> {
        if path.len() != 2 {
            return Err(StorageError::InvalidPath {
                segments: path.iter().map(|s| s.to_string()).collect(),
            });
        }
        let target = self.resolve(path)?;
        let dir = self.root.join(path[0]);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let data = serde_json::to_vec(value).map_err(|source| StorageError::Codec {
            path: target.clone(),
            source,
        })?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".tmp-{}-{}", std::process::id(), seq));
        {
            let mut f = File::create(&tmp).map_err(io_err(&tmp))?;
            f.write_all(&data).map_err(io_err(&tmp))?;
            f.sync_all().map_err(io_err(&tmp))?;
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&target)(e));
        }
        Ok(())
    }

    fn del(&self, path: &[&str]) -> Result<(), StorageError> {
        let p = self.resolve(path)?;
        let r = if path.len() == 1 {
            fs::remove_dir_all(&p)
        } else {
            fs::remove_file(&p)
        };
        match r {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&p)(e)),
        }
    }

    fn list(&self) -> Result<Vec<RecordPath>, StorageError> {
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .max_depth(Some(2))
            .build();

        let mut out = Vec::new();
        for ent in walker {
            let ent = ent.map_err(|source| StorageError::Walk {
                path: self.root.clone(),
                source,
            })?;
            if ent.depth() != 2 || !ent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let name = ent.file_name();
            let group = ent.path().parent().and_then(|p| p.file_name());
            match (group.and_then(|g| g.to_str()), name.to_str()) {
                (Some(g), Some(n)) => out.push(RecordPath::new(g, n)),
                // 记录文件无法映射为 key：必须让 bootstrap 失败，不能静默少加载一条
                _ if name.as_bytes().ends_with(RECORD_SUFFIX.as_bytes()) => {
                    return Err(StorageError::NonUtf8Path {
                        path: ent.path().to_path_buf(),
                    })
                }
                _ => tracing::debug!("Skipping non UTF-8 non-record file {:?}", ent.path()),
            }
        }
        out.sort();
        Ok(out)
    }
}
