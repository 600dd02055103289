use std::fs::{self, ReadDir};
use std::path::Path;
use std::str::FromStr;

use crate::ffi::types::{ProcessId, ThreadId};

/// 解析完全由十进制数字组成的目录名；`+1`、`-1`、`01a` 等都不算，
/// 超出 `T` 范围的也不算
fn parse_numeric_name<T: FromStr>(name: &str) -> Option<T> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// procfs 根目录下的进程 ID 序列
///
/// 惰性地遍历一次目录；枚举过程中退出的进程不影响迭代，之后的查询会报告
/// 不可用。
pub struct ProcessIds {
    entries: ReadDir,
}

impl ProcessIds {
    pub(crate) fn open(root: &Path) -> std::io::Result<Self> {
        Ok(Self {
            entries: fs::read_dir(root)?,
        })
    }
}

impl Iterator for ProcessIds {
    type Item = ProcessId;

    fn next(&mut self) -> Option<ProcessId> {
        for entry in self.entries.by_ref().flatten() {
            let name = entry.file_name();
            if let Some(pid) = name
                .to_str()
                .and_then(parse_numeric_name::<i32>)
                .and_then(ProcessId::new)
            {
                return Some(pid);
            }
        }
        None
    }
}

/// `<root>/<pid>/lwp` 下的线程 ID 序列
pub struct ThreadIds {
    entries: ReadDir,
}

impl ThreadIds {
    pub(crate) fn open(lwp_dir: &Path) -> std::io::Result<Self> {
        Ok(Self {
            entries: fs::read_dir(lwp_dir)?,
        })
    }
}

impl Iterator for ThreadIds {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        for entry in self.entries.by_ref().flatten() {
            let name = entry.file_name();
            // lwpid_t 是无符号的，按 u32 解析
            if let Some(tid) = name
                .to_str()
                .and_then(parse_numeric_name::<u32>)
                .map(ThreadId::from)
            {
                return Some(tid);
            }
        }
        None
    }
}
