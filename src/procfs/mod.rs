//! 二进制 procfs（`psinfo`/`lwpsinfo`）的只读访问
//!
//! - `loader`: 按内核结构体大小整块读取原始记录
//! - `translate`: 原始记录到快照记录的转换
//! - `scan`: 枚举进程和线程 ID
//! - `cmdline`: 从 argv 恢复被截断的进程名
//!
//! 每次调用都重新读取文件系统，不缓存任何结果。

pub mod cmdline;
pub mod loader;
pub mod scan;
pub mod translate;

use std::env;
use std::path::{Path, PathBuf};

use log::{debug, error, warn};

use crate::ffi::layout::PRFNSZ;
use crate::ffi::types::{ProcessId, ProcfsError, Result, ThreadId};

pub use cmdline::DEFAULT_CMDLINE_BUFFER;
pub use scan::{ProcessIds, ThreadIds};
pub use translate::{ProcessInfo, ProcessStatusInfo, ThreadInfo};

/// procfs 的默认挂载点
pub const DEFAULT_ROOT: &str = "/proc";

/// 覆盖 procfs 根目录的环境变量
pub const ROOT_ENV: &str = "PSINFO_PROC_ROOT";
/// 覆盖 cmdline 初始缓冲区大小的环境变量
pub const CMDLINE_BUFFER_ENV: &str = "PSINFO_CMDLINE_BUFFER";

/// procfs 访问的配置
#[derive(Debug, Clone)]
pub struct ProcFsConfig {
    /// procfs 根目录
    pub root: PathBuf,
    /// 读取 cmdline 时的初始缓冲区大小，不够时倍增
    pub cmdline_buffer_size: usize,
}

impl Default for ProcFsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            cmdline_buffer_size: DEFAULT_CMDLINE_BUFFER,
        }
    }
}

impl ProcFsConfig {
    /// 在默认配置上应用环境变量
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
            config.root = PathBuf::from(root);
        }
        if let Some(size) = env::var(CMDLINE_BUFFER_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            config.cmdline_buffer_size = size;
        }
        config
    }
}

/// 对一个 procfs 根目录的无状态访问入口
///
/// 内部没有可变状态，可以在多个线程中同时使用；每个调用各自打开、读取并关闭
/// 文件。
#[derive(Debug, Clone)]
pub struct ProcFs {
    config: ProcFsConfig,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProcFs {
    pub fn new(config: Option<ProcFsConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
        }
    }

    /// 以指定目录为根，主要用于测试
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(Some(ProcFsConfig {
            root: root.into(),
            ..ProcFsConfig::default()
        }))
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &ProcFsConfig {
        &self.config
    }

    /// 列出根目录下所有数字命名的条目
    pub fn enumerate_process_ids(&self) -> Result<ProcessIds> {
        Ok(ProcessIds::open(self.root())?)
    }

    pub fn process_ids(&self) -> Result<Vec<ProcessId>> {
        Ok(self.enumerate_process_ids()?.collect())
    }

    /// 列出 `<root>/<pid>/lwp` 下的线程；进程已退出时返回 None
    pub fn enumerate_thread_ids(&self, pid: ProcessId) -> Result<Option<ThreadIds>> {
        let dir = loader::lwp_dir_path(self.root(), pid);
        match ThreadIds::open(&dir) {
            Ok(ids) => Ok(Some(ids)),
            Err(e) if loader::is_vanished(&e) => {
                debug!("lwp directory {} not available: {}", dir.display(), e);
                Ok(None)
            }
            Err(e) => {
                warn!("cannot list {}: {}", dir.display(), e);
                Ok(None)
            }
        }
    }

    /// 读取进程快照；进程不存在或不可访问时返回 `Ok(None)`
    pub fn try_get_process_info(&self, pid: ProcessId) -> Result<Option<ProcessInfo>> {
        let raw = absent_if_unavailable(loader::load_process_record(self.root(), pid))?;
        Ok(raw.map(|raw| translate::translate_process(&raw)))
    }

    /// 读取线程快照；线程不存在或不可访问时返回 `Ok(None)`
    pub fn try_get_thread_info(&self, pid: ProcessId, tid: ThreadId) -> Result<Option<ThreadInfo>> {
        let raw = absent_if_unavailable(loader::load_thread_record(self.root(), pid, tid))?;
        Ok(raw.map(|raw| translate::translate_thread(&raw)))
    }

    /// 进程的全部线程快照，跳过枚举后已退出的线程
    pub fn try_get_threads(&self, pid: ProcessId) -> Result<Option<Vec<ThreadInfo>>> {
        let Some(tids) = self.enumerate_thread_ids(pid)? else {
            return Ok(None);
        };
        let mut threads = Vec::new();
        for tid in tids {
            if let Some(info) = self.try_get_thread_info(pid, tid)? {
                threads.push(info);
            }
        }
        Ok(Some(threads))
    }

    /// 读取进程状态及其（可能被截断的）短名称
    pub fn try_read_process_status(
        &self,
        pid: ProcessId,
    ) -> Result<Option<(ProcessStatusInfo, String)>> {
        Ok(self.try_get_process_info(pid)?.map(|info| {
            let short_name = info.name.clone();
            (info, short_name)
        }))
    }

    /// 从 cmdline 恢复完整进程名；无法恢复时原样返回 `short_name`
    pub fn recover_untruncated_name(&self, pid: ProcessId, short_name: &str) -> String {
        cmdline::recover_untruncated_name(
            &loader::cmdline_path(self.root(), pid),
            short_name,
            self.config.cmdline_buffer_size,
        )
    }

    /// 进程名，短名称看起来被截断时尝试恢复
    pub fn process_name(&self, pid: ProcessId) -> Result<Option<String>> {
        Ok(self
            .try_read_process_status(pid)?
            .map(|(_, short_name)| self.full_name(pid, short_name)))
    }

    /// 系统中所有仍可读取的进程；`name` 字段为恢复后的完整名称
    pub fn get_process_infos(&self) -> Result<Vec<ProcessInfo>> {
        let mut processes = Vec::new();
        for pid in self.enumerate_process_ids()? {
            if let Some(mut info) = self.try_get_process_info(pid)? {
                info.name = self.full_name(pid, std::mem::take(&mut info.name));
                processes.push(info);
            }
        }
        Ok(processes)
    }

    /// 对已经读到的短名称做按需恢复，不会再次读取 psinfo；
    /// 名称没有被截断时原样返回
    pub fn full_name(&self, pid: ProcessId, short_name: String) -> String {
        if looks_truncated(&short_name) {
            self.recover_untruncated_name(pid, &short_name)
        } else {
            short_name
        }
    }
}

/// `pr_fname` 被填满（留一个字节给 NUL）时名称可能被截断
pub fn looks_truncated(short_name: &str) -> bool {
    short_name.len() >= PRFNSZ - 1
}

/// `NotAvailable` 变为 `Ok(None)`；ABI 不匹配必须继续向上传播
fn absent_if_unavailable<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ProcfsError::NotAvailable { .. }) => Ok(None),
        Err(e) => {
            if e.is_abi_mismatch() {
                error!("procfs structure definitions do not match this kernel: {}", e);
            }
            Err(e)
        }
    }
}

/// 使用默认配置（含环境变量覆盖）的快捷函数
pub fn enumerate_process_ids() -> Result<ProcessIds> {
    ProcFs::new(Some(ProcFsConfig::from_env())).enumerate_process_ids()
}

pub fn try_get_process_info(pid: ProcessId) -> Result<Option<ProcessInfo>> {
    ProcFs::new(Some(ProcFsConfig::from_env())).try_get_process_info(pid)
}

pub fn try_get_thread_info(pid: ProcessId, tid: ThreadId) -> Result<Option<ThreadInfo>> {
    ProcFs::new(Some(ProcFsConfig::from_env())).try_get_thread_info(pid, tid)
}

pub fn try_read_process_status(pid: ProcessId) -> Result<Option<(ProcessStatusInfo, String)>> {
    ProcFs::new(Some(ProcFsConfig::from_env())).try_read_process_status(pid)
}

pub fn recover_untruncated_name(pid: ProcessId, short_name: &str) -> String {
    ProcFs::new(Some(ProcFsConfig::from_env())).recover_untruncated_name(pid, short_name)
}
