use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::ffi::layout::{KernelRecord, RawProcessRecord, RawThreadRecord};
use crate::ffi::types::{ProcessId, ProcfsError, Result, ThreadId};

const PSINFO_FILE: &str = "psinfo";
const LWP_DIR: &str = "lwp";
const LWPSINFO_FILE: &str = "lwpsinfo";
const CMDLINE_FILE: &str = "cmdline";

/// 超出预期长度后最多再探测多少字节，用来报告实际大小
const OVERRUN_LIMIT: u64 = 4096;

/// `<root>/<pid>/psinfo`
pub fn process_info_path(root: &Path, pid: ProcessId) -> PathBuf {
    root.join(pid.to_string()).join(PSINFO_FILE)
}

/// `<root>/<pid>/lwp`
pub fn lwp_dir_path(root: &Path, pid: ProcessId) -> PathBuf {
    root.join(pid.to_string()).join(LWP_DIR)
}

/// `<root>/<pid>/lwp/<tid>/lwpsinfo`
pub fn thread_info_path(root: &Path, pid: ProcessId, tid: ThreadId) -> PathBuf {
    lwp_dir_path(root, pid)
        .join(tid.to_string())
        .join(LWPSINFO_FILE)
}

/// `<root>/<pid>/cmdline`
pub fn cmdline_path(root: &Path, pid: ProcessId) -> PathBuf {
    root.join(pid.to_string()).join(CMDLINE_FILE)
}

/// 读取 `<root>/<pid>/psinfo`
///
/// 文件不存在、无权限或内容不足 `sizeof(psinfo_t)` 时返回
/// [`ProcfsError::NotAvailable`]；文件比内核结构体长时返回
/// [`ProcfsError::AbiMismatch`]。
pub fn load_process_record(root: &Path, pid: ProcessId) -> Result<RawProcessRecord> {
    load_record(&process_info_path(root, pid))
}

/// 读取 `<root>/<pid>/lwp/<tid>/lwpsinfo`，约定同 [`load_process_record`]
pub fn load_thread_record(root: &Path, pid: ProcessId, tid: ThreadId) -> Result<RawThreadRecord> {
    load_record(&thread_info_path(root, pid, tid))
}

fn load_record<R: KernelRecord>(path: &Path) -> Result<R> {
    let result = read_exact_record::<R>(path);
    match &result {
        Err(ProcfsError::NotAvailable { source, .. }) => {
            debug!("{} not available at {}: {}", R::NAME, path.display(), source);
        }
        Err(e @ ProcfsError::AbiMismatch { .. }) => {
            error!("{} at {}: {}", R::NAME, path.display(), e);
        }
        _ => {}
    }
    result
}

fn read_exact_record<R: KernelRecord>(path: &Path) -> Result<R> {
    // 文件句柄在离开作用域时关闭，包括提前返回的路径
    let mut file = File::open(path).map_err(|e| ProcfsError::not_available(path, e))?;

    let mut buf = vec![0u8; R::SIZE];
    file.read_exact(&mut buf)
        .map_err(|e| ProcfsError::not_available(path, e))?;

    // 内核结构体比我们的定义长，说明目标平台的头文件不同
    let mut overrun = Vec::new();
    let extra = (&mut file)
        .take(OVERRUN_LIMIT)
        .read_to_end(&mut overrun)
        .map_err(|e| ProcfsError::not_available(path, e))?;
    if extra > 0 {
        return Err(ProcfsError::AbiMismatch {
            structure: R::NAME,
            expected: R::SIZE,
            actual: R::SIZE + extra,
        });
    }

    R::from_bytes(&buf)
}

/// 判断一个 io 错误是否只是“进程已经消失”
pub(crate) fn is_vanished(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || err.raw_os_error() == Some(libc::ESRCH)
}
