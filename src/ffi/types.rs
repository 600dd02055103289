use std::fmt;
use std::io;
use std::os::raw::c_int;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// 进程ID的安全包装
///
/// procfs 中的 pid 目录名总是非负的，负值在构造时就被拒绝。
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct ProcessId(pub(crate) c_int);

impl ProcessId {
    /// 创建新的ProcessId，确保值有效
    pub fn new(pid: i32) -> Option<Self> {
        if pid >= 0 {
            Some(ProcessId(pid))
        } else {
            None
        }
    }

    pub fn as_raw(&self) -> c_int {
        self.0
    }
}

impl TryFrom<i32> for ProcessId {
    type Error = ProcfsError;

    fn try_from(pid: i32) -> Result<Self> {
        ProcessId::new(pid).ok_or(ProcfsError::InvalidPid(pid))
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 路径中按无符号数格式化
        write!(f, "{}", self.0 as u32)
    }
}

/// 线程（lwp）ID的安全包装
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct ThreadId(pub(crate) u32);

impl ThreadId {
    pub fn new(tid: i32) -> Option<Self> {
        u32::try_from(tid).ok().map(ThreadId)
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i32> for ThreadId {
    type Error = ProcfsError;

    fn try_from(tid: i32) -> Result<Self> {
        ThreadId::new(tid).ok_or(ProcfsError::InvalidTid(tid))
    }
}

/// 内核中的 lwp id 本身就是无符号的，任何 `u32` 都有效
impl From<u32> for ThreadId {
    fn from(tid: u32) -> Self {
        ThreadId(tid)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 相对 Unix 纪元（UTC）的秒 + 纳秒时间
///
/// 转换为更粗的单位时，纳秒部分一律截断而不是四舍五入。
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize)]
pub struct TimeSpec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl TimeSpec {
    pub const fn new(tv_sec: i64, tv_nsec: i64) -> Self {
        Self { tv_sec, tv_nsec }
    }

    /// 作为时长解释（用于累计CPU时间），负值截为零
    pub fn as_duration(&self) -> Duration {
        let secs = u64::try_from(self.tv_sec).unwrap_or(0);
        let nanos = u32::try_from(self.tv_nsec.clamp(0, 999_999_999)).unwrap_or(0);
        Duration::new(secs, nanos)
    }

    /// 作为时间点解释（用于启动时间）
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let nanos = u32::try_from(self.tv_nsec.clamp(0, 999_999_999)).ok()?;
        if self.tv_sec >= 0 {
            UNIX_EPOCH.checked_add(Duration::new(self.tv_sec as u64, nanos))
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(self.tv_sec.unsigned_abs()))?
                .checked_add(Duration::from_nanos(u64::from(nanos)))
        }
    }

    pub fn as_millis(&self) -> i128 {
        i128::from(self.tv_sec) * 1_000 + i128::from(self.tv_nsec / 1_000_000)
    }

    /// 以 100ns 为单位的刻度数
    pub fn as_ticks_100ns(&self) -> i128 {
        i128::from(self.tv_sec) * 10_000_000 + i128::from(self.tv_nsec / 100)
    }
}

/// 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ProcfsError {
    #[error("Invalid process ID: {0}")]
    InvalidPid(i32),
    #[error("Invalid thread ID: {0}")]
    InvalidTid(i32),
    #[error("{} is not available: {source}", path.display())]
    NotAvailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{structure} is {actual} bytes on this host, expected {expected}")]
    AbiMismatch {
        structure: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("System call failed: {0}")]
    SyscallError(#[from] io::Error),
}

impl ProcfsError {
    pub(crate) fn not_available(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ProcfsError::NotAvailable {
            path: path.into(),
            source,
        }
    }

    /// 目标进程/线程已不存在或不可访问
    pub fn is_not_available(&self) -> bool {
        matches!(self, ProcfsError::NotAvailable { .. })
    }

    pub fn is_abi_mismatch(&self) -> bool {
        matches!(self, ProcfsError::AbiMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProcfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_ids_rejected() {
        assert!(ProcessId::new(-1).is_none());
        assert!(ThreadId::new(-7).is_none());
        assert!(matches!(
            ProcessId::try_from(-3),
            Err(ProcfsError::InvalidPid(-3))
        ));
        assert!(matches!(
            ThreadId::try_from(-3i32),
            Err(ProcfsError::InvalidTid(-3))
        ));
    }

    #[test]
    fn test_thread_id_covers_full_u32() {
        let tid = ThreadId::from(3_000_000_000u32);
        assert_eq!(tid.as_raw(), 3_000_000_000);
        assert_eq!(tid.to_string(), "3000000000");
        assert_eq!(ThreadId::from(u32::MAX).to_string(), "4294967295");
    }

    #[test]
    fn test_pid_zero_is_valid() {
        // Solaris 上 pid 0 是 sched
        let pid = ProcessId::new(0).unwrap();
        assert_eq!(pid.as_raw(), 0);
        assert_eq!(pid.to_string(), "0");
    }

    #[test]
    fn test_timespec_truncates_nanos() {
        let ts = TimeSpec::new(5, 999_999_999);
        assert_eq!(ts.as_millis(), 5_999);
        assert_eq!(ts.as_ticks_100ns(), 59_999_999);
        assert_eq!(ts.as_duration(), Duration::new(5, 999_999_999));
    }

    #[test]
    fn test_timespec_epoch_offset() {
        let ts = TimeSpec::new(1_700_000_000, 250);
        let expected = UNIX_EPOCH + Duration::new(1_700_000_000, 250);
        assert_eq!(ts.to_system_time(), Some(expected));

        let before = TimeSpec::new(-10, 0);
        assert_eq!(
            before.to_system_time(),
            UNIX_EPOCH.checked_sub(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_error_classification() {
        let err = ProcfsError::not_available(
            "/proc/1/psinfo",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.is_not_available());
        assert!(!err.is_abi_mismatch());

        let err = ProcfsError::AbiMismatch {
            structure: "psinfo",
            expected: 416,
            actual: 432,
        };
        assert!(err.is_abi_mismatch());
        assert_eq!(
            err.to_string(),
            "psinfo is 432 bytes on this host, expected 416"
        );
    }
}
