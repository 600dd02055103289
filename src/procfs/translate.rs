//! 把原始内核记录转换成对外的快照记录，不做任何 I/O

use log::warn;
use serde::Serialize;

use crate::ffi::layout::{RawProcessRecord, RawThreadRecord, RawTimespec};
use crate::ffi::types::{ProcessId, ThreadId, TimeSpec};

/// 内核以 KB 报告内存大小
const KILOBYTE: u64 = 1024;

/// 单个线程（lwp）的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub tid: ThreadId,
    pub priority: i32,
    pub nice: i32,
    /// 单字符状态码，例如 `S`、`R`、`O`
    pub status: char,
    pub start_time: TimeSpec,
    /// 用户态+内核态 CPU 时间
    pub cpu_total_time: TimeSpec,
}

/// 进程快照
///
/// 同一个 psinfo 记录的全部投影都用这一个类型表示；只关心状态信息的调用方
/// 忽略不需要的字段即可。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub parent_pid: i32,
    pub process_group_id: i32,
    pub session_id: i32,
    pub uid: u32,
    pub euid: u32,
    pub gid: u32,
    pub egid: u32,
    /// 活动 lwp 数
    pub thread_count: i32,
    /// 代表线程的优先级
    pub priority: i32,
    /// 代表线程的 nice 值
    pub nice: i32,
    /// 字节
    pub virtual_size: u64,
    /// 字节
    pub resident_set_size: u64,
    pub start_time: TimeSpec,
    pub cpu_total_time: TimeSpec,
    /// 已回收子进程的 CPU 时间
    pub children_cpu_time: TimeSpec,
    /// 可执行文件名；`pr_fname` 最多 15 个字节，可能被截断
    pub name: String,
    /// 参数列表的开头部分
    pub args: Option<String>,
    pub argc: i32,
    /// 僵尸进程的 wait() 状态
    pub wait_status: i32,
    pub task_id: i32,
    pub project_id: i32,
    pub zone_id: i32,
    pub contract_id: i32,
    /// 代表线程（通常是 lwp 1）的信息
    pub lwp1: Option<ThreadInfo>,
}

/// 兼容只读取状态信息的调用方
pub type ProcessStatusInfo = ProcessInfo;

pub fn translate_process(raw: &RawProcessRecord) -> ProcessInfo {
    ProcessInfo {
        pid: record_pid(raw.pr_pid),
        parent_pid: raw.pr_ppid,
        process_group_id: raw.pr_pgid,
        session_id: raw.pr_sid,
        uid: raw.pr_uid,
        euid: raw.pr_euid,
        gid: raw.pr_gid,
        egid: raw.pr_egid,
        thread_count: raw.pr_nlwp,
        priority: raw.pr_lwp.pr_pri,
        nice: i32::from(raw.pr_lwp.pr_nice),
        virtual_size: kb_to_bytes(raw.pr_size),
        resident_set_size: kb_to_bytes(raw.pr_rssize),
        start_time: timespec(&raw.pr_start),
        cpu_total_time: timespec(&raw.pr_time),
        children_cpu_time: timespec(&raw.pr_ctime),
        name: c_string_lossy(&raw.pr_fname),
        args: Some(c_string_lossy(&raw.pr_psargs)),
        argc: raw.pr_argc,
        wait_status: raw.pr_wstat,
        task_id: raw.pr_taskid,
        project_id: raw.pr_projid,
        zone_id: raw.pr_zoneid,
        contract_id: raw.pr_contract,
        lwp1: representative_thread(raw),
    }
}

pub fn translate_thread(raw: &RawThreadRecord) -> ThreadInfo {
    ThreadInfo {
        tid: ThreadId(raw.pr_lwpid),
        priority: raw.pr_pri,
        nice: i32::from(raw.pr_nice),
        status: char::from(raw.pr_sname),
        start_time: timespec(&raw.pr_start),
        cpu_total_time: timespec(&raw.pr_time),
    }
}

/// 已回收的僵尸进程没有 lwp，内核把 `pr_lwp` 清零
fn representative_thread(raw: &RawProcessRecord) -> Option<ThreadInfo> {
    if raw.pr_nlwp == 0 && raw.pr_lwp.pr_lwpid == 0 {
        None
    } else {
        Some(translate_thread(&raw.pr_lwp))
    }
}

/// 负 pid 不会出现在正常的 psinfo 中；出现时记录警告并按 0 处理
fn record_pid(raw_pid: i32) -> ProcessId {
    ProcessId::new(raw_pid).unwrap_or_else(|| {
        warn!("psinfo carries negative pid {}, reporting it as 0", raw_pid);
        ProcessId(0)
    })
}

/// KB 转为字节。溢出时记录警告并饱和到 `u64::MAX`。
pub fn kb_to_bytes(kb: u64) -> u64 {
    kb.checked_mul(KILOBYTE).unwrap_or_else(|| {
        warn!("memory size of {} KB overflows u64 bytes, saturating", kb);
        u64::MAX
    })
}

fn timespec(raw: &RawTimespec) -> TimeSpec {
    TimeSpec::new(raw.tv_sec, raw.tv_nsec)
}

/// 取定长缓冲区中第一个 NUL 之前的内容；没有 NUL 时取整个缓冲区。
/// 非法 UTF-8 序列被替换而不是报错。
pub fn c_string_lossy(buf: &[u8]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::layout::{KernelRecord, PRARGSZ, PR_LWPSINFO_SIZE, PR_PSINFO_SIZE};
    use proptest::prelude::*;

    fn blank_record() -> RawProcessRecord {
        RawProcessRecord::from_bytes(&[0u8; PR_PSINFO_SIZE]).unwrap()
    }

    #[test]
    fn test_kb_to_bytes() {
        assert_eq!(kb_to_bytes(2048), 2_097_152);
        assert_eq!(kb_to_bytes(0), 0);
        assert_eq!(kb_to_bytes(u64::MAX / KILOBYTE), (u64::MAX / KILOBYTE) * KILOBYTE);
    }

    #[test_log::test]
    fn test_kb_to_bytes_overflow_saturates() {
        assert_eq!(kb_to_bytes(u64::MAX / KILOBYTE + 1), u64::MAX);
        assert_eq!(kb_to_bytes(u64::MAX), u64::MAX);

        let mut raw = blank_record();
        raw.pr_size = u64::MAX;
        raw.pr_rssize = 1;
        let info = translate_process(&raw);
        assert_eq!(info.virtual_size, u64::MAX);
        assert_eq!(info.resident_set_size, 1024);
    }

    #[test_log::test]
    fn test_negative_pid_reported_as_zero() {
        let mut raw = blank_record();
        raw.pr_pid = -3;
        raw.pr_ppid = -1;
        let info = translate_process(&raw);
        assert_eq!(info.pid.as_raw(), 0);
        // ppid 保留原始值
        assert_eq!(info.parent_pid, -1);
    }

    #[test]
    fn test_c_string_lossy() {
        let mut buf = [0u8; PRARGSZ];
        buf[..6].copy_from_slice(b"ls -la");
        assert_eq!(c_string_lossy(&buf), "ls -la");

        // 没有结尾 NUL：整个缓冲区都是内容
        let full = [b'x'; PRARGSZ];
        assert_eq!(c_string_lossy(&full), "x".repeat(PRARGSZ));

        assert_eq!(c_string_lossy(&[0u8; 4]), "");
        assert_eq!(c_string_lossy(&[b'a', 0xff, b'b', 0]), "a\u{fffd}b");
    }

    #[test]
    fn test_translate_process() {
        let mut raw = blank_record();
        raw.pr_pid = 101;
        raw.pr_ppid = 1;
        raw.pr_pgid = 101;
        raw.pr_sid = 100;
        raw.pr_uid = 1000;
        raw.pr_euid = 0;
        raw.pr_nlwp = 3;
        raw.pr_size = 2048;
        raw.pr_rssize = 100;
        raw.pr_start = RawTimespec {
            tv_sec: 1_600_000_000,
            tv_nsec: 5,
        };
        raw.pr_time = RawTimespec {
            tv_sec: 12,
            tv_nsec: 340_000_000,
        };
        raw.pr_fname[..4].copy_from_slice(b"bash");
        raw.pr_psargs[..7].copy_from_slice(b"bash -l");
        raw.pr_argc = 2;
        raw.pr_lwp.pr_lwpid = 1;
        raw.pr_lwp.pr_pri = 59;
        raw.pr_lwp.pr_nice = 20;
        raw.pr_lwp.pr_sname = b'S';

        let info = translate_process(&raw);
        assert_eq!(info.pid.as_raw(), 101);
        assert_eq!(info.parent_pid, 1);
        assert_eq!(info.session_id, 100);
        assert_eq!(info.uid, 1000);
        assert_eq!(info.thread_count, 3);
        assert_eq!(info.virtual_size, 2_097_152);
        assert_eq!(info.resident_set_size, 102_400);
        assert_eq!(info.start_time, TimeSpec::new(1_600_000_000, 5));
        assert_eq!(info.cpu_total_time, TimeSpec::new(12, 340_000_000));
        assert_eq!(info.name, "bash");
        assert_eq!(info.args.as_deref(), Some("bash -l"));
        assert_eq!(info.priority, 59);
        assert_eq!(info.nice, 20);

        let lwp = info.lwp1.expect("representative lwp");
        assert_eq!(lwp.tid.as_raw(), 1);
        assert_eq!(lwp.status, 'S');
    }

    #[test]
    fn test_translate_is_deterministic() {
        let mut raw = blank_record();
        raw.pr_pid = 7;
        raw.pr_nlwp = 1;
        raw.pr_psargs[..3].copy_from_slice(b"foo");
        let bytes = raw.to_bytes();

        let a = translate_process(&RawProcessRecord::from_bytes(&bytes).unwrap());
        let b = translate_process(&RawProcessRecord::from_bytes(&bytes).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_args_is_present() {
        let info = translate_process(&blank_record());
        assert_eq!(info.args.as_deref(), Some(""));
        // 没有 lwp 的僵尸进程
        assert!(info.lwp1.is_none());
    }

    #[test]
    fn test_translate_thread() {
        let mut raw = blank_record().pr_lwp;
        raw.pr_lwpid = 4;
        raw.pr_pri = 60;
        raw.pr_nice = 0;
        raw.pr_sname = b'R';
        raw.pr_start = RawTimespec {
            tv_sec: 10,
            tv_nsec: 20,
        };

        let info = translate_thread(&raw);
        assert_eq!(info.tid.as_raw(), 4);
        assert_eq!(info.priority, 60);
        assert_eq!(info.status, 'R');
        assert_eq!(info.start_time, TimeSpec::new(10, 20));
    }

    proptest! {
        #[test]
        fn prop_translate_process_is_deterministic(
            bytes in prop::collection::vec(any::<u8>(), PR_PSINFO_SIZE)
        ) {
            let a = translate_process(&RawProcessRecord::from_bytes(&bytes).unwrap());
            let b = translate_process(&RawProcessRecord::from_bytes(&bytes).unwrap());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_translate_thread_is_deterministic(
            bytes in prop::collection::vec(any::<u8>(), PR_LWPSINFO_SIZE)
        ) {
            let a = translate_thread(&RawThreadRecord::from_bytes(&bytes).unwrap());
            let b = translate_thread(&RawThreadRecord::from_bytes(&bytes).unwrap());
            prop_assert_eq!(a.tid.as_raw(), u32::from_ne_bytes(bytes[4..8].try_into().unwrap()));
            prop_assert_eq!(a, b);
        }
    }
}
