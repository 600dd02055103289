//! 内核结构体布局与基础类型

pub mod layout;
pub mod types;

pub use layout::{
    KernelRecord, RawProcessRecord, RawThreadRecord, RawTimespec, PRARGSZ, PRFNSZ,
    PR_LWPSINFO_SIZE, PR_PSINFO_SIZE,
};
pub use types::{ProcessId, ProcfsError, Result, ThreadId, TimeSpec};
