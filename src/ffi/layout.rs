//! `<sys/procfs.h>` 中 `struct lwpsinfo` 与 `struct psinfo` 的逐字节布局。
//!
//! 内核把这两个结构体原样写进 `/proc/<pid>/psinfo` 和
//! `/proc/<pid>/lwp/<tid>/lwpsinfo`，所以字段宽度、顺序和填充都必须与内核头文件
//! 完全一致。这里不做内存重解释：先把文件读进定长字节缓冲区，再按字段顺序用本机
//! 字节序逐个解码。
//!
//! 结构体用 `#[repr(C)]` 声明，C 编译器隐式插入的对齐填充在这里写成显式字段，
//! 因此字段宽度之和、`size_of` 与内核常量三者必须相等，编译期即检查。

use std::mem::size_of;

use libc::{gid_t, pid_t, uid_t};

use super::types::{ProcfsError, Result};

/// `PRARGSZ`：`pr_psargs` 的容量
pub const PRARGSZ: usize = 80;
/// `PRCLSZ`：调度类名称的容量
pub const PRCLSZ: usize = 8;
/// `PRFNSZ`：`pr_fname` 的容量
pub const PRFNSZ: usize = 16;

/// 内核中 `sizeof(lwpsinfo_t)`
pub const PR_LWPSINFO_SIZE: usize = 128;
/// 内核中 `sizeof(psinfo_t)`
pub const PR_PSINFO_SIZE: usize = 416;

/// 按声明顺序读取本机字节序字段的游标
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// 取出接下来的 `N` 个字节；越界时返回 None，绝不越过缓冲区末尾
    pub fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.buf.get(self.pos..end)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Some(out)
    }

    pub fn read<T: NativeField>(&mut self) -> Option<T> {
        T::read(self)
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

/// 与 [`FieldReader`] 对称的写游标，用于重新编码原始记录
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// 可以从内核结构体中按本机字节序读写的定宽字段
pub trait NativeField: Sized {
    /// 字段在内核结构体中占用的字节数
    const WIDTH: usize;

    fn read(reader: &mut FieldReader<'_>) -> Option<Self>;

    fn write(&self, writer: &mut FieldWriter);
}

macro_rules! native_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NativeField for $ty {
                const WIDTH: usize = size_of::<$ty>();

                fn read(reader: &mut FieldReader<'_>) -> Option<Self> {
                    reader.take::<{ size_of::<$ty>() }>().map(<$ty>::from_ne_bytes)
                }

                fn write(&self, writer: &mut FieldWriter) {
                    writer.put(&self.to_ne_bytes());
                }
            }
        )*
    };
}

native_int!(u8, i16, u16, i32, u32, i64, u64);

impl<T: NativeField + Copy + Default, const N: usize> NativeField for [T; N] {
    const WIDTH: usize = T::WIDTH * N;

    fn read(reader: &mut FieldReader<'_>) -> Option<Self> {
        let mut out = [T::default(); N];
        for slot in out.iter_mut() {
            *slot = T::read(reader)?;
        }
        Some(out)
    }

    fn write(&self, writer: &mut FieldWriter) {
        for item in self {
            item.write(writer);
        }
    }
}

/// 声明一个内核结构体：生成 `#[repr(C)]` 定义，以及按字段顺序的编解码
macro_rules! kernel_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl NativeField for $name {
            const WIDTH: usize = 0 $( + <$ty as NativeField>::WIDTH )*;

            fn read(reader: &mut FieldReader<'_>) -> Option<Self> {
                Some(Self {
                    $( $field: reader.read()?, )*
                })
            }

            fn write(&self, writer: &mut FieldWriter) {
                $( self.$field.write(writer); )*
            }
        }
    };
}

kernel_struct! {
    /// `timestruc_t`
    #[derive(Default, Hash)]
    pub struct RawTimespec {
        pub tv_sec: i64,
        pub tv_nsec: i64,
    }
}

kernel_struct! {
    /// `struct lwpsinfo`：`/proc/<pid>/lwp/<tid>/lwpsinfo`
    pub struct RawThreadRecord {
        /// 已废弃
        pub pr_flag: i32,
        pub pr_lwpid: u32,
        pub pr_addr: u64,
        pub pr_wchan: u64,
        /// 同步事件类型
        pub pr_stype: u8,
        /// 数值状态
        pub pr_state: u8,
        /// `pr_state` 的可打印字符
        pub pr_sname: u8,
        pub pr_nice: u8,
        pub pr_syscall: i16,
        pub pr_oldpri: u8,
        pub pr_cpu: u8,
        /// 优先级，数值越大优先级越高
        pub pr_pri: i32,
        pub pr_pctcpu: u16,
        pub pr_pad: u16,
        /// lwp 启动时间（相对纪元）
        pub pr_start: RawTimespec,
        /// 用户态+内核态 CPU 时间
        pub pr_time: RawTimespec,
        pub pr_clname: [u8; PRCLSZ],
        pub pr_name: [u8; PRFNSZ],
        pub pr_onpro: i32,
        pub pr_bindpro: i32,
        pub pr_bindpset: i32,
        pub pr_lgrp: i32,
        pub pr_filler: [i32; 4],
    }
}

kernel_struct! {
    /// `struct psinfo`：`/proc/<pid>/psinfo`
    pub struct RawProcessRecord {
        /// 已废弃
        pub pr_flag: i32,
        /// 活动 lwp 数
        pub pr_nlwp: i32,
        pub pr_pid: pid_t,
        pub pr_ppid: pid_t,
        pub pr_pgid: pid_t,
        pub pr_sid: pid_t,
        pub pr_uid: uid_t,
        pub pr_euid: uid_t,
        pub pr_gid: gid_t,
        pub pr_egid: gid_t,
        pub pr_addr: u64,
        /// 进程映像大小（KB）
        pub pr_size: u64,
        /// 常驻集大小（KB）
        pub pr_rssize: u64,
        pub pr_pad1: u64,
        pub pr_ttydev: u64,
        pub pr_pctcpu: u16,
        pub pr_pctmem: u16,
        /// C 编译器为 `pr_start` 的 8 字节对齐插入的填充
        pub pr_align: [u8; 4],
        pub pr_start: RawTimespec,
        pub pr_time: RawTimespec,
        /// 已回收子进程的 CPU 时间
        pub pr_ctime: RawTimespec,
        pub pr_fname: [u8; PRFNSZ],
        pub pr_psargs: [u8; PRARGSZ],
        pub pr_wstat: i32,
        pub pr_argc: i32,
        pub pr_argv: u64,
        pub pr_envp: u64,
        pub pr_dmodel: u8,
        pub pr_pad2: [u8; 3],
        pub pr_taskid: i32,
        pub pr_projid: i32,
        pub pr_nzomb: i32,
        pub pr_poolid: i32,
        pub pr_zoneid: i32,
        pub pr_contract: i32,
        pub pr_filler: [i32; 1],
        /// 代表线程
        pub pr_lwp: RawThreadRecord,
    }
}

const _: () = assert!(RawTimespec::WIDTH == size_of::<RawTimespec>());
const _: () = assert!(RawThreadRecord::WIDTH == PR_LWPSINFO_SIZE);
const _: () = assert!(size_of::<RawThreadRecord>() == PR_LWPSINFO_SIZE);
const _: () = assert!(RawProcessRecord::WIDTH == PR_PSINFO_SIZE);
const _: () = assert!(size_of::<RawProcessRecord>() == PR_PSINFO_SIZE);
const _: () = assert!(std::mem::offset_of!(RawThreadRecord, pr_start) == 40);
const _: () = assert!(std::mem::offset_of!(RawProcessRecord, pr_start) == 88);
const _: () = assert!(std::mem::offset_of!(RawProcessRecord, pr_psargs) == 152);
const _: () = assert!(std::mem::offset_of!(RawProcessRecord, pr_lwp) == 288);

/// 一个可从 procfs 文件整块读出的内核结构体
pub trait KernelRecord: NativeField {
    /// 内核头文件中的结构体名，用于日志和错误
    const NAME: &'static str;
    /// 内核定义的总字节数
    const SIZE: usize;

    /// 从恰好 `SIZE` 字节的缓冲区解码；长度不符即为 ABI 不匹配
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mismatch = |actual| ProcfsError::AbiMismatch {
            structure: Self::NAME,
            expected: Self::SIZE,
            actual,
        };
        if bytes.len() != Self::SIZE {
            return Err(mismatch(bytes.len()));
        }
        let mut reader = FieldReader::new(bytes);
        let record = Self::read(&mut reader).ok_or_else(|| mismatch(bytes.len()))?;
        if reader.position() != Self::SIZE {
            return Err(mismatch(reader.position()));
        }
        Ok(record)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = FieldWriter::with_capacity(Self::SIZE);
        self.write(&mut writer);
        writer.into_inner()
    }
}

impl KernelRecord for RawThreadRecord {
    const NAME: &'static str = "lwpsinfo";
    const SIZE: usize = PR_LWPSINFO_SIZE;
}

impl KernelRecord for RawProcessRecord {
    const NAME: &'static str = "psinfo";
    const SIZE: usize = PR_PSINFO_SIZE;
}
