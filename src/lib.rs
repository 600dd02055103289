//! psinfo - 二进制 procfs 的只读解码器
//!
//! 这个库读取 Solaris/illumos 风格 procfs 中的 `psinfo`、`lwpsinfo` 和
//! `cmdline` 文件，把内核的定长结构体逐字节解码为类型化的快照记录，并枚举
//! 主机上的所有进程。它从不创建、发送信号或等待进程。

// 导出所有公共模块
pub mod ffi;
pub mod procfs;

// 重新导出常用类型，使其可以直接从 crate 根访问
pub use crate::ffi::types::{ProcessId, ProcfsError, Result, ThreadId, TimeSpec};
pub use crate::procfs::translate::{translate_process, translate_thread};
pub use crate::procfs::{
    enumerate_process_ids, recover_untruncated_name, try_get_process_info, try_get_thread_info,
    try_read_process_status, ProcFs, ProcFsConfig, ProcessInfo, ProcessStatusInfo, ThreadInfo,
};

/// 库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 初始化日志系统并检查 procfs 是否可用
///
/// 这个函数应该在使用库之前调用
pub fn init() -> Result<()> {
    init_with_config(&ProcFsConfig::from_env())
}

/// 与 `init` 相同，但检查给定配置中的根目录
pub fn init_with_config(config: &ProcFsConfig) -> Result<()> {
    // 初始化日志
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    // 宿主程序可能已经安装了 logger，或者多次调用 init；
    // 这时保留已有的 logger 即可
    if env_logger::try_init().is_err() {
        log::debug!("logger already initialized");
    }

    // 检查运行时环境
    check_environment(config)
}

/// 检查 procfs 根目录是否存在
fn check_environment(config: &ProcFsConfig) -> Result<()> {
    let metadata = std::fs::metadata(&config.root)?;
    if !metadata.is_dir() {
        return Err(ProcfsError::SyscallError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", config.root.display()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_check_environment() {
        let dir = tempdir().expect("Failed to create temp dir");
        let config = ProcFsConfig {
            root: dir.path().to_path_buf(),
            ..ProcFsConfig::default()
        };
        assert!(check_environment(&config).is_ok());

        let missing = ProcFsConfig {
            root: dir.path().join("missing"),
            ..ProcFsConfig::default()
        };
        assert!(check_environment(&missing).is_err());
    }

    #[test]
    fn test_init_twice() {
        let dir = tempdir().expect("Failed to create temp dir");
        let config = ProcFsConfig {
            root: dir.path().to_path_buf(),
            ..ProcFsConfig::default()
        };
        assert!(init_with_config(&config).is_ok());
        assert!(init_with_config(&config).is_ok());
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
