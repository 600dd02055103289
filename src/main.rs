//! psdump：以 JSON Lines 形式输出进程快照
//!
//! 用法：`psdump [--threads] [--root DIR] [--cmdline-buffer N] [pid...]`。
//! 不指定 pid 时输出所有进程。

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};
use serde::Serialize;

use psinfo::procfs::{CMDLINE_BUFFER_ENV, DEFAULT_CMDLINE_BUFFER, DEFAULT_ROOT, ROOT_ENV};
use psinfo::{ProcFs, ProcFsConfig, ProcessId, ProcessInfo, ThreadInfo};

#[derive(Parser, Debug)]
#[command(
    name = "psdump",
    version,
    about = "Dump binary procfs process snapshots as JSON Lines"
)]
struct Args {
    /// 同时输出每个进程的全部 lwp
    #[arg(long)]
    threads: bool,

    /// procfs 根目录
    #[arg(long, env = ROOT_ENV, default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// 读取 cmdline 时的初始缓冲区大小（字节）
    #[arg(long, env = CMDLINE_BUFFER_ENV)]
    cmdline_buffer: Option<usize>,

    /// 只输出这些进程；为空时输出全部
    #[arg(value_parser = clap::value_parser!(u32).range(..=i64::from(i32::MAX)))]
    pids: Vec<u32>,
}

impl Args {
    fn config(&self) -> ProcFsConfig {
        ProcFsConfig {
            root: self.root.clone(),
            cmdline_buffer_size: self
                .cmdline_buffer
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_CMDLINE_BUFFER),
        }
    }

    fn process_ids(&self) -> Vec<ProcessId> {
        self.pids
            .iter()
            .filter_map(|&raw| i32::try_from(raw).ok().and_then(ProcessId::new))
            .collect()
    }
}

#[derive(Serialize)]
struct Record<'a> {
    #[serde(flatten)]
    process: &'a ProcessInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    threads: Option<Vec<ThreadInfo>>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = args.config();

    if let Err(e) = psinfo::init_with_config(&config) {
        error!("procfs is not usable: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&ProcFs::new(Some(config)), &args.process_ids(), args.threads) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(fs: &ProcFs, pids: &[ProcessId], with_threads: bool) -> psinfo::Result<()> {
    let processes = if pids.is_empty() {
        fs.get_process_infos()?
    } else {
        let mut processes = Vec::with_capacity(pids.len());
        for &pid in pids {
            match fs.try_get_process_info(pid)? {
                Some(mut info) => {
                    info.name = fs.full_name(pid, std::mem::take(&mut info.name));
                    processes.push(info);
                }
                None => warn!("process {} is not available", pid),
            }
        }
        processes
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for process in &processes {
        let threads = if with_threads {
            fs.try_get_threads(process.pid)?
        } else {
            None
        };
        let record = Record { process, threads };
        let line = serde_json::to_string(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(out, "{}", line)?;
    }
    Ok(())
}
