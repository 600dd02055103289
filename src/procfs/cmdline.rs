//! 从 `/proc/<pid>/cmdline` 恢复被 `pr_fname` 截断的进程名
//!
//! cmdline 是以 NUL 分隔的 argv。原生可执行文件的名字在 argv[0]；脚本的
//! argv[0] 是解释器，脚本名在 argv[1]。只有带 LX 支持的系统才提供这个文件，
//! 缺失时视为无法恢复，不是错误。

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::trace;

/// 常见命令行放得下的初始缓冲区大小
pub const DEFAULT_CMDLINE_BUFFER: usize = 512;

/// 逐块读取 cmdline，在 argv[0]、argv[1] 中寻找以 `prefix` 开头（忽略大小写）
/// 的 basename。任何失败都退回 `prefix` 本身。
pub fn recover_untruncated_name(path: &Path, prefix: &str, initial_capacity: usize) -> String {
    match File::open(path).and_then(|file| find_name(file, prefix, initial_capacity)) {
        Ok(Some(name)) => {
            trace!("recovered {:?} from {} for {:?}", name, path.display(), prefix);
            name
        }
        Ok(None) => {
            trace!("no argv entry in {} matches {:?}", path.display(), prefix);
            prefix.to_string()
        }
        Err(e) => {
            trace!("cannot read {}: {}", path.display(), e);
            prefix.to_string()
        }
    }
}

fn find_name<R: Read>(
    mut reader: R,
    prefix: &str,
    initial_capacity: usize,
) -> io::Result<Option<String>> {
    let mut buf = vec![0u8; initial_capacity.max(1)];
    let mut filled = 0;

    loop {
        if filled == buf.len() {
            let doubled = buf.len() * 2;
            buf.resize(doubled, 0);
        }

        let n = reader.read(&mut buf[filled..])?;
        filled += n;

        let data = &buf[..filled];
        if let Some(end0) = find_nul(data) {
            if let Some(name) = match_arg(&data[..end0], prefix) {
                return Ok(Some(name));
            }

            let rest = &data[end0 + 1..];
            if let Some(end1) = find_nul(rest) {
                return Ok(match_arg(&rest[..end1], prefix));
            }
        }

        if n == 0 {
            return Ok(None);
        }
    }
}

fn find_nul(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == 0)
}

/// 去掉目录部分后，若 basename 以 `prefix` 开头则返回它
fn match_arg(arg: &[u8], prefix: &str) -> Option<String> {
    let start = arg.iter().rposition(|&b| b == b'/').map_or(0, |i| i + 1);
    let name = String::from_utf8_lossy(&arg[start..]);
    if starts_with_ignore_case(&name, prefix) {
        Some(name.into_owned())
    } else {
        None
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    let mut haystack = s.chars().flat_map(char::to_lowercase);
    prefix
        .chars()
        .flat_map(char::to_lowercase)
        .all(|c| haystack.next() == Some(c))
}
