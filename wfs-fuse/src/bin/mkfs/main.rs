mod cli;

use std::path::Path;
use std::process::ExitCode;

use block_dev::Disk;
use clap::Parser;
use cli::Cli;
use wfs::{FormatOptions, Wfs};

/// 参数或磁盘不可用
const USAGE_FAILURE: u8 = 1;
/// 格式化失败
const FORMAT_FAILURE: u8 = 255;

/// 打开失败时的退出码。空镜像放不下任何布局，与镜像过小同等对待。
fn open_failure(path: &Path, e: &block_dev::Error) -> u8 {
    match e {
        block_dev::Error::Empty => {
            eprintln!("error: {} is too small for the volume layout", path.display());
            FORMAT_FAILURE
        }
        e => {
            eprintln!("error: cannot open {}: {e}", path.display());
            USAGE_FAILURE
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help 与 --version 不算错误
            let code = if e.use_stderr() { USAGE_FAILURE } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    if cli.disks.len() < 2 {
        eprintln!("error: a volume needs at least 2 disks");
        return ExitCode::from(USAGE_FAILURE);
    }

    let mut disks = Vec::with_capacity(cli.disks.len());
    for path in &cli.disks {
        match Disk::open(path) {
            Ok(disk) => disks.push(disk),
            Err(e) => return ExitCode::from(open_failure(path, &e)),
        }
    }

    let options = FormatOptions::new(cli.raid, cli.inodes, cli.blocks);
    match Wfs::format(&mut disks, &options) {
        Ok(layout) => {
            log::info!("fs id {:#x}, layout {layout:?}", options.fs_identifier);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(FORMAT_FAILURE)
        }
    }
}
