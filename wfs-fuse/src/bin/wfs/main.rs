mod cli;

use std::env;
use std::ffi::OsString;
use std::path::Path;
use std::process::ExitCode;

use block_dev::Disk;
use clap::Parser;
use cli::FuseArgs;
use fuser::MountOption;
use wfs::Wfs;
use wfs_fuse::{WfsFuse, mount_option, split_disks};

fn main() -> ExitCode {
    let args: Vec<OsString> = env::args_os().collect();
    let Some((program, args)) = args.split_first() else {
        return ExitCode::FAILURE;
    };
    let (disks, rest) = split_disks(args);

    let fuse_args = match FuseArgs::try_parse_from(std::iter::once(program).chain(rest)) {
        Ok(fuse_args) => fuse_args,
        Err(e) => e.exit(),
    };

    let level = if fuse_args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if disks.len() < 2 {
        log::error!(
            "usage: {} disk1 disk2 [disk...] [FUSE options] mountpoint",
            program.to_string_lossy()
        );
        return ExitCode::FAILURE;
    }
    // 总是在前台单线程运行，-f 与 -s 只为兼容而接受
    log::debug!(
        "foreground: {}, single thread: {}",
        fuse_args.foreground,
        fuse_args.single_thread
    );

    let mut images = Vec::with_capacity(disks.len());
    for path in disks {
        match Disk::open(path) {
            Ok(disk) => images.push(disk),
            Err(e) => {
                log::error!("cannot open {}: {e}", Path::new(path).display());
                return ExitCode::FAILURE;
            }
        }
    }

    let fs = match Wfs::mount(images) {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut options = vec![
        MountOption::FSName("wfs".to_owned()),
        MountOption::DefaultPermissions,
    ];
    options.extend(fuse_args.options.iter().map(|option| mount_option(option)));

    log::info!("mounting on {}", fuse_args.mountpoint.display());
    match fuser::mount2(WfsFuse::new(fs), &fuse_args.mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("FUSE mount failed: {e}");
            ExitCode::FAILURE
        }
    }
}
