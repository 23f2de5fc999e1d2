use std::path::PathBuf;

use clap::Parser;

/// FUSE 风格的挂载参数，位于磁盘镜像之后
#[derive(Parser, Debug)]
#[command(name = "wfs")]
pub struct FuseArgs {
    /// Stay in the foreground
    #[arg(short)]
    pub foreground: bool,

    /// Single-threaded operation
    #[arg(short)]
    pub single_thread: bool,

    /// Enable debug output
    #[arg(short)]
    pub debug: bool,

    /// Mount options, comma separated
    #[arg(short, value_delimiter = ',')]
    pub options: Vec<String>,

    pub mountpoint: PathBuf,
}
