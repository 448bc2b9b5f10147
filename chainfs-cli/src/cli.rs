use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chainfs", about = "Inspect and modify a chainfs container")]
pub struct Cli {
    /// Container file
    #[arg(long, short, default_value = ".disk")]
    pub disk: PathBuf,

    /// Container size in bytes
    #[arg(long, short, default_value_t = chainfs::DISK_SIZE)]
    pub size: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a zero-filled container, overwriting any existing file
    Format,
    /// Create a subdirectory, e.g. `/DOCS`
    Mkdir { path: String },
    /// Create an empty file, e.g. `/DOCS/report.txt`
    Touch { path: String },
    /// List the root or a subdirectory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show the attributes of a path
    Stat { path: String },
    /// Print a file to stdout
    Cat { path: String },
    /// Write into a file from a host file or stdin
    Write {
        /// Byte offset to start at, at most the current file size
        #[arg(long, short, default_value_t = 0)]
        offset: u64,
        path: String,
        /// Host file to copy from; stdin when absent
        source: Option<PathBuf>,
    },
    /// Compare reachable blocks with the allocation bitmap
    Check,
}
