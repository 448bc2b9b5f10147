mod cli;

use std::fs::File;
use std::io::{self, Read, Write};
use std::process;

use chainfs::io::DiskImage;
use chainfs::{ChainFs, FileKind, Geometry};
use clap::Parser;
use cli::{Cli, Command};
use log::error;

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        error!("{}", err);
        eprintln!("chainfs: {}", err);
        process::exit(err.errno());
    }
}

fn run(cli: Cli) -> chainfs::Result<()> {
    let geometry = Geometry::new(cli.size)?;
    let open = || ChainFs::<DiskImage>::open(&cli.disk, geometry);

    match cli.command {
        Command::Format => {
            ChainFs::create(&cli.disk, geometry)?;
            println!(
                "{}: {} blocks, {} allocatable",
                cli.disk.display(),
                geometry.total_blocks(),
                geometry.data_blocks() - 1
            );
        }
        Command::Mkdir { path } => open()?.make_directory(&path)?,
        Command::Touch { path } => open()?.make_file(&path)?,
        Command::Ls { path } => {
            for name in open()?.list_directory(&path)? {
                println!("{}", name);
            }
        }
        Command::Stat { path } => {
            let attrs = open()?.get_attributes(&path)?;
            let kind = match attrs.kind {
                FileKind::Directory => "directory",
                FileKind::RegularFile => "regular file",
            };
            println!(
                "{}: {} {:o} links={} size={}",
                path, kind, attrs.perm, attrs.nlink, attrs.size
            );
        }
        Command::Cat { path } => cat(&open()?, &path)?,
        Command::Write {
            offset,
            path,
            source,
        } => {
            let mut data = Vec::new();
            match source {
                Some(source) => File::open(source)?.read_to_end(&mut data)?,
                None => io::stdin().read_to_end(&mut data)?,
            };
            let written = open()?.write(&path, &data, offset)?;
            println!("wrote {} bytes", written);
        }
        Command::Check => {
            let report = open()?.check()?;
            println!(
                "{} directories, {} files, {} blocks in use",
                report.directories, report.files, report.reachable_blocks
            );
            for blocknr in &report.unmarked {
                println!("block {} is reachable but marked free", blocknr);
            }
            for blocknr in &report.leaked {
                println!("block {} is marked used but unreachable", blocknr);
            }
            for blocknr in &report.shared {
                println!("block {} is reached more than once", blocknr);
            }
            for name in &report.short_files {
                println!("{} is shorter than its recorded size", name);
            }
            if !report.is_clean() {
                process::exit(1);
            }
        }
    }
    Ok(())
}

fn cat(fs: &ChainFs, path: &str) -> chainfs::Result<()> {
    let size = fs.get_attributes(path)?.size;
    let mut buf = vec![0; 4096];
    let mut offset = 0;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    while offset < size {
        let n = fs.read(path, &mut buf, offset)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
    }
    out.flush()?;
    Ok(())
}
