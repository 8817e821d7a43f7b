//! FAT32 Undelete - deleted file recovery for raw FAT32 images
//!
//! - Boot sector summary and root directory listing
//! - Contiguous file recovery, optionally verified by SHA-1
//! - Fragmented file recovery by SHA-1 guided cluster search
//!
//! Recovery edits the image in place: the directory entry's first name byte
//! and the FAT chain in every FAT copy.

mod boot_sector;
mod config;
mod directory;
mod disk_image;
mod error;
mod fat_table;
mod hash_verify;
mod name_match;
mod recovery_engine;
mod report;

#[cfg(test)]
mod test_image;

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use log::debug;
use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::disk_image::DiskImage;
use crate::error::Result;
use crate::hash_verify::Sha1Digest;
use crate::recovery_engine::{RecoveredFile, RecoveryEngine};
use crate::report::{list_root, FsInfo};

#[derive(Parser, Debug)]
#[command(
    name = "fat-undelete",
    version,
    about = "Recover deleted files from a FAT32 disk image",
    group(
        ArgGroup::new("action")
            .required(true)
            .args(["info", "list", "recover", "recover_fragmented"])
    )
)]
struct Cli {
    /// Path to the FAT32 image
    disk: PathBuf,

    /// Print the file system information
    #[arg(short = 'i')]
    info: bool,

    /// List the root directory
    #[arg(short = 'l')]
    list: bool,

    /// Recover a contiguous file
    #[arg(short = 'r', value_name = "FILENAME")]
    recover: Option<String>,

    /// Recover a possibly non-contiguous file
    #[arg(short = 'R', value_name = "FILENAME", requires = "sha1")]
    recover_fragmented: Option<String>,

    /// Expected SHA-1 of the file, as 40 hex characters
    #[arg(short = 's', value_name = "SHA1", conflicts_with_all = ["info", "list"])]
    sha1: Option<String>,

    /// Emit results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct RecoveryReport {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recovered: Option<RecoveredFile>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.info || cli.list {
        return print_report(cli);
    }

    let digest = cli.sha1.as_deref().map(Sha1Digest::from_hex).transpose()?;
    let image = DiskImage::open_writable(&cli.disk)?;
    let mut engine = RecoveryEngine::new(image, RecoveryConfig::default())?;

    let outcome = match (&cli.recover, &cli.recover_fragmented, &digest) {
        (Some(name), _, digest) => engine.recover_contiguous(name, digest.as_ref()),
        (None, Some(name), Some(digest)) => engine.recover_fragmented(name, digest),
        // clap enforces an action and a digest for -R
        _ => return Ok(()),
    };

    let report = match outcome {
        Ok(recovered) => {
            engine.into_image().flush()?;
            RecoveryReport {
                success: true,
                message: recovered.to_string(),
                recovered: Some(recovered),
            }
        }
        Err(e) if e.is_outcome() => {
            debug!("Recovery ended without changes: {:?}", e);
            RecoveryReport {
                success: false,
                message: e.to_string(),
                recovered: None,
            }
        }
        Err(e) => return Err(e),
    };

    if cli.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", report.message);
    }
    Ok(())
}

fn print_report(cli: &Cli) -> Result<()> {
    let image = DiskImage::open_read_only(&cli.disk)?;
    let engine = RecoveryEngine::new(image, RecoveryConfig::default())?;

    if cli.info {
        let info = FsInfo::from(engine.geometry());
        if cli.json {
            println!("{}", serde_json::to_string(&info)?);
        } else {
            println!("{}", info);
        }
        return Ok(());
    }

    let listing = list_root(engine.image(), engine.geometry(), engine.fat())?;
    if cli.json {
        println!("{}", serde_json::to_string(&listing)?);
    } else {
        println!("{}", listing);
    }
    Ok(())
}
