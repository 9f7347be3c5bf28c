use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use tagthumbs::{BatchEntry, Config, LocalStorage, ThumbnailGenerator};

/// Looks up or generates thumbnails in the per-folder meta directory.
#[derive(Debug, Parser)]
#[command(name = "tagthumbs", version)]
struct Cli {
    /// Regenerate all files concurrently, ignoring cached thumbnails
    #[arg(long, conflicts_with = "folder")]
    regenerate: bool,

    /// Use each file's thumbnail as the thumbnail of its folder
    #[arg(long)]
    folder: bool,

    /// Source files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        "Thumbnails go to {}/<name>{} (max {}px)",
        config.meta_folder,
        config.thumbnail_extension(),
        config.max_thumb_size
    );

    let generator = ThumbnailGenerator::new(config, Arc::new(LocalStorage::new()), None)?;

    if cli.regenerate {
        let entries: Vec<BatchEntry> = cli
            .files
            .iter()
            .map(|file| {
                let size = std::fs::metadata(file).ok().map(|m| m.len());
                BatchEntry::new(file, size)
            })
            .collect();

        let regenerated = generator.regenerate_batch(&entries).await;
        info!(
            "Regenerated {} of {} thumbnails",
            regenerated.len(),
            entries.len()
        );
        for thumbnail in regenerated {
            println!("{}\t{}", thumbnail.source_path.display(), thumbnail.url);
        }
    } else if cli.folder {
        for file in &cli.files {
            match generator.set_folder_thumbnail(file).await.thumbnail_path {
                Some(thumbnail) => println!("Thumbnail created for: {}", thumbnail.display()),
                None => println!("Thumbnail creation failed for: {}", file.display()),
            }
        }
    } else {
        for file in &cli.files {
            match generator.lookup_or_generate(file).await.thumbnail_path {
                Some(thumbnail) => println!("{}\t{}", file.display(), thumbnail.display()),
                None => println!("{}\t-", file.display()),
            }
        }
    }

    Ok(())
}
