use std::{fs, path::Path};

use anyhow::{Context, Result};

use super::safe_name;
use crate::game::Game;

/// Export embedded binary files and pack files as raw bytes.
pub fn dump_binary_files(game: &Game, output_folder: &Path) -> Result<()> {
    fs::create_dir_all(output_folder).context("Failed to create folder")?;

    if let Some(files) = &game.header.binary_files {
        for file in &files.items {
            let name = safe_name(&file.name);
            match fs::write(output_folder.join(&name), &file.data) {
                Ok(()) => eprintln!("Extracted binary file: {}", name),
                Err(e) => eprintln!("Failed to extract binary file {}: {:?}", name, e),
            }
        }
    }

    if !game.pack_files.is_empty() {
        let pack_folder = output_folder.join("packdata");
        fs::create_dir_all(&pack_folder).context("Failed to create folder")?;
        for file in &game.pack_files {
            let name = safe_name(&file.name);
            match fs::write(pack_folder.join(&name), &file.data) {
                Ok(()) => eprintln!("Extracted pack file: {}", name),
                Err(e) => eprintln!("Failed to extract pack file {}: {:?}", name, e),
            }
        }
    }

    Ok(())
}
