use std::{fs, path::Path};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use crate::chunks::banks::sniff_extension;
use crate::game::Game;

/// Export music items as their embedded formats, named by handle.
pub fn dump_music(game: &Game, patterns: &[Pattern], output_folder: &Path) -> Result<()> {
    let Some(bank) = &game.header.music_bank else {
        eprintln!("Game has no music bank");
        return Ok(());
    };

    fs::create_dir_all(output_folder).context("Failed to create folder")?;

    bank.items
        .iter()
        .map(|item| -> Result<Option<String>, anyhow::Error> {
            let payload = item.payload(&game.decoder)?;
            let name = format!("{}.{}", item.handle(), sniff_extension(&payload));
            if !patterns.iter().any(|pattern| {
                pattern.matches_with(
                    &name,
                    MatchOptions {
                        require_literal_separator: true,
                        ..Default::default()
                    },
                )
            }) {
                return Ok(None);
            }
            fs::write(output_folder.join(&name), &payload).context("Failed to write file")?;
            Ok(Some(name))
        })
        .for_each(|result| match result {
            Ok(Some(name)) => eprintln!("Extracted music: {}", name),
            Ok(None) => {}
            Err(e) => eprintln!("Failed to extract music: {:?}", e),
        });

    Ok(())
}
