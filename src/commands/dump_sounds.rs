use std::{fs, path::Path};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use super::safe_name;
use crate::chunks::banks::sniff_extension;
use crate::game::Game;

/// Export sounds with their embedded names, extension sniffed from the
/// payload container.
pub fn dump_sounds(game: &Game, patterns: &[Pattern], output_folder: &Path) -> Result<()> {
    let Some(bank) = &game.header.sound_bank else {
        eprintln!("Game has no sound bank");
        return Ok(());
    };

    fs::create_dir_all(output_folder).context("Failed to create folder")?;

    bank.items
        .iter()
        .map(|item| -> Result<Option<String>, anyhow::Error> {
            let payload = item.payload(&game.decoder)?;
            let base = if item.name.is_empty() {
                item.handle().to_string()
            } else {
                safe_name(&item.name)
            };
            let name = format!("{}.{}", base, sniff_extension(&payload));
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
            Ok(Some(name)) => eprintln!("Extracted sound: {}", name),
            Ok(None) => {}
            Err(e) => eprintln!("Failed to extract sound: {:?}", e),
        });

    Ok(())
}
