use std::{fs, path::Path};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::chunks::frame::Palette;
use crate::game::Game;

/// Export decoded images as PNG, named `<handle>.png`, filtered by glob
/// patterns over those names.
pub fn dump_images(game: &Game, patterns: &[Pattern], output_folder: &Path) -> Result<()> {
    let Some(bank) = &game.header.image_bank else {
        eprintln!("Game has no image bank");
        return Ok(());
    };

    // palette-indexed images borrow the first frame palette in the game
    let palette = game
        .header
        .frame_bank
        .iter()
        .flat_map(|bank| bank.items.iter())
        .find_map(|frame| frame.palette.as_ref())
        .map(|palette: &Palette| palette.colors.as_ref());

    fs::create_dir_all(output_folder).context("Failed to create folder")?;

    let selected = bank
        .items
        .iter()
        .filter(|item| {
            let name = format!("{}.png", item.handle());
            patterns.iter().any(|pattern| {
                pattern.matches_with(
                    &name,
                    MatchOptions {
                        require_literal_separator: true,
                        ..Default::default()
                    },
                )
            })
        })
        .collect::<Vec<_>>();

    selected
        .par_iter()
        .map(|item| -> Result<String, anyhow::Error> {
            let name = format!("{}.png", item.handle());
            let rgba = item.rgba(&game.decoder, true, palette)?;
            let img =
                image::RgbaImage::from_raw(item.width as u32, item.height as u32, rgba)
                    .context("Image buffer has the wrong size")?;
            img.save(output_folder.join(&name))
                .context("Failed to write file")?;
            Ok(name)
        })
        // Report results
        .for_each(|result| match result {
            Ok(name) => eprintln!("Extracted image: {}", name),
            Err(e) => eprintln!("Failed to extract image: {:?}", e),
        });

    Ok(())
}
