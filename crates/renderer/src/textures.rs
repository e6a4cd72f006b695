//! Concurrent decoding of `@texture` assets.
//!
//! Every declared path is decoded on its own thread. Results arrive tagged
//! with their declaration index and are reassembled in order, so binding
//! indices never depend on which decode finished first.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use image::imageops::flip_vertical_in_place;

use crate::error::TextureLoadError;

/// Decoded RGBA8 pixels, rows flipped so row 0 is the bottom of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Outcome of a batch load before it is turned into a reload result.
#[derive(Debug, Default)]
pub struct TextureBatch {
    /// Successfully decoded images in declaration order; failed slots are skipped.
    pub images: Vec<TextureImage>,
    pub failures: Vec<(PathBuf, String)>,
}

impl TextureBatch {
    pub fn into_result(self) -> Result<Vec<TextureImage>, TextureLoadError> {
        if self.failures.is_empty() {
            Ok(self.images)
        } else {
            Err(TextureLoadError {
                failures: self.failures,
            })
        }
    }
}

pub fn decode_image(path: &Path) -> Result<TextureImage, String> {
    let image = image::open(path).map_err(|err| err.to_string())?;
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    let (width, height) = rgba.dimensions();
    Ok(TextureImage {
        path: path.to_path_buf(),
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

pub fn load_textures(paths: &[PathBuf]) -> Result<Vec<TextureImage>, TextureLoadError> {
    load_textures_with(paths, decode_image).into_result()
}

pub fn load_textures_with<F>(paths: &[PathBuf], decode: F) -> TextureBatch
where
    F: Fn(&Path) -> Result<TextureImage, String> + Sync,
{
    if paths.is_empty() {
        return TextureBatch::default();
    }
    let (sender, receiver) = crossbeam_channel::unbounded();
    thread::scope(|scope| {
        for (index, path) in paths.iter().enumerate() {
            let sender = sender.clone();
            let decode = &decode;
            scope.spawn(move || {
                let _ = sender.send((index, decode(path.as_path())));
            });
        }
    });
    drop(sender);

    let mut completed = BTreeMap::new();
    let mut failed = BTreeMap::new();
    for (index, result) in receiver.iter() {
        match result {
            Ok(image) => {
                completed.insert(index, image);
            }
            Err(reason) => {
                failed.insert(index, reason);
            }
        }
    }

    let mut batch = TextureBatch::default();
    for (index, path) in paths.iter().enumerate() {
        if let Some(image) = completed.remove(&index) {
            batch.images.push(image);
        } else {
            let reason = failed
                .remove(&index)
                .unwrap_or_else(|| "decoder thread exited without a result".to_string());
            tracing::warn!(path = %path.display(), %reason, "texture failed to load");
            batch.failures.push((path.clone(), reason));
        }
    }
    tracing::debug!(
        loaded = batch.images.len(),
        failed = batch.failures.len(),
        "texture batch finished"
    );
    batch
}
