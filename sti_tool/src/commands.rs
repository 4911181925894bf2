use std::path::{Path, PathBuf};

use lib_sti::image::format::{ColorInfo, StiImage};
use lib_sti::{
    decode, encode_indexed_with, encode_true_color, CodecConfig, DataSource, PatchLibrary,
    SlfArchive, TgaImage,
};
use log::{info, warn};

use crate::filemanager::{
    load_rgba, read_file, remove_file, rgb_to_rgba, rgba_to_rgb, save_png, write_file, ToolError,
};
use crate::portraits::{is_modified, portrait_names, restore, restore_all, Portrait, Slot};

fn is_tga(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tga"))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("image")
        .to_string()
}

/// Human-readable summary of a container or TGA file.
pub fn info(path: &Path) -> Result<String, ToolError> {
    let data = read_file(path)?;
    if is_tga(path) {
        let tga = TgaImage::decode(&data)?;
        let mut out = format!(
            "TGA type {}: {}x{}, {} bpp, origin {}\n",
            tga.header.image_type,
            tga.width(),
            tga.height(),
            tga.header.bits_per_pixel,
            if tga.header.origin_top() { "top" } else { "bottom" }
        );
        if tga.footer.is_some() {
            out.push_str("TGA 2.0 footer present\n");
        }
        if let Some(err) = &tga.truncated {
            out.push_str(&format!("Warning: {}\n", err));
        }
        return Ok(out);
    }

    let mut out = String::new();
    match decode(&data)? {
        StiImage::Indexed(sti) => {
            let header = &sti.header;
            out.push_str(&format!(
                "Indexed STI: {}x{}, {} frames\nFlags: {:?}\nSizes: compressed {}, uncompressed {}\n",
                header.width,
                header.height,
                sti.frame_count(),
                header.flags,
                header.compressed_size,
                header.uncompressed_size
            ));
            out.push_str(&format!(
                "Alpha color: {:?}, end sentinel: {:?}\n",
                sti.palette.alpha_color(),
                sti.palette.end_sentinel()
            ));
            for (i, frame) in sti.frames.descriptors().iter().enumerate() {
                out.push_str(&format!(
                    "  Frame {:3} @{:06x}: {},{} {}x{} - {} bytes\n",
                    i, frame.offset, frame.x, frame.y, frame.width, frame.height, frame.size
                ));
            }
            if let Some(err) = &sti.truncated {
                out.push_str(&format!("Warning: {}\n", err));
            }
        }
        StiImage::TrueColor(image) => {
            out.push_str(&format!(
                "16-bit STI: {}x{}\nFlags: {:?}\n",
                image.width(),
                image.height(),
                image.header.flags
            ));
            if let ColorInfo::TrueColor(masks) = image.header.color {
                out.push_str(&format!(
                    "Masks: r {:#06x} g {:#06x} b {:#06x}\n",
                    masks.r_mask, masks.g_mask, masks.b_mask
                ));
            }
        }
    }
    Ok(out)
}

/// Writes every frame as `<stem>_<index>.png` (or `<stem>.png` for
/// single-image files) into `dir`. Returns the files written.
pub fn export(path: &Path, dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let data = read_file(path)?;
    let stem = file_stem(path);
    let mut written = Vec::new();

    if is_tga(path) {
        let tga = TgaImage::decode(&data)?;
        let target = dir.join(format!("{}.png", stem));
        save_png(&target, tga.width(), tga.height(), tga.to_rgba())?;
        written.push(target);
        return Ok(written);
    }

    match decode(&data)? {
        StiImage::Indexed(sti) => {
            if let Some(err) = &sti.truncated {
                warn!("{}: {}", path.display(), err);
            }
            for (i, descriptor) in sti.frames.descriptors().iter().enumerate() {
                let rgba = sti.frames.frame(i).unwrap_or_default().to_vec();
                let target = dir.join(format!("{}_{}.png", stem, i));
                save_png(&target, descriptor.width, descriptor.height, rgba)?;
                written.push(target);
            }
        }
        StiImage::TrueColor(image) => {
            let target = dir.join(format!("{}.png", stem));
            save_png(&target, image.width(), image.height(), rgb_to_rgba(&image.rgb))?;
            written.push(target);
        }
    }
    info!("Exported {} images from {}", written.len(), path.display());
    Ok(written)
}

/// Replaces frame `frame` of the container at `path` with the image at
/// `source` and writes the re-encoded container to `output`.
pub fn import(
    path: &Path,
    frame: usize,
    source: &Path,
    output: &Path,
    allow_truncated: bool,
    config: &CodecConfig,
) -> Result<(), ToolError> {
    let data = read_file(path)?;
    let (width, height, rgba) = load_rgba(source)?;

    let encoded = match decode(&data)? {
        StiImage::Indexed(mut sti) => {
            if let Some(err) = sti.truncated.take() {
                if !allow_truncated {
                    return Err(ToolError::Truncated {
                        path: path.display().to_string(),
                        source: err,
                    });
                }
                warn!("Re-encoding truncated container {}", path.display());
            }
            sti.replace_frame(frame, rgba, width, height)?;
            encode_indexed_with(&mut sti, config)?
        }
        StiImage::TrueColor(mut image) => {
            image.replace_image(rgba_to_rgb(&rgba), width, height)?;
            encode_true_color(&image)?
        }
    };

    write_file(output, &encoded)
}

/// One line per archive entry: path, offset, size.
pub fn list(path: &Path) -> Result<String, ToolError> {
    let archive = SlfArchive::from_bytes(read_file(path)?)?;
    let header = archive.header();
    let mut out = format!(
        "{} ({}), {} entries\n",
        header.name,
        header.base_path,
        archive.entries().len()
    );
    for entry in archive.entries() {
        out.push_str(&format!(
            "{:<48} @{:08x} {:>9}\n",
            entry.path, entry.offset, entry.size
        ));
    }
    Ok(out)
}

pub fn extract(path: &Path, name: &str, output: &Path) -> Result<(), ToolError> {
    let archive = SlfArchive::from_bytes(read_file(path)?)?;
    let data = archive.extract(name)?;
    write_file(output, data)
}

fn load_patch(path: &Path) -> Result<PatchLibrary, ToolError> {
    if path.exists() {
        Ok(PatchLibrary::from_bytes(&read_file(path)?)?)
    } else {
        Ok(PatchLibrary::default())
    }
}

/// Writes the library back, or deletes the file when nothing is left in it.
fn store_patch(path: &Path, library: &PatchLibrary) -> Result<(), ToolError> {
    match library.serialize()? {
        Some(bytes) => write_file(path, &bytes),
        None => {
            info!("Override library is empty, removing {}", path.display());
            remove_file(path)
        }
    }
}

pub fn patch_set(patch: &Path, entry: &str, file: &Path) -> Result<(), ToolError> {
    let mut library = load_patch(patch)?;
    if library.set(entry, read_file(file)?)?.is_some() {
        info!("Replaced existing override {}", entry);
    }
    store_patch(patch, &library)
}

/// Returns whether the entry was present.
pub fn patch_remove(patch: &Path, entry: &str) -> Result<bool, ToolError> {
    let mut library = load_patch(patch)?;
    let removed = library.remove(entry).is_some();
    if !removed {
        warn!("{} holds no override for {}", patch.display(), entry);
        return Ok(false);
    }
    store_patch(patch, &library)?;
    Ok(true)
}

/// The game's data archive and the override library it reads on top.
pub struct GameFiles {
    pub data: PathBuf,
    pub patch: PathBuf,
}

impl GameFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            data: dir.join("Data").join("DATA.SLF"),
            patch: dir.join("Patches").join("PATCH.010"),
        }
    }

    fn open(&self) -> Result<DataSource, ToolError> {
        let archive = SlfArchive::from_bytes(read_file(&self.data)?)?;
        Ok(DataSource::new(Some(archive), load_patch(&self.patch)?))
    }
}

fn key_stem(key: &str) -> &str {
    let file = key.rsplit('\\').next().unwrap_or(key);
    file.strip_suffix(".STI").unwrap_or(file)
}

/// One portrait name per line; overridden ones are marked with `*`.
pub fn portrait_list(game: &GameFiles) -> Result<String, ToolError> {
    let source = game.open()?;
    let mut out = String::new();
    for name in portrait_names(&source) {
        let marker = if is_modified(&source, &name) { " *" } else { "" };
        out.push_str(&format!("{}{}\n", name, marker));
    }
    Ok(out)
}

/// Writes the large, medium (one file per frame) and small portrait of
/// `name` as PNG, as the game currently sees them.
pub fn portrait_export(game: &GameFiles, name: &str, dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let source = game.open()?;
    let portrait = Portrait::load(&source, name)?;
    let mut written = Vec::new();

    let target = dir.join(format!("{}.png", key_stem(&portrait.keys.large)));
    let large = &portrait.large;
    save_png(&target, large.width(), large.height(), rgb_to_rgba(&large.rgb))?;
    written.push(target);

    let stem = key_stem(&portrait.keys.medium);
    for (i, descriptor) in portrait.medium.frames.descriptors().iter().enumerate() {
        let rgba = portrait.medium.frames.frame(i).unwrap_or_default().to_vec();
        let target = dir.join(format!("{}_{}.png", stem, i));
        save_png(&target, descriptor.width, descriptor.height, rgba)?;
        written.push(target);
    }

    let target = dir.join(format!("{}.png", key_stem(&portrait.keys.small)));
    match &portrait.small {
        StiImage::TrueColor(image) => {
            save_png(&target, image.width(), image.height(), rgb_to_rgba(&image.rgb))?
        }
        StiImage::Indexed(sti) => {
            let (width, height) = sti.frames.descriptor(0).map(|d| d.geometry()).unwrap_or((0, 0));
            let rgba = sti.frames.frame(0).unwrap_or_default().to_vec();
            save_png(&target, width, height, rgba)?
        }
    }
    written.push(target);

    info!("Exported {} portrait images for {}", written.len(), name);
    Ok(written)
}

/// Puts PNG or STI files into the portraits of `name` by resolution and
/// stores the result in the override library.
///
/// Files are taken in name order. Medium PNGs fill consecutive frames
/// starting at `medium_frame`. Nothing is written unless every file applies.
pub fn portrait_set(
    game: &GameFiles,
    name: &str,
    files: &[PathBuf],
    medium_frame: usize,
    config: &CodecConfig,
) -> Result<Vec<String>, ToolError> {
    let mut source = game.open()?;
    let mut portrait = Portrait::load(&source, name)?;

    let mut files = files.to_vec();
    files.sort();
    let mut frame = medium_frame;
    for file in &files {
        let extension = file
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let slot = match extension.as_deref() {
            Some("png") => {
                let (width, height, rgba) = load_rgba(file)?;
                let slot = portrait.apply_image(width, height, rgba, frame)?;
                if slot == Slot::Medium {
                    frame += 1;
                }
                slot
            }
            Some("sti") => portrait.apply_container(decode(&read_file(file)?)?)?,
            _ => return Err(ToolError::UnsupportedFile(file.display().to_string())),
        };
        info!("{} goes to the {} portrait", file.display(), slot);
    }

    let written = portrait.save(source.overrides_mut(), config)?;
    store_patch(&game.patch, source.overrides())?;
    Ok(written)
}

/// Drops the overrides of one portrait, or of every archive portrait when
/// `name` is `None`. Returns how many entries went.
pub fn portrait_restore(game: &GameFiles, name: Option<&str>) -> Result<usize, ToolError> {
    let mut source = game.open()?;
    let removed = match name {
        Some(name) => restore(source.overrides_mut(), name),
        None => restore_all(&mut source),
    };
    if removed > 0 {
        store_patch(&game.patch, source.overrides())?;
    }
    Ok(removed)
}
