//! Character portraits: each name owns a large STI16, a medium STI8 with one
//! frame per expression and a small image that is STI16 for most characters
//! and STI8 for the recruitable NPCs.

use std::collections::BTreeSet;
use std::fmt;

use lib_sti::archive::path_key;
use lib_sti::constants::SMALL_PORTRAIT_SIZES;
use lib_sti::image::decoder::{decode_indexed, decode_true_color};
use lib_sti::{
    decode, encode_indexed_with, encode_true_color, CodecConfig, DataSource, IndexedSti,
    PatchLibrary, StiImage, TrueColorSti,
};
use log::{debug, info};

use crate::filemanager::{rgba_to_rgb, ToolError};

const LARGE_PREFIX: &str = "PORTRAITS\\LARGE\\L";
const LARGE_SIZE: (u16, u16) = (180, 144);
const MEDIUM_SIZE: (u16, u16) = (90, 72);

/// NPCs whose medium portrait is stored as `A<name>` and whose small portrait
/// is indexed.
const SPECIAL_NAMES: &[&str] = &[
    "DRAZIC", "GLUMPH", "MADRAS", "MYLES", "RFS-81", "RODAN", "SAXX", "SEXUS", "SPARKLE",
    "TANTRIS", "URQ", "VI",
];

pub fn is_special(name: &str) -> bool {
    SPECIAL_NAMES.iter().any(|n| n.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortraitKeys {
    pub large: String,
    pub medium: String,
    pub small: String,
}

impl PortraitKeys {
    pub fn for_name(name: &str) -> Self {
        let name = name.to_ascii_uppercase();
        let medium_prefix = if is_special(&name) { 'A' } else { 'M' };
        Self {
            large: format!("{}{}.STI", LARGE_PREFIX, name),
            medium: format!("PORTRAITS\\MEDIUM\\{}{}.STI", medium_prefix, name),
            small: format!("PORTRAITS\\SMALL\\S{}.STI", name),
        }
    }

    /// Every key an override for `name` may live under, both medium
    /// spellings included.
    pub fn all(name: &str) -> [String; 4] {
        let name = name.to_ascii_uppercase();
        [
            format!("{}{}.STI", LARGE_PREFIX, name),
            format!("PORTRAITS\\MEDIUM\\M{}.STI", name),
            format!("PORTRAITS\\MEDIUM\\A{}.STI", name),
            format!("PORTRAITS\\SMALL\\S{}.STI", name),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Large,
    Medium,
    Small,
}

impl Slot {
    /// The slot an image of this resolution belongs in.
    pub fn for_size(width: u16, height: u16) -> Option<Self> {
        match (width, height) {
            LARGE_SIZE => Some(Slot::Large),
            MEDIUM_SIZE => Some(Slot::Medium),
            size if SMALL_PORTRAIT_SIZES.contains(&size) => Some(Slot::Small),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::Large => "large",
            Slot::Medium => "medium",
            Slot::Small => "small",
        })
    }
}

fn name_from_key(key: &str) -> Option<String> {
    let key = path_key(key);
    let name = key.strip_prefix(LARGE_PREFIX)?.strip_suffix(".STI")?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Names with a large portrait in the archive or the overrides, sorted.
pub fn portrait_names(source: &DataSource) -> BTreeSet<String> {
    let archived = source
        .archive()
        .into_iter()
        .flat_map(|archive| archive.entries().iter().map(|e| e.path.as_str()));
    archived
        .chain(source.overrides().paths())
        .filter_map(name_from_key)
        .collect()
}

pub fn is_modified(source: &DataSource, name: &str) -> bool {
    PortraitKeys::all(name)
        .iter()
        .any(|key| source.is_overridden(key))
}

/// One character's three portraits, loaded through a [`DataSource`].
#[derive(Debug)]
pub struct Portrait {
    pub keys: PortraitKeys,
    pub large: TrueColorSti,
    pub medium: IndexedSti,
    pub small: StiImage,
    modified: [bool; 3],
}

fn fetch<'a>(source: &'a DataSource, key: &str) -> Result<&'a [u8], ToolError> {
    source
        .get(key)?
        .ok_or_else(|| ToolError::MissingEntry(key.to_string()))
}

impl Portrait {
    pub fn load(source: &DataSource, name: &str) -> Result<Self, ToolError> {
        let keys = PortraitKeys::for_name(name);
        let large = decode_true_color(fetch(source, &keys.large)?)?;
        let medium = decode_indexed(fetch(source, &keys.medium)?)?;
        let small = decode(fetch(source, &keys.small)?)?;
        debug!(
            "Loaded portraits for {}: {} medium frames",
            name,
            medium.frame_count()
        );
        Ok(Self {
            keys,
            large,
            medium,
            small,
            modified: [false; 3],
        })
    }

    pub fn is_modified(&self, slot: Slot) -> bool {
        self.modified[slot as usize]
    }

    /// Puts an RGBA image into the slot its resolution selects. Medium
    /// images replace frame `medium_frame`.
    pub fn apply_image(
        &mut self,
        width: u16,
        height: u16,
        rgba: Vec<u8>,
        medium_frame: usize,
    ) -> Result<Slot, ToolError> {
        let slot = Slot::for_size(width, height).ok_or(ToolError::Resolution(width, height))?;
        match slot {
            Slot::Large => self.large.replace_image(rgba_to_rgb(&rgba), width, height)?,
            Slot::Medium => self.medium.replace_frame(medium_frame, rgba, width, height)?,
            Slot::Small => match &mut self.small {
                StiImage::TrueColor(image) => image.replace_image(rgba_to_rgb(&rgba), width, height)?,
                StiImage::Indexed(sti) => sti.replace_frame(0, rgba, width, height)?,
            },
        }
        self.modified[slot as usize] = true;
        Ok(slot)
    }

    /// Replaces a whole slot with a decoded container, picked by resolution.
    pub fn apply_container(&mut self, image: StiImage) -> Result<Slot, ToolError> {
        let (width, height) = match &image {
            StiImage::TrueColor(image) => (image.width(), image.height()),
            StiImage::Indexed(sti) => sti
                .frames
                .descriptor(0)
                .map(|d| d.geometry())
                .unwrap_or((0, 0)),
        };
        let slot = match (Slot::for_size(width, height), image) {
            (Some(Slot::Large), StiImage::TrueColor(image)) => {
                self.large = image;
                Slot::Large
            }
            (Some(Slot::Medium), StiImage::Indexed(sti)) => {
                self.medium = sti;
                Slot::Medium
            }
            (Some(Slot::Small), image) => {
                self.small = image;
                Slot::Small
            }
            _ => return Err(ToolError::Resolution(width, height)),
        };
        self.modified[slot as usize] = true;
        Ok(slot)
    }

    /// Encodes every modified slot into `overrides` and returns the keys
    /// written.
    pub fn save(
        &mut self,
        overrides: &mut PatchLibrary,
        config: &CodecConfig,
    ) -> Result<Vec<String>, ToolError> {
        let mut written = Vec::new();
        if self.is_modified(Slot::Large) {
            overrides.set(&self.keys.large, encode_true_color(&self.large)?)?;
            written.push(self.keys.large.clone());
        }
        if self.is_modified(Slot::Medium) {
            overrides.set(&self.keys.medium, encode_indexed_with(&mut self.medium, config)?)?;
            written.push(self.keys.medium.clone());
        }
        if self.is_modified(Slot::Small) {
            let bytes = match &mut self.small {
                StiImage::TrueColor(image) => encode_true_color(image)?,
                StiImage::Indexed(sti) => encode_indexed_with(sti, config)?,
            };
            overrides.set(&self.keys.small, bytes)?;
            written.push(self.keys.small.clone());
        }
        self.modified = [false; 3];
        info!("Stored {} portrait overrides", written.len());
        Ok(written)
    }
}

/// Drops every override of `name`. Returns how many were removed.
pub fn restore(overrides: &mut PatchLibrary, name: &str) -> usize {
    PortraitKeys::all(name)
        .iter()
        .filter(|key| overrides.remove(key).is_some())
        .count()
}

/// Drops every override that shadows an archive portrait.
pub fn restore_all(source: &mut DataSource) -> usize {
    let shadowing: Vec<String> = source
        .overrides()
        .paths()
        .filter(|path| path_key(path).starts_with("PORTRAITS\\"))
        .filter(|path| source.archive().and_then(|a| a.find(path)).is_some())
        .map(str::to_string)
        .collect();
    for path in &shadowing {
        source.overrides_mut().remove(path);
    }
    shadowing.len()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lib_sti::image::atlas::FrameSet;
    use lib_sti::{encode_indexed, Palette, SlfArchive};

    fn face(width: u16, height: u16, shade: u8) -> Vec<u8> {
        (0..width as usize * height as usize)
            .flat_map(|i| [shade, (i % 40) as u8 + 10, 60, 255])
            .collect()
    }

    fn medium(frames: usize) -> Vec<u8> {
        let frames = FrameSet::from_frames(
            (0..frames).map(|i| (90, 72, face(90, 72, 20 + i as u8 * 10))),
        )
        .unwrap();
        encode_indexed(&mut IndexedSti::new(Palette::default(), frames)).unwrap()
    }

    fn small_indexed() -> Vec<u8> {
        let frames = FrameSet::from_frames(vec![(45, 36, face(45, 36, 200))]).unwrap();
        encode_indexed(&mut IndexedSti::new(Palette::default(), frames)).unwrap()
    }

    fn true_color(width: u16, height: u16) -> Vec<u8> {
        let rgb = vec![8u8; width as usize * height as usize * 3];
        encode_true_color(&TrueColorSti::new(width, height, rgb)).unwrap()
    }

    /// An archive holding one ordinary character and one special NPC.
    pub(crate) fn game_archive_bytes() -> Vec<u8> {
        let mut packed = PatchLibrary::default();
        for (key, data) in [
            ("PORTRAITS\\LARGE\\LRFM.STI", true_color(180, 144)),
            ("PORTRAITS\\MEDIUM\\MRFM.STI", medium(3)),
            ("PORTRAITS\\SMALL\\SRFM.STI", true_color(46, 36)),
            ("PORTRAITS\\LARGE\\LVI.STI", true_color(180, 144)),
            ("PORTRAITS\\MEDIUM\\AVI.STI", medium(2)),
            ("PORTRAITS\\SMALL\\SVI.STI", small_indexed()),
            ("INTERFACE\\LOGO.STI", vec![1, 2, 3]),
        ] {
            packed.set(key, data).unwrap();
        }
        packed.serialize().unwrap().unwrap()
    }

    fn game_archive() -> SlfArchive {
        SlfArchive::from_bytes(game_archive_bytes()).unwrap()
    }

    #[test]
    fn test_keys_for_ordinary_and_special_names() {
        let keys = PortraitKeys::for_name("rfm");
        assert_eq!(keys.large, "PORTRAITS\\LARGE\\LRFM.STI");
        assert_eq!(keys.medium, "PORTRAITS\\MEDIUM\\MRFM.STI");
        assert_eq!(keys.small, "PORTRAITS\\SMALL\\SRFM.STI");

        let keys = PortraitKeys::for_name("RFS-81");
        assert_eq!(keys.medium, "PORTRAITS\\MEDIUM\\ARFS-81.STI");
        assert_eq!(PortraitKeys::all("VI")[2], "PORTRAITS\\MEDIUM\\AVI.STI");
    }

    #[test]
    fn test_slot_by_resolution() {
        assert_eq!(Slot::for_size(180, 144), Some(Slot::Large));
        assert_eq!(Slot::for_size(90, 72), Some(Slot::Medium));
        assert_eq!(Slot::for_size(45, 36), Some(Slot::Small));
        assert_eq!(Slot::for_size(46, 36), Some(Slot::Small));
        assert_eq!(Slot::for_size(47, 36), None);
    }

    #[test]
    fn test_names_come_from_archive_and_overrides() {
        let mut overrides = PatchLibrary::default();
        overrides
            .set("Portraits\\Large\\LNEWGUY.sti", true_color(180, 144))
            .unwrap();
        let source = DataSource::new(Some(game_archive()), overrides);

        let names: Vec<String> = portrait_names(&source).into_iter().collect();
        assert_eq!(names, vec!["NEWGUY", "RFM", "VI"]);
        assert!(is_modified(&source, "newguy"));
        assert!(!is_modified(&source, "RFM"));
    }

    #[test]
    fn test_special_small_portrait_is_indexed() {
        let source = DataSource::new(Some(game_archive()), PatchLibrary::default());
        let vi = Portrait::load(&source, "VI").unwrap();
        assert!(matches!(vi.small, StiImage::Indexed(_)));
        assert_eq!(vi.medium.frame_count(), 2);

        let rfm = Portrait::load(&source, "RFM").unwrap();
        assert!(matches!(rfm.small, StiImage::TrueColor(_)));
    }

    #[test]
    fn test_images_are_routed_and_saved_as_overrides() {
        let mut source = DataSource::new(Some(game_archive()), PatchLibrary::default());
        let mut portrait = Portrait::load(&source, "RFM").unwrap();

        assert_eq!(
            portrait.apply_image(90, 72, face(90, 72, 99), 2).unwrap(),
            Slot::Medium
        );
        assert_eq!(
            portrait.apply_image(45, 36, face(45, 36, 99), 0).unwrap(),
            Slot::Small
        );
        assert!(matches!(
            portrait.apply_image(100, 100, face(100, 100, 1), 0),
            Err(ToolError::Resolution(100, 100))
        ));

        let written = portrait
            .save(source.overrides_mut(), &CodecConfig::default())
            .unwrap();
        assert_eq!(
            written,
            vec!["PORTRAITS\\MEDIUM\\MRFM.STI", "PORTRAITS\\SMALL\\SRFM.STI"]
        );

        let reloaded = Portrait::load(&source, "RFM").unwrap();
        assert_eq!(reloaded.medium.frames.frame(2).unwrap(), face(90, 72, 99).as_slice());
        let StiImage::TrueColor(small) = &reloaded.small else {
            panic!("small portrait changed flavor");
        };
        assert_eq!((small.width(), small.height()), (45, 36));
    }

    #[test]
    fn test_containers_replace_whole_slots() {
        let source = DataSource::new(Some(game_archive()), PatchLibrary::default());
        let mut portrait = Portrait::load(&source, "VI").unwrap();

        let large = decode(&true_color(180, 144)).unwrap();
        assert_eq!(portrait.apply_container(large).unwrap(), Slot::Large);
        let medium = decode(&medium(4)).unwrap();
        assert_eq!(portrait.apply_container(medium).unwrap(), Slot::Medium);
        assert_eq!(portrait.medium.frame_count(), 4);

        let wrong = decode(&true_color(90, 72)).unwrap();
        assert!(matches!(
            portrait.apply_container(wrong),
            Err(ToolError::Resolution(90, 72))
        ));
        assert!(!portrait.is_modified(Slot::Small));
    }

    #[test]
    fn test_restore_removes_every_key() {
        let mut overrides = PatchLibrary::default();
        for key in PortraitKeys::all("VI") {
            overrides.set(&key, vec![1]).unwrap();
        }
        overrides.set("PORTRAITS\\LARGE\\LRFM.STI", vec![1]).unwrap();

        assert_eq!(restore(&mut overrides, "vi"), 4);
        assert_eq!(overrides.len(), 1);
        assert_eq!(restore(&mut overrides, "vi"), 0);
    }

    #[test]
    fn test_restore_all_keeps_new_files() {
        let mut overrides = PatchLibrary::default();
        overrides.set("PORTRAITS\\LARGE\\LRFM.STI", vec![1]).unwrap();
        overrides.set("PORTRAITS\\LARGE\\LNEWGUY.STI", vec![2]).unwrap();
        let mut source = DataSource::new(Some(game_archive()), overrides);

        assert_eq!(restore_all(&mut source), 1);
        assert_eq!(
            source.overrides().paths().collect::<Vec<_>>(),
            vec!["PORTRAITS\\LARGE\\LNEWGUY.STI"]
        );
    }
}
