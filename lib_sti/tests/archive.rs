mod common;

use common::sprite_sheet;
use lib_sti::archive::ArchiveError;
use lib_sti::{decode_indexed, encode_indexed, DataSource, PatchLibrary, SlfArchive};

fn packed(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut library = PatchLibrary::default();
    for (path, data) in entries {
        library.set(path, data.clone()).unwrap();
    }
    library.serialize().unwrap().unwrap()
}

#[test]
fn test_sti_through_archive_and_overrides() {
    let mut original = sprite_sheet(2);
    let original_bytes = encode_indexed(&mut original).unwrap();
    let archive = SlfArchive::from_bytes(packed(&[
        ("FACES\\33.STI", original_bytes.clone()),
        ("FACES\\34.STI", vec![0; 4]),
    ]))
    .unwrap();

    // Edit the sprite and store it as an override
    let mut edited = decode_indexed(archive.extract("FACES\\33.STI").unwrap()).unwrap();
    let replacement = common::sprite(common::SPRITE_WIDTH, common::SPRITE_HEIGHT, 4);
    edited
        .replace_frame(0, replacement.clone(), common::SPRITE_WIDTH, common::SPRITE_HEIGHT)
        .unwrap();
    let edited_bytes = encode_indexed(&mut edited).unwrap();

    let mut source = DataSource::new(Some(archive), PatchLibrary::default());
    source
        .overrides_mut()
        .set("FACES\\33.STI", edited_bytes.clone())
        .unwrap();

    let resolved = source.get("FACES\\33.STI").unwrap().unwrap();
    assert_eq!(resolved, edited_bytes.as_slice());
    let reloaded = decode_indexed(resolved).unwrap();
    assert_eq!(reloaded.frames.frame(0).unwrap(), replacement.as_slice());
    assert_eq!(reloaded.frames.frame(1), original.frames.frame(1));

    // Dropping the override falls back to the archive copy
    source.overrides_mut().remove("FACES\\33.STI");
    assert_eq!(
        source.get("FACES\\33.STI").unwrap(),
        Some(original_bytes.as_slice())
    );
    assert_eq!(source.overrides().serialize().unwrap(), None);
}

#[test]
fn test_patch_file_round_trip() {
    let bytes = packed(&[
        ("INTERFACE\\B.STI", vec![2; 10]),
        ("INTERFACE\\A.STI", vec![1; 3]),
    ]);
    let library = PatchLibrary::from_bytes(&bytes).unwrap();

    assert_eq!(library.len(), 2);
    assert_eq!(library.base_path, "Data\\");
    assert_eq!(library.get("INTERFACE\\A.STI"), Some(&[1u8; 3][..]));
    assert_eq!(library.serialize().unwrap().unwrap(), bytes);
}

#[test]
fn test_archive_reports_missing_entries() {
    let archive = SlfArchive::from_bytes(packed(&[("A.STI", vec![1])])).unwrap();
    assert!(matches!(
        archive.extract("B.STI"),
        Err(ArchiveError::EntryNotFound(path)) if path == "B.STI"
    ));
    assert_eq!(archive.header().entries, 1);
}
