mod common;

use common::{
    distinct_colors, game_palette, gradient, sprite, sprite_sheet, SPRITE_HEIGHT, SPRITE_WIDTH,
};
use lib_sti::image::atlas::{AtlasError, FrameSet};
use lib_sti::image::decoder::DecodeError;
use lib_sti::{
    decode, decode_indexed, decode_true_color, encode_indexed, encode_true_color, IndexedSti,
    StiImage, TrueColorSti,
};

#[test]
fn test_encode_decode_few_colors_is_lossless() {
    let mut sti = sprite_sheet(3);
    let original: Vec<Vec<u8>> = sti.frames.buffers().to_vec();

    let encoded = encode_indexed(&mut sti).unwrap();
    let decoded = decode_indexed(&encoded).unwrap();

    assert!(decoded.truncated.is_none());
    assert_eq!(decoded.frame_count(), 3);
    assert_eq!(decoded.frames.buffers(), original.as_slice());
    assert_eq!((decoded.header.width, decoded.header.height), (SPRITE_WIDTH, SPRITE_HEIGHT));
}

#[test]
fn test_reencode_is_byte_identical() {
    let mut sti = sprite_sheet(4);
    let first = encode_indexed(&mut sti).unwrap();

    let mut reloaded = decode_indexed(&first).unwrap();
    let second = encode_indexed(&mut reloaded).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_layout_sizes_and_offsets() {
    let mut sti = sprite_sheet(5);
    let encoded = encode_indexed(&mut sti).unwrap();

    let payload = sti.header.compressed_size as usize;
    assert_eq!(encoded.len(), 64 + 768 + 5 * 16 + payload);
    assert_eq!(
        sti.header.uncompressed_size,
        SPRITE_WIDTH as u32 * SPRITE_HEIGHT as u32
    );

    let mut expected_offset = 0;
    for descriptor in sti.frames.descriptors() {
        assert_eq!(descriptor.offset, expected_offset);
        expected_offset += descriptor.size;
    }
    assert_eq!(expected_offset as usize, payload);
}

#[test]
fn test_reserved_palette_slots_are_carried_forward() {
    let frames = FrameSet::from_frames(vec![(4, 4, sprite(4, 4, 1))]).unwrap();
    let mut sti = IndexedSti::new(game_palette(), frames);
    let encoded = encode_indexed(&mut sti).unwrap();

    let decoded = decode_indexed(&encoded).unwrap();
    assert_eq!(decoded.palette.get(0), [255, 0, 255]);
    assert_eq!(decoded.palette.get(255), [0, 255, 0]);

    // Transparent pixels come back as the alpha color
    assert_eq!(&decoded.frames.frame(0).unwrap()[..4], &[255, 0, 255, 0]);
}

#[test]
fn test_many_colors_are_reduced() {
    let atlas = gradient(40, 40);
    assert!(distinct_colors(&atlas) > 254);

    let frames = FrameSet::from_frames(vec![(40, 40, atlas.clone())]).unwrap();
    let mut sti = IndexedSti::new(game_palette(), frames);
    let encoded = encode_indexed(&mut sti).unwrap();
    let decoded = decode_indexed(&encoded).unwrap();

    let content = &decoded.palette.colors()[1..255];
    let frame = decoded.frames.frame(0).unwrap();
    assert_eq!(frame.len(), atlas.len());
    for (got, want) in frame.chunks_exact(4).zip(atlas.chunks_exact(4)) {
        assert_eq!(got[3], want[3]);
        if got[3] == 255 {
            assert!(content.contains(&[got[0], got[1], got[2]]));
        }
    }
    assert!(distinct_colors(frame) <= 254);
}

#[test]
fn test_truncated_payload_decodes_full_frames() {
    let mut sti = sprite_sheet(2);
    let mut encoded = encode_indexed(&mut sti).unwrap();
    encoded.truncate(encoded.len() - 12);

    let decoded = decode_indexed(&encoded).unwrap();
    let truncated = decoded.truncated.clone().unwrap();
    assert_eq!(truncated.frame, 1);

    for frame in decoded.frames.buffers() {
        assert_eq!(frame.len(), SPRITE_WIDTH as usize * SPRITE_HEIGHT as usize * 4);
    }
    assert_eq!(decoded.frames.frame(0), sti.frames.frame(0));
    let last = decoded.frames.frame(1).unwrap();
    assert_eq!(&last[last.len() - 4..], &[0, 0, 0, 0]);
}

#[test]
fn test_replace_frame_then_encode() {
    let mut sti = sprite_sheet(3);
    let replacement = sprite(SPRITE_WIDTH, SPRITE_HEIGHT, 5);
    sti.replace_frame(1, replacement.clone(), SPRITE_WIDTH, SPRITE_HEIGHT)
        .unwrap();

    let encoded = encode_indexed(&mut sti).unwrap();
    let decoded = decode_indexed(&encoded).unwrap();
    assert_eq!(decoded.frames.frame(1).unwrap(), replacement.as_slice());
}

#[test]
fn test_edited_color_survives_reencode() {
    let row: Vec<u8> = (0..10u8).flat_map(|i| [10 * i + 5, 3 * i + 1, 100, 255]).collect();
    let frames = FrameSet::from_frames(vec![(10, 1, row)]).unwrap();
    let mut sti = IndexedSti::new(game_palette(), frames);
    let mut reloaded = decode_indexed(&encode_indexed(&mut sti).unwrap()).unwrap();

    let mut edited = reloaded.frames.frame(0).unwrap().to_vec();
    edited[..4].copy_from_slice(&[250, 250, 10, 255]);
    reloaded.replace_frame(0, edited.clone(), 10, 1).unwrap();
    let decoded = decode_indexed(&encode_indexed(&mut reloaded).unwrap()).unwrap();

    assert_eq!(decoded.frames.frame(0).unwrap(), edited.as_slice());
    assert_eq!(decoded.palette.end_sentinel(), [0, 255, 0]);
}

#[test]
fn test_resize_is_rejected_unless_allowed() {
    let mut sti = sprite_sheet(2);
    let result = sti.replace_frame(0, sprite(9, 6, 0), 9, 6);
    assert!(matches!(result, Err(AtlasError::UnsupportedLayout { index: 0, .. })));

    let frames = FrameSet::from_frames(vec![(45, 36, sprite(45, 36, 0))]).unwrap();
    let mut portrait = IndexedSti::new(game_palette(), frames);
    portrait.replace_frame(0, sprite(46, 36, 1), 46, 36).unwrap();
    assert_eq!((portrait.header.width, portrait.header.height), (46, 36));

    let encoded = encode_indexed(&mut portrait).unwrap();
    let decoded = decode_indexed(&encoded).unwrap();
    assert_eq!(decoded.frames.descriptor(0).unwrap().geometry(), (46, 36));
    assert_eq!(decoded.header.width, 46);
}

#[test]
fn test_opaque_black_is_stored_as_near_black() {
    let mut rgba = vec![0, 0, 0, 255];
    rgba.extend([0, 0, 0, 0]);
    let frames = FrameSet::from_frames(vec![(2, 1, rgba)]).unwrap();
    let mut sti = IndexedSti::new(game_palette(), frames);

    let encoded = encode_indexed(&mut sti).unwrap();
    let decoded = decode_indexed(&encoded).unwrap();
    let frame = decoded.frames.frame(0).unwrap();
    assert_eq!(&frame[..4], &[1, 1, 1, 255]);
    assert_eq!(frame[7], 0);
}

#[test]
fn test_true_color_round_trip() {
    let rgb: Vec<u8> = (0..6 * 4 * 3).map(|i| (i * 11) as u8).collect();
    let image = TrueColorSti::new(6, 4, rgb.clone());
    let encoded = encode_true_color(&image).unwrap();
    assert_eq!(encoded.len(), 64 + 6 * 4 * 2);

    let decoded = decode_true_color(&encoded).unwrap();
    let masked: Vec<u8> = rgb
        .chunks_exact(3)
        .flat_map(|p| [p[0] & 0xF8, p[1] & 0xFC, p[2] & 0xF8])
        .collect();
    assert_eq!(decoded.rgb, masked);
}

#[test]
fn test_decode_dispatches_on_flags() {
    let mut sti = sprite_sheet(1);
    let indexed = encode_indexed(&mut sti).unwrap();
    assert!(matches!(decode(&indexed), Ok(StiImage::Indexed(_))));

    let true_color = encode_true_color(&TrueColorSti::new(1, 1, vec![1, 2, 3])).unwrap();
    assert!(matches!(decode(&true_color), Ok(StiImage::TrueColor(_))));

    assert!(matches!(
        decode_true_color(&indexed),
        Err(DecodeError::UnsupportedLayout(_))
    ));
    assert!(matches!(decode(&indexed[..40]), Err(DecodeError::TooShort { .. })));
}
