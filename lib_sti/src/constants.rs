pub const FORMAT_NAME: &str = "Sirtech STCI image";
pub const FILE_EXT: &str = "sti";

/// Palette slots, including the two reserved ones.
pub const PALETTE_SIZE: usize = 256;
/// Slots available to image content once slot 0 and slot 255 are set aside.
pub const CONTENT_COLORS: usize = PALETTE_SIZE - 2;
pub const ALPHA_SLOT: usize = 0;
pub const END_SLOT: usize = PALETTE_SIZE - 1;

/// Opaque black is read as transparent by the engine, so it is stored as this.
pub const NEAR_BLACK: [u8; 3] = [1, 1, 1];
/// Fills unused content slots.
pub const FILLER_COLOR: [u8; 3] = [1, 1, 1];

/// Longest run a single ETRLE control byte can describe.
pub const MAX_RUN: usize = 0x7F;
pub const ALPHA_RUN_FLAG: u8 = 0x80;
pub const ROW_TERMINATOR: u8 = 0x00;

/// Palette entries that must match before a freshly built palette is discarded.
pub const STABLE_PALETTE_MATCHES: usize = 254;

/// Small portraits come in two widths and both are accepted on replacement.
pub const SMALL_PORTRAIT_SIZES: &[(u16, u16)] = &[(45, 36), (46, 36)];
