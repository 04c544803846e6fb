//! Constants module - protocol and map constants shared by the client crates

use bitflags::bitflags;

// =============================================================================
// Map geometry
// =============================================================================

/// Maximum size of view area a server could support.
pub const MAX_VIEW: usize = 64;

/// Default view size before the server answers the `mapsize` setup request.
pub const DEFAULT_VIEW_X: usize = 11;
pub const DEFAULT_VIEW_Y: usize = 11;

/// Maximum size of a big face image in tiles. Larger faces are clipped.
pub const MAX_FACE_SIZE: usize = 16;

/// Default edge length of the (square) virtual fog-of-war map.
pub const FOG_MAP_SIZE: usize = 256;

/// After recentering: minimum distance of the view area to the virtual map border.
pub const FOG_BORDER_MIN: usize = 64;

/// Pixel size of one map tile; used to derive big face sizes from image sizes.
pub const TILE_PIXELS: u32 = 32;

// =============================================================================
// map2 command
// =============================================================================

/// Number of drawing layers per map space in the map2 protocol.
pub const MAXLAYERS: usize = 10;

/// Coordinates in map2 masks are biased by this value so that scroll deltas can be negative.
pub const MAP2_COORD_OFFSET: i32 = 15;

/// Mask bit marking a scroll instruction instead of a map space.
pub const MAP2_COORD_SCROLL: u16 = 0x1;

/// Terminates the record list of a single space.
pub const MAP2_END_OF_SPACE: u8 = 255;

pub const MAP2_TYPE_CLEAR: u8 = 0x0;
pub const MAP2_TYPE_DARKNESS: u8 = 0x1;
pub const MAP2_LAYER_START: u8 = 0x10;

/// Low bits of a type byte select the record kind, the top 3 bits carry its payload length.
pub const MAP2_TYPE_MASK: u8 = 0x1f;
pub const MAP2_LEN_SHIFT: u8 = 5;

// =============================================================================
// Faces and animations
// =============================================================================

/// Set on a layer's face id when it references an animation instead of a face.
pub const FACE_IS_ANIM: u16 = 1 << 15;

pub const ANIM_MASK: u16 = 0x1fff;
pub const ANIM_FLAGS_MASK: u16 = 0x6000;
pub const ANIM_RANDOM: u16 = 1 << 13;
pub const ANIM_SYNC: u16 = 2 << 13;

/// Highest animation number the server may send.
pub const MAXANIM: usize = 2000;

/// Bucket count of the face name index. Must be a power of two.
pub const IMAGE_HASH: usize = 8192;

// =============================================================================
// mapextended command
// =============================================================================

/// Layers addressed by the cell mask of a mapextended record.
pub const EXT_LAYERS: usize = 3;

bitflags! {
    /// Capability bits of the first mapextended mask byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExtendedMapInfo: u8 {
        const NOREDRAW = 0x01;
        const SMOOTH = 0x02;
        const HASMOREBITS = 0x80;
    }
}

// =============================================================================
// Network
// =============================================================================

pub const DEFAULT_SERVER_PORT: u16 = 13327;

/// Protocol versions announced with the `version` command.
pub const VERSION_CS: u32 = 1023;
pub const VERSION_SC: u32 = 1027;

/// Largest payload a 2-byte length prefix can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_hash_is_power_of_two() {
        assert!(IMAGE_HASH.is_power_of_two());
    }

    #[test]
    fn default_fog_map_leaves_room_for_recentering() {
        assert!(FOG_BORDER_MIN + MAX_FACE_SIZE + MAX_VIEW + FOG_BORDER_MIN <= FOG_MAP_SIZE);
    }

    #[test]
    fn extended_map_info_ignores_unknown_bits() {
        let info = ExtendedMapInfo::from_bits_truncate(0x83);
        assert!(info.contains(ExtendedMapInfo::NOREDRAW));
        assert!(info.contains(ExtendedMapInfo::SMOOTH));
        assert!(info.contains(ExtendedMapInfo::HASMOREBITS));
        assert_eq!(ExtendedMapInfo::from_bits_truncate(0x04), ExtendedMapInfo::empty());
    }
}
