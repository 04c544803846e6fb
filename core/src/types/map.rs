use crate::constants::{MAX_FACE_SIZE, MAXLAYERS};

/// One drawing layer of a map space.
///
/// For heads, `size_x`/`size_y` hold the face size in tiles (1x1 when empty).
/// For tails, they hold the offset from the covered space to its head, which
/// lies at `(x + size_x, y + size_y)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellLayer {
    pub face: u16,
    pub size_x: u8,
    pub size_y: u8,

    // animation state, heads only
    pub animation: u16,
    pub animation_speed: u8,
    pub animation_left: u8,
    pub animation_phase: u8,
}

impl CellLayer {
    /// An empty head: no face, 1x1.
    pub const EMPTY_HEAD: CellLayer = CellLayer {
        face: 0,
        size_x: 1,
        size_y: 1,
        animation: 0,
        animation_speed: 0,
        animation_left: 0,
        animation_phase: 0,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.face == 0
    }

    /// True for heads covering more than one map space.
    #[inline]
    pub fn is_big(&self) -> bool {
        self.face != 0 && (self.size_x > 1 || self.size_y > 1)
    }

    pub fn clear_animation(&mut self) {
        self.animation = 0;
        self.animation_speed = 0;
        self.animation_left = 0;
        self.animation_phase = 0;
    }
}

/// Client-side state of a single space of the virtual map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapCell {
    pub heads: [CellLayer; MAXLAYERS],
    pub tails: [CellLayer; MAXLAYERS],
    pub smooth: [u8; MAXLAYERS],
    pub darkness: u8,
    pub have_darkness: bool,

    /// Fog of war: the space is no longer refreshed by the server but its
    /// content is kept for display.
    pub cleared: bool,
    /// A big head on this space still covers visible spaces, so fog handling
    /// must not drop it.
    pub keep_head: bool,
    pub need_update: bool,
    pub need_resmooth: bool,
}

impl Default for MapCell {
    fn default() -> Self {
        Self {
            heads: [CellLayer::EMPTY_HEAD; MAXLAYERS],
            tails: [CellLayer::default(); MAXLAYERS],
            smooth: [0; MAXLAYERS],
            darkness: 0,
            have_darkness: false,
            cleared: false,
            keep_head: false,
            need_update: false,
            need_resmooth: false,
        }
    }
}

impl MapCell {
    /// Resets the cell to the freshly allocated state.
    pub fn reset(&mut self) {
        *self = MapCell::default();
    }

    /// No face on any layer and no darkness information.
    pub fn is_blank(&self) -> bool {
        !self.have_darkness
            && self
                .heads
                .iter()
                .zip(self.tails.iter())
                .all(|(head, tail)| head.is_empty() && tail.is_empty())
    }

    /// Layers may only smooth over empty upper layers or layers carrying smoothing info.
    pub fn can_smooth(&self, layer: usize) -> bool {
        (self.heads[layer].face == 0 && layer > 0) || self.smooth[layer] != 0
    }
}

/// Clamps a face size in tiles into `1..=MAX_FACE_SIZE`.
#[inline]
pub fn clamp_face_size(w: u32, h: u32) -> (u8, u8) {
    let clamp = |v: u32| v.clamp(1, MAX_FACE_SIZE as u32) as u8;
    (clamp(w), clamp(h))
}
