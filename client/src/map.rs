use cf_core::constants::{MAX_FACE_SIZE, MAX_VIEW, MAXLAYERS};
use cf_core::types::{CellLayer, MapCell, clamp_face_size};

/// Offsets of the 8 neighbours, clockwise from north.
const NEIGHBORS: [(isize, isize); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Animation counters stored on a head layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnimationState {
    pub animation: u16,
    pub phase: u8,
    pub speed: u8,
    pub left: u8,
}

/// Animation table as seen by the map.
pub trait AnimationSource {
    /// Number of phases of `animation`; 0 when it is unknown.
    fn phase_count(&self, animation: u16) -> usize;

    /// Face shown in `phase` of `animation` and its size in tiles.
    fn frame(&self, animation: u16, phase: usize) -> (u16, (u8, u8));

    /// Initial counters for an animation reference (id plus mode flags) as
    /// sent by the server, `None` for unknown animations.
    fn start(&mut self, anim: u16, speed: u8) -> Option<AnimationState>;

    /// Advances the shared counters of synchronized animations.
    fn tick(&mut self);
}

/// Part of a big face covering one visible space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BigFacePart {
    pub face: u16,
    /// Offset from this space to the head.
    pub head_offset: (u8, u8),
    /// Size of the whole face in tiles.
    pub size: (u8, u8),
}

/// A visible space the renderer has to redraw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyCell {
    pub x: usize,
    pub y: usize,
    pub resmooth: bool,
}

/// What a recenter did to the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recenter {
    None,
    /// Contents moved; holds where the pre-scroll view now starts. It may lie
    /// partly outside the buffer when the scroll is longer than the shift.
    Shifted(isize, isize),
    Reset,
}

/// Fog-of-war map: a square buffer of spaces larger than anything the server
/// can show, with the player's view placed somewhere inside it.
///
/// Coordinates taken by the public operations are view relative, i.e. the
/// ones the server sends (`0..MAX_VIEW`); `origin` translates them into the
/// buffer. The buffer keeps `MAX_FACE_SIZE` spaces left of/above the origin
/// and `MAX_VIEW` spaces right of/below it, so big face tails and neighbour
/// lookups never fall off the edge.
#[derive(Debug)]
pub struct VirtualMap {
    cells: Vec<MapCell>,
    scratch: Vec<MapCell>,
    size: usize,
    border: usize,
    origin: (usize, usize),
    view_w: usize,
    view_h: usize,
    recenters: usize,
}

impl VirtualMap {
    /// Allocates a `size` x `size` buffer for a `view_w` x `view_h` view.
    ///
    /// After a recenter at least `border` spaces are kept free between the
    /// view and the edge it was approaching.
    pub fn new(view_w: usize, view_h: usize, size: usize, border: usize) -> Self {
        let min_size = border + MAX_FACE_SIZE + MAX_VIEW;
        let size = if size < min_size {
            log::warn!("fog map size {size} too small for border {border}, using {min_size}");
            min_size
        } else {
            size
        };

        let mut map = Self {
            cells: vec![MapCell::default(); size * size],
            scratch: Vec::new(),
            size,
            border,
            origin: (0, 0),
            view_w: 0,
            view_h: 0,
            recenters: 0,
        };
        map.set_size(view_w, view_h);
        map
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn border(&self) -> usize {
        self.border
    }

    #[inline]
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    #[inline]
    pub fn view_size(&self) -> (usize, usize) {
        (self.view_w, self.view_h)
    }

    /// Number of times the buffer has been shifted since it was created.
    #[inline]
    pub fn recenter_count(&self) -> usize {
        self.recenters
    }

    #[inline]
    fn tile_index(&self, px: usize, py: usize) -> Option<usize> {
        if px < self.size && py < self.size {
            Some(px + py * self.size)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, px: usize, py: usize) -> bool {
        px < self.size && py < self.size
    }

    #[inline]
    pub fn is_visible(&self, x: usize, y: usize) -> bool {
        x < self.view_w && y < self.view_h
    }

    /// Buffer coordinates of a view relative space.
    #[inline]
    fn absolute(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        if x >= MAX_VIEW || y >= MAX_VIEW {
            return None;
        }
        let (px, py) = (self.origin.0 + x, self.origin.1 + y);
        self.contains(px, py).then_some((px, py))
    }

    /// Space at buffer coordinates.
    pub fn cell_at(&self, px: usize, py: usize) -> Option<&MapCell> {
        self.tile_index(px, py).and_then(|idx| self.cells.get(idx))
    }

    fn cell_at_mut(&mut self, px: usize, py: usize) -> Option<&mut MapCell> {
        self.tile_index(px, py)
            .and_then(move |idx| self.cells.get_mut(idx))
    }

    /// Space at view relative coordinates.
    pub fn view_cell(&self, x: usize, y: usize) -> Option<&MapCell> {
        let (px, py) = self.absolute(x, y)?;
        self.cell_at(px, py)
    }

    /// Resizes the view and resets the whole map.
    pub fn set_size(&mut self, view_w: usize, view_h: usize) {
        self.view_w = view_w.clamp(1, MAX_VIEW);
        self.view_h = view_h.clamp(1, MAX_VIEW);
        for cell in self.cells.iter_mut() {
            cell.reset();
        }
        self.origin = self.centered_origin();
        log::debug!(
            "map view {}x{}, origin {:?}",
            self.view_w,
            self.view_h,
            self.origin
        );
    }

    fn centered_origin(&self) -> (usize, usize) {
        (
            self.size / 2 - self.view_w / 2,
            self.size / 2 - self.view_h / 2,
        )
    }

    /// Forgets everything (the player changed maps) and redraws.
    pub fn new_map(&mut self) {
        for cell in self.cells.iter_mut() {
            cell.reset();
            cell.need_update = true;
        }
    }

    pub fn mark_need_update(&mut self, x: usize, y: usize) {
        if let Some((px, py)) = self.absolute(x, y) {
            if let Some(cell) = self.cell_at_mut(px, py) {
                cell.need_update = true;
            }
        }
    }

    fn mark_resmooth(&mut self, px: usize, py: usize, layer: usize) {
        let smooth = self.cell_at(px, py).map_or(0, |c| c.smooth[layer]);
        if smooth > 1 {
            self.mark_neighbors_resmooth(px, py);
        }
    }

    fn mark_neighbors_resmooth(&mut self, px: usize, py: usize) {
        for (dx, dy) in NEIGHBORS {
            let (Some(rx), Some(ry)) = (px.checked_add_signed(dx), py.checked_add_signed(dy))
            else {
                continue;
            };
            if let Some(cell) = self.cell_at_mut(rx, ry) {
                cell.need_resmooth = true;
            }
        }
    }

    /// Removes the face whose head is at `(px, py)` together with its tails.
    fn expand_clear_face(&mut self, px: usize, py: usize, w: usize, h: usize, layer: usize) {
        let face = match self.cell_at(px, py) {
            Some(cell) => cell.heads[layer].face,
            None => return,
        };

        for dx in 0..w {
            for dy in usize::from(dx == 0)..h {
                let (Some(tx), Some(ty)) = (px.checked_sub(dx), py.checked_sub(dy)) else {
                    continue;
                };
                if let Some(cell) = self.cell_at_mut(tx, ty) {
                    let tail = &mut cell.tails[layer];
                    // Tails already overwritten by another face stay.
                    if tail.face == face
                        && usize::from(tail.size_x) == dx
                        && usize::from(tail.size_y) == dy
                    {
                        *tail = Default::default();
                        cell.need_update = true;
                    }
                }
                self.mark_resmooth(tx, ty, layer);
            }
        }

        if let Some(cell) = self.cell_at_mut(px, py) {
            cell.heads[layer] = CellLayer::EMPTY_HEAD;
            cell.need_update = true;
            cell.need_resmooth = true;
        }
        self.mark_resmooth(px, py, layer);
    }

    fn expand_clear_face_from_layer(&mut self, px: usize, py: usize, layer: usize) {
        let Some(head) = self.cell_at(px, py).map(|c| c.heads[layer]) else {
            return;
        };
        if head.size_x > 0 && head.size_y > 0 {
            self.expand_clear_face(
                px,
                py,
                usize::from(head.size_x),
                usize::from(head.size_y),
                layer,
            );
        }
    }

    /// Places `face` with its head at `(px, py)`, writing tails up and to the left.
    ///
    /// Without `clear` the previous face is simply overwritten, which keeps
    /// animation counters intact; animations never change size.
    fn expand_set_face(
        &mut self,
        px: usize,
        py: usize,
        layer: usize,
        face: u16,
        size: (u8, u8),
        clear: bool,
    ) {
        if clear {
            self.expand_clear_face_from_layer(px, py, layer);
        }

        let (w, h) = clamp_face_size(u32::from(size.0), u32::from(size.1));
        let Some(cell) = self.cell_at_mut(px, py) else {
            return;
        };
        cell.heads[layer].face = face;
        cell.heads[layer].size_x = w;
        cell.heads[layer].size_y = h;
        cell.need_update = true;
        self.mark_resmooth(px, py, layer);

        for dx in 0..usize::from(w) {
            for dy in usize::from(dx == 0)..usize::from(h) {
                let (Some(tx), Some(ty)) = (px.checked_sub(dx), py.checked_sub(dy)) else {
                    continue;
                };
                if let Some(cell) = self.cell_at_mut(tx, ty) {
                    let tail = &mut cell.tails[layer];
                    tail.face = face;
                    tail.size_x = dx as u8;
                    tail.size_y = dy as u8;
                    cell.need_update = true;
                }
                self.mark_resmooth(tx, ty, layer);
            }
        }
    }

    /// Marks every space covered by the face whose head is at `(px, py)`.
    fn expand_need_update_from_layer(&mut self, px: usize, py: usize, layer: usize) {
        let Some(head) = self.cell_at(px, py).map(|c| c.heads[layer]) else {
            return;
        };
        if head.face == 0 {
            return;
        }
        for dx in 0..usize::from(head.size_x) {
            for dy in 0..usize::from(head.size_y) {
                let (Some(tx), Some(ty)) = (px.checked_sub(dx), py.checked_sub(dy)) else {
                    continue;
                };
                if let Some(cell) = self.cell_at_mut(tx, ty) {
                    cell.need_update = true;
                }
            }
        }
    }

    fn clear_all_layers(&mut self, px: usize, py: usize) {
        for layer in 0..MAXLAYERS {
            self.expand_clear_face_from_layer(px, py, layer);
        }
        if let Some(cell) = self.cell_at_mut(px, py) {
            cell.darkness = 0;
            cell.have_darkness = false;
            cell.keep_head = false;
        }
    }

    /// The server says a space is empty.
    ///
    /// Visible spaces turn into fog and keep their content; spaces outside the
    /// view only carry big face heads, which are dropped.
    pub fn clear_cell(&mut self, x: usize, y: usize) {
        let Some((px, py)) = self.absolute(x, y) else {
            return;
        };

        if self.is_visible(x, y) {
            let already_cleared = self.cell_at(px, py).is_none_or(|c| c.cleared);
            if already_cleared {
                return;
            }
            if let Some(cell) = self.cell_at_mut(px, py) {
                cell.cleared = true;
                cell.need_update = true;
            }
            for layer in 0..MAXLAYERS {
                self.expand_need_update_from_layer(px, py, layer);
            }
        } else {
            self.clear_all_layers(px, py);
        }
    }

    /// Drops fog content of a visible space before fresh data for it is applied.
    pub fn clear_old(&mut self, x: usize, y: usize) {
        if !self.is_visible(x, y) {
            return;
        }
        let Some((px, py)) = self.absolute(x, y) else {
            return;
        };
        if self.cell_at(px, py).is_some_and(|c| c.cleared) {
            self.clear_all_layers(px, py);
        }
    }

    /// Runs after all records of a space were applied; blank visible spaces become fog.
    pub fn set_check_space(&mut self, x: usize, y: usize) {
        if !self.is_visible(x, y) {
            return;
        }
        let Some((px, py)) = self.absolute(x, y) else {
            return;
        };
        let Some(cell) = self.cell_at(px, py) else {
            return;
        };
        if !cell.is_blank() || cell.cleared {
            return;
        }

        if let Some(cell) = self.cell_at_mut(px, py) {
            cell.cleared = true;
            cell.need_update = true;
        }
        for layer in 0..MAXLAYERS {
            self.expand_need_update_from_layer(px, py, layer);
        }
    }

    /// Darkness outside the view is ignored: such a space is either fog when
    /// it comes back into view or gets resent.
    pub fn set_darkness(&mut self, x: usize, y: usize, darkness: u8) {
        if !self.is_visible(x, y) {
            return;
        }
        let Some((px, py)) = self.absolute(x, y) else {
            return;
        };
        if let Some(cell) = self.cell_at_mut(px, py) {
            cell.have_darkness = true;
            if cell.darkness != darkness {
                cell.darkness = darkness;
                cell.need_update = true;
            }
        }
    }

    /// Stores the smoothing level of a layer.
    ///
    /// A change flags the 8 neighbours for resmoothing, since they draw the
    /// blended edges; the space itself is left alone. Returns whether the
    /// level changed.
    pub fn set_smooth(&mut self, x: usize, y: usize, layer: usize, smooth: u8) -> bool {
        if layer >= MAXLAYERS {
            return false;
        }
        let Some((px, py)) = self.absolute(x, y) else {
            return false;
        };
        let changed = match self.cell_at_mut(px, py) {
            Some(cell) if cell.smooth[layer] != smooth => {
                cell.smooth[layer] = smooth;
                true
            }
            _ => false,
        };
        if changed {
            self.mark_neighbors_resmooth(px, py);
        }
        changed
    }

    /// Sets (or with `face == 0` removes) the face of one layer.
    pub fn set_layer_face(&mut self, x: usize, y: usize, layer: usize, face: u16, size: (u8, u8)) {
        if layer >= MAXLAYERS {
            return;
        }
        let Some((px, py)) = self.absolute(x, y) else {
            return;
        };

        if face > 0 {
            self.expand_set_face(px, py, layer, face, size, true);
        } else {
            self.expand_clear_face_from_layer(px, py, layer);
        }

        if let Some(cell) = self.cell_at_mut(px, py) {
            cell.need_update = true;
            cell.cleared = false;
            cell.keep_head = false;
        }
    }

    /// Like [`VirtualMap::set_layer_face`] for the current frame of an animation.
    pub fn set_animated_face(
        &mut self,
        x: usize,
        y: usize,
        layer: usize,
        face: u16,
        size: (u8, u8),
        state: AnimationState,
    ) {
        if layer >= MAXLAYERS {
            return;
        }
        let Some((px, py)) = self.absolute(x, y) else {
            return;
        };

        if self.is_visible(x, y) && self.cell_at(px, py).is_some_and(|c| c.cleared) {
            self.clear_all_layers(px, py);
        }

        if face > 0 {
            self.expand_set_face(px, py, layer, face, size, true);
            if let Some(cell) = self.cell_at_mut(px, py) {
                let head = &mut cell.heads[layer];
                head.animation = state.animation;
                head.animation_phase = state.phase;
                head.animation_speed = state.speed;
                head.animation_left = state.left;
            }
        } else {
            self.expand_clear_face_from_layer(px, py, layer);
        }

        if let Some(cell) = self.cell_at_mut(px, py) {
            cell.need_update = true;
            cell.cleared = false;
            cell.keep_head = false;
        }
    }

    /// Starts animation reference `anim` on a layer.
    pub fn set_anim_layer(
        &mut self,
        x: usize,
        y: usize,
        layer: usize,
        anim: u16,
        speed: u8,
        source: &mut impl AnimationSource,
    ) {
        let (face, size, state) = match source.start(anim, speed) {
            Some(state) => {
                let (face, size) = source.frame(state.animation, usize::from(state.phase));
                (face, size, state)
            }
            None => {
                log::warn!("space ({x},{y}) layer {layer}: unknown animation {anim:#06x}");
                (0, (1, 1), AnimationState::default())
            }
        };
        self.set_animated_face(x, y, layer, face, size, state);
    }

    /// Face of the head on a visible space, 0 if none.
    pub fn head_face(&self, x: usize, y: usize, layer: usize) -> u16 {
        if !self.is_visible(x, y) || layer >= MAXLAYERS {
            return 0;
        }
        self.view_cell(x, y).map_or(0, |c| c.heads[layer].face)
    }

    /// Big face covering a visible space through one of its tails.
    ///
    /// A big face whose head is fog while this space is live is obsolete (the
    /// server would have resent the head) and gets removed here, unless the
    /// head was flagged `keep_head` when it scrolled out of view.
    pub fn face_at(&mut self, x: usize, y: usize, layer: usize) -> Option<BigFacePart> {
        if !self.is_visible(x, y) || layer >= MAXLAYERS {
            return None;
        }
        let (px, py) = self.absolute(x, y)?;
        let cell = *self.cell_at(px, py)?;
        let tail = cell.tails[layer];
        if tail.face == 0 {
            return None;
        }

        let (hx, hy) = (px + usize::from(tail.size_x), py + usize::from(tail.size_y));
        let head_cell = *self.cell_at(hx, hy)?;
        let head = head_cell.heads[layer];
        if head.face != tail.face {
            log::debug!("dropping stale tail at ({x},{y}) layer {layer}");
            if let Some(cell) = self.cell_at_mut(px, py) {
                cell.tails[layer] = Default::default();
            }
            return None;
        }

        let obsolete = !cell.cleared && head_cell.cleared && !head_cell.keep_head;
        if !obsolete {
            return Some(BigFacePart {
                face: tail.face,
                head_offset: (tail.size_x, tail.size_y),
                size: (head.size_x, head.size_y),
            });
        }

        self.expand_clear_face_from_layer(hx, hy, layer);
        None
    }

    /// Visible spaces in row order with their view coordinates.
    pub fn visible_cells(&self) -> impl Iterator<Item = (usize, usize, &MapCell)> + '_ {
        let (ox, oy) = self.origin;
        (0..self.view_h).flat_map(move |y| {
            (0..self.view_w).filter_map(move |x| {
                self.cell_at(ox + x, oy + y).map(|cell| (x, y, cell))
            })
        })
    }

    /// Collects visible spaces needing a redraw and resets their flags.
    pub fn take_dirty(&mut self) -> Vec<DirtyCell> {
        let mut dirty = Vec::new();
        let (ox, oy) = self.origin;
        for y in 0..self.view_h {
            for x in 0..self.view_w {
                let Some(cell) = self.cell_at_mut(ox + x, oy + y) else {
                    continue;
                };
                if cell.need_update || cell.need_resmooth {
                    dirty.push(DirtyCell {
                        x,
                        y,
                        resmooth: cell.need_resmooth,
                    });
                    cell.need_update = false;
                    cell.need_resmooth = false;
                }
            }
        }
        dirty
    }

    /// Moves the view by `(dx, dy)` spaces.
    pub fn scroll(&mut self, dx: i32, dy: i32) {
        let (ox, oy) = match self.recenter(dx, dy) {
            Recenter::Reset => {
                // Everything is gone, no fog to keep track of.
                for cell in self.cells.iter_mut() {
                    cell.need_update = true;
                }
                return;
            }
            Recenter::None => (self.origin.0 as isize, self.origin.1 as isize),
            Recenter::Shifted(ox, oy) => (ox, oy),
        };
        let size = self.size as isize;
        let inside = |px: isize, py: isize| -> Option<(usize, usize)> {
            (px >= 0 && px < size && py >= 0 && py < size).then_some((px as usize, py as usize))
        };

        // Map scrolling is emulated by redrawing every visible space.
        for y in 0..self.view_h as isize {
            for x in 0..self.view_w as isize {
                if let Some((px, py)) = inside(ox + x, oy + y) {
                    if let Some(cell) = self.cell_at_mut(px, py) {
                        cell.need_update = true;
                    }
                }
            }
        }

        // Recentering keeps the new origin at least MAX_FACE_SIZE from the
        // top/left edge and MAX_VIEW from the bottom/right edge.
        let nx = ox + dx as isize;
        let ny = oy + dy as isize;
        self.origin = (nx.clamp(0, size - 1) as usize, ny.clamp(0, size - 1) as usize);
        let (view_w, view_h) = (self.view_w as isize, self.view_h as isize);

        let in_new_view =
            |px: isize, py: isize| px >= nx && px < nx + view_w && py >= ny && py < ny + view_h;
        let in_old_view =
            |px: isize, py: isize| px >= ox && px < ox + view_w && py >= oy && py < oy + view_h;

        // Everything the server covered before and no longer shows turns into fog.
        let mut leaving = Vec::new();
        for py in oy.max(0)..(oy + MAX_VIEW as isize).min(size) {
            for px in ox.max(0)..(ox + MAX_VIEW as isize).min(size) {
                if !in_new_view(px, py) {
                    leaving.push((px as usize, py as usize));
                }
            }
        }
        for (px, py) in leaving {
            let keep_head = self.head_reaches_view(px, py);
            if let Some(cell) = self.cell_at_mut(px, py) {
                if cell.is_blank() {
                    continue;
                }
                cell.cleared = true;
                cell.need_update = true;
                cell.keep_head = keep_head;
            }
        }

        // Newly visible spaces show fog until the server refreshes them.
        for y in 0..view_h {
            for x in 0..view_w {
                let (px, py) = (nx + x, ny + y);
                if in_old_view(px, py) {
                    continue;
                }
                let Some((px, py)) = inside(px, py) else {
                    continue;
                };
                if let Some(cell) = self.cell_at_mut(px, py) {
                    cell.cleared = true;
                    cell.need_update = true;
                    cell.keep_head = false;
                }
            }
        }
    }

    /// Whether a big head at `(px, py)` covers a space of the current view.
    fn head_reaches_view(&self, px: usize, py: usize) -> bool {
        let Some(cell) = self.cell_at(px, py) else {
            return false;
        };
        let (vx, vy) = self.origin;
        cell.heads.iter().filter(|h| h.is_big()).any(|head| {
            let left = (px + 1).saturating_sub(usize::from(head.size_x));
            let top = (py + 1).saturating_sub(usize::from(head.size_y));
            px >= vx && left < vx + self.view_w && py >= vy && top < vy + self.view_h
        })
    }

    /// Shifts the buffer contents if moving by `(diff_x, diff_y)` would bring
    /// the view too close to an edge.
    fn recenter(&mut self, diff_x: i32, diff_y: i32) -> Recenter {
        let size = self.size as isize;
        let border = self.border as isize;
        let face = MAX_FACE_SIZE as isize;
        let view = MAX_VIEW as isize;

        let new_x = self.origin.0 as isize + diff_x as isize;
        let new_y = self.origin.1 as isize + diff_y as isize;

        let edge_shift = |new: isize| -> isize {
            if new < face {
                border + face - new
            } else if new + view > size {
                size - border - view - new
            } else {
                0
            }
        };
        // Once shifting anyway, keep the border on the other axis too.
        let border_shift = |new: isize| -> isize {
            if new < border + face {
                border + face - new
            } else if new + view + border > size {
                size - border - view - new
            } else {
                0
            }
        };

        let mut shift_x = edge_shift(new_x);
        let mut shift_y = edge_shift(new_y);
        if shift_x == 0 && shift_y == 0 {
            return Recenter::None;
        }
        if shift_x == 0 {
            shift_x = border_shift(new_x);
        }
        if shift_y == 0 {
            shift_y = border_shift(new_y);
        }

        self.recenters += 1;

        if shift_x.abs() >= size || shift_y.abs() >= size {
            log::debug!("scroll by ({diff_x},{diff_y}) exceeds the fog map, resetting it");
            for cell in self.cells.iter_mut() {
                cell.reset();
            }
            self.origin = self.centered_origin();
            return Recenter::Reset;
        }

        log::debug!(
            "recentering fog map by ({shift_x},{shift_y}), origin {:?}",
            self.origin
        );

        let shifted = (
            self.origin.0 as isize + shift_x,
            self.origin.1 as isize + shift_y,
        );

        self.scratch.clear();
        self.scratch.resize(self.cells.len(), MapCell::default());
        for dst_y in 0..size {
            let src_y = dst_y - shift_y;
            if src_y < 0 || src_y >= size {
                continue;
            }
            for dst_x in 0..size {
                let src_x = dst_x - shift_x;
                if src_x < 0 || src_x >= size {
                    continue;
                }
                let src = (src_x + src_y * size) as usize;
                let dst = (dst_x + dst_y * size) as usize;
                self.scratch[dst] = self.cells[src];
            }
        }
        std::mem::swap(&mut self.cells, &mut self.scratch);
        for cell in self.scratch.iter_mut() {
            cell.reset();
        }

        Recenter::Shifted(shifted.0, shifted.1)
    }

    /// Advances synchronized animations and the per-space animations of the
    /// live part of the view.
    pub fn animate(&mut self, source: &mut impl AnimationSource) {
        source.tick();
        let (ox, oy) = self.origin;
        for y in 0..self.view_h {
            for x in 0..self.view_w {
                let (px, py) = (ox + x, oy + y);
                let Some(cell) = self.cell_at(px, py) else {
                    continue;
                };
                // Not worth animating fog.
                if cell.cleared {
                    continue;
                }
                for layer in 0..MAXLAYERS {
                    self.animate_layer(px, py, layer, &*source);
                }
            }
        }
    }

    fn animate_layer(&mut self, px: usize, py: usize, layer: usize, source: &impl AnimationSource) {
        let Some(cell) = self.cell_at_mut(px, py) else {
            return;
        };
        let head = &mut cell.heads[layer];
        if head.animation == 0 {
            return;
        }
        let phases = source.phase_count(head.animation);
        if phases == 0 {
            return;
        }

        head.animation_left = head.animation_left.saturating_add(1);
        if head.animation_left < head.animation_speed {
            return;
        }
        head.animation_left = 0;
        head.animation_phase = head.animation_phase.wrapping_add(1);
        if usize::from(head.animation_phase) >= phases {
            head.animation_phase = 0;
        }

        let (face, size) = source.frame(head.animation, usize::from(head.animation_phase));
        if face > 0 {
            self.expand_set_face(px, py, layer, face, size, false);
        } else {
            self.expand_clear_face_from_layer(px, py, layer);
        }
    }
}
