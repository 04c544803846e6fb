//! Decoding of the binary map commands into map and face cache updates.

use cf_core::byte_operations::{get_u16, get_u8};
use cf_core::constants::{
    ExtendedMapInfo, ANIM_MASK, EXT_LAYERS, FACE_IS_ANIM, MAP2_COORD_OFFSET, MAP2_COORD_SCROLL,
    MAP2_END_OF_SPACE, MAP2_LAYER_START, MAP2_LEN_SHIFT, MAP2_TYPE_CLEAR, MAP2_TYPE_DARKNESS,
    MAP2_TYPE_MASK, MAXLAYERS, MAX_VIEW,
};

use crate::animations::Animations;
use crate::error::ProtocolError;
use crate::face_cache::FaceCache;
use crate::image_store::ImageStore;
use crate::map::{AnimationSource, AnimationState, VirtualMap};

/// Animation table joined with face sizes, as the map wants it.
pub struct AnimationFrames<'a, S: ImageStore> {
    pub animations: &'a mut Animations,
    pub faces: &'a FaceCache<S>,
}

impl<S: ImageStore> AnimationSource for AnimationFrames<'_, S> {
    fn phase_count(&self, animation: u16) -> usize {
        self.animations.get(animation).map_or(0, |a| a.faces.len())
    }

    fn frame(&self, animation: u16, phase: usize) -> (u16, (u8, u8)) {
        let face = self
            .animations
            .get(animation)
            .and_then(|a| a.faces.get(phase).copied())
            .unwrap_or(0);
        (face, self.faces.face_size(u32::from(face)))
    }

    fn start(&mut self, anim: u16, speed: u8) -> Option<AnimationState> {
        self.animations.start(anim, speed)
    }

    fn tick(&mut self) {
        self.animations.tick();
    }
}

/// Clamps a map2 coordinate into the view, warning about bad ones.
fn clamp_coordinate(value: i32, axis: char) -> usize {
    if value < 0 {
        log::warn!("map2: {axis} coordinate {value} out of range, using 0");
        0
    } else if value as usize >= MAX_VIEW {
        log::warn!("map2: {axis} coordinate {value} out of range, using {}", MAX_VIEW - 1);
        MAX_VIEW - 1
    } else {
        value as usize
    }
}

/// Applies `map2` and `mapextended` payloads to the session's state.
///
/// Records are applied in stream order; on an error the rest of the message
/// is dropped while everything before it stays applied.
pub struct WireDecoder<'a, S: ImageStore> {
    map: &'a mut VirtualMap,
    faces: &'a mut FaceCache<S>,
    animations: &'a mut Animations,
    redraw: bool,
}

impl<'a, S: ImageStore> WireDecoder<'a, S> {
    pub fn new(
        map: &'a mut VirtualMap,
        faces: &'a mut FaceCache<S>,
        animations: &'a mut Animations,
    ) -> Self {
        Self {
            map,
            faces,
            animations,
            redraw: false,
        }
    }

    /// Whether the decoded messages asked for the map to be redrawn.
    pub fn redraw_requested(&self) -> bool {
        self.redraw
    }

    pub fn map2(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let len = bytes.len();
        let mut pos = 0;
        self.redraw = true;

        while pos < len {
            let mask = get_u16(bytes, pos).ok_or(ProtocolError::Truncated {
                command: "map2",
                offset: pos,
                len,
            })?;
            pos += 2;

            let x = i32::from((mask >> 10) & 0x3f) - MAP2_COORD_OFFSET;
            let y = i32::from((mask >> 4) & 0x3f) - MAP2_COORD_OFFSET;

            if mask & MAP2_COORD_SCROLL != 0 {
                log::trace!("map2: scroll {x},{y}");
                self.map.scroll(x, y);
                continue;
            }

            let x = clamp_coordinate(x, 'x');
            let y = clamp_coordinate(y, 'y');
            self.map.clear_old(x, y);
            pos = self.map2_space(bytes, pos, x, y)?;
        }
        Ok(())
    }

    /// Reads the records of one space up to its end marker.
    fn map2_space(
        &mut self,
        bytes: &[u8],
        mut pos: usize,
        x: usize,
        y: usize,
    ) -> Result<usize, ProtocolError> {
        let len = bytes.len();
        loop {
            let type_byte = get_u8(bytes, pos).ok_or(ProtocolError::MissingSentinel {
                command: "map2",
                x,
                y,
            })?;
            pos += 1;

            if type_byte == MAP2_END_OF_SPACE {
                self.map.set_check_space(x, y);
                return Ok(pos);
            }

            let data_len = usize::from(type_byte >> MAP2_LEN_SHIFT);
            let kind = type_byte & MAP2_TYPE_MASK;
            let Some(data) = bytes.get(pos..pos + data_len) else {
                return Err(ProtocolError::Truncated {
                    command: "map2",
                    offset: pos,
                    len,
                });
            };
            pos += data_len;

            match kind {
                MAP2_TYPE_CLEAR => self.map.clear_cell(x, y),
                MAP2_TYPE_DARKNESS => {
                    let &[value, ..] = data else {
                        return Err(ProtocolError::MalformedMessage {
                            command: "map2",
                            reason: format!("darkness record without value at ({x},{y})"),
                        });
                    };
                    // The server sends light, the map keeps darkness.
                    self.map.set_darkness(x, y, 255 - value);
                }
                kind if (MAP2_LAYER_START..MAP2_LAYER_START + MAXLAYERS as u8).contains(&kind) => {
                    let layer = usize::from(kind - MAP2_LAYER_START);
                    self.map2_layer(data, x, y, layer)?;
                }
                kind => {
                    log::warn!(
                        "map2: unknown record type {kind:#04x} at ({x},{y}), skipping {data_len} bytes"
                    );
                }
            }
        }
    }

    fn map2_layer(
        &mut self,
        data: &[u8],
        x: usize,
        y: usize,
        layer: usize,
    ) -> Result<(), ProtocolError> {
        let Some(face) = get_u16(data, 0) else {
            return Err(ProtocolError::MalformedMessage {
                command: "map2",
                reason: format!("layer {layer} record at ({x},{y}) is {} bytes", data.len()),
            });
        };

        if face & FACE_IS_ANIM != 0 {
            let speed = get_u8(data, 2).unwrap_or(0);
            if let Some(animation) = self.animations.get(face & ANIM_MASK) {
                for &frame in &animation.faces {
                    if frame != 0 {
                        self.faces.ensure(u32::from(frame));
                    }
                }
            }
            let mut frames = AnimationFrames {
                animations: &mut *self.animations,
                faces: &*self.faces,
            };
            self.map.set_anim_layer(x, y, layer, face, speed, &mut frames);
            if let Some(smooth) = get_u8(data, 3) {
                self.map.set_smooth(x, y, layer, smooth);
            }
        } else {
            if face != 0 {
                self.faces.ensure(u32::from(face));
            }
            let size = self.faces.face_size(u32::from(face));
            self.map.set_layer_face(x, y, layer, face, size);
            if let Some(smooth) = get_u8(data, 2) {
                self.map.set_smooth(x, y, layer, smooth);
            }
        }
        Ok(())
    }

    pub fn map_extended(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let len = bytes.len();
        let truncated = |offset| ProtocolError::Truncated {
            command: "mapextended",
            offset,
            len,
        };

        let mut pos = 0;
        let info = ExtendedMapInfo::from_bits_truncate(get_u8(bytes, pos).ok_or(truncated(pos))?);
        pos += 1;
        let mut more = info.contains(ExtendedMapInfo::HASMOREBITS);
        while more {
            // Capabilities we do not know about.
            let extra = get_u8(bytes, pos).ok_or(truncated(pos))?;
            pos += 1;
            more = ExtendedMapInfo::from_bits_truncate(extra).contains(ExtendedMapInfo::HASMOREBITS);
        }
        let entry_size = usize::from(get_u8(bytes, pos).ok_or(truncated(pos))?);
        pos += 1;

        self.redraw = !info.contains(ExtendedMapInfo::NOREDRAW);
        let has_smooth = info.contains(ExtendedMapInfo::SMOOTH);

        // A trailing partial record is ignored.
        while pos + entry_size + 2 <= len {
            let mask = get_u16(bytes, pos).ok_or(truncated(pos))?;
            pos += 2;
            let x = usize::from((mask >> 10) & 0x3f);
            let y = usize::from((mask >> 4) & 0x3f);

            for bit in (0..EXT_LAYERS).rev() {
                if mask & (1 << bit) == 0 {
                    continue;
                }
                if pos + entry_size > len {
                    return Err(ProtocolError::EntryOverrun {
                        entrysize: entry_size,
                        offset: pos,
                        len,
                    });
                }
                if has_smooth && entry_size >= 1 {
                    self.map.set_smooth(x, y, EXT_LAYERS - 1 - bit, bytes[pos]);
                }
                pos += entry_size;
            }
        }
        Ok(())
    }
}
