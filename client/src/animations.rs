use cf_core::constants::{ANIM_FLAGS_MASK, ANIM_MASK, ANIM_RANDOM, ANIM_SYNC, MAXANIM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ProtocolError;
use crate::map::AnimationState;

/// Animation registered by the server with `anim`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Animation {
    pub flags: u16,
    pub faces: Vec<u16>,

    // Shared counters for synchronized animations.
    pub speed: u8,
    pub speed_left: u8,
    pub phase: u8,
}

/// All animations of the current connection, indexed by id.
#[derive(Debug)]
pub struct Animations {
    table: Vec<Animation>,
    rng: StdRng,
}

impl Default for Animations {
    fn default() -> Self {
        Self::new()
    }
}

impl Animations {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Table whose random phases are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            table: vec![Animation::default(); MAXANIM],
            rng,
        }
    }

    pub fn get(&self, id: u16) -> Option<&Animation> {
        self.table.get(usize::from(id)).filter(|a| !a.faces.is_empty())
    }

    /// Registers (or replaces) animation `id`.
    pub fn define(&mut self, id: u16, flags: u16, faces: Vec<u16>) -> Result<(), ProtocolError> {
        if usize::from(id) >= MAXANIM {
            return Err(ProtocolError::MalformedMessage {
                command: "anim",
                reason: format!("animation number {id} out of range"),
            });
        }
        if faces.is_empty() {
            return Err(ProtocolError::MalformedMessage {
                command: "anim",
                reason: format!("animation {id} has no faces"),
            });
        }

        log::debug!("received animation {id}, {} faces", faces.len());
        self.table[usize::from(id)] = Animation {
            flags,
            faces,
            ..Default::default()
        };
        Ok(())
    }

    pub fn tick(&mut self) {
        for anim in self.table.iter_mut().filter(|a| a.speed > 0) {
            anim.speed_left = anim.speed_left.saturating_add(1);
            if anim.speed_left >= anim.speed {
                anim.speed_left = 0;
                anim.phase = anim.phase.wrapping_add(1);
                if usize::from(anim.phase) >= anim.faces.len() {
                    anim.phase = 0;
                }
            }
        }
    }

    /// Counters for a space starting animation reference `anim` (id plus
    /// mode bits, as found in a map record).
    ///
    /// Random animations start at a random phase; synchronized ones take the
    /// shared phase and set the shared speed. Animations without a mode start
    /// at their first phase.
    pub fn start(&mut self, anim: u16, speed: u8) -> Option<AnimationState> {
        let id = anim & ANIM_MASK;
        let mode = anim & ANIM_FLAGS_MASK;
        let entry = self.table.get_mut(usize::from(id))?;
        if entry.faces.is_empty() {
            return None;
        }

        let (phase, left) = if mode == ANIM_RANDOM {
            let phase = self.rng.gen_range(0..entry.faces.len());
            let left = if speed > 0 {
                self.rng.gen_range(0..speed)
            } else {
                0
            };
            (phase as u8, left)
        } else if mode == ANIM_SYNC {
            entry.speed = speed;
            (entry.phase, entry.speed_left)
        } else {
            (0, 0)
        };

        Some(AnimationState {
            animation: id,
            phase,
            speed,
            left,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefining_replaces_faces() {
        let mut animations = Animations::with_seed(1);
        animations.define(7, 0, vec![1, 2, 3]).unwrap();
        animations.define(7, 0, vec![0x0102, 5]).unwrap();

        let anim = animations.get(7).unwrap();
        assert_eq!(anim.faces, vec![0x0102, 5]);
        assert_eq!(anim.phase, 0);
    }

    #[test]
    fn invalid_animations_are_rejected() {
        let mut animations = Animations::with_seed(1);
        assert!(animations.define(MAXANIM as u16, 0, vec![1]).is_err());
        assert!(animations.define(3, 0, vec![]).is_err());
        assert!(animations.get(3).is_none());
    }

    #[test]
    fn sync_animations_share_phase_and_speed() {
        let mut animations = Animations::with_seed(1);
        animations.define(2, 0, vec![10, 11, 12]).unwrap();

        let first = animations.start(2 | ANIM_SYNC, 1).unwrap();
        assert_eq!(first.phase, 0);
        assert_eq!(animations.get(2).unwrap().speed, 1);

        animations.tick();
        let second = animations.start(2 | ANIM_SYNC, 1).unwrap();
        assert_eq!(second.phase, 1);

        animations.tick();
        animations.tick();
        assert_eq!(animations.get(2).unwrap().phase, 0);
    }

    #[test]
    fn random_animations_pick_a_valid_phase() {
        let mut animations = Animations::with_seed(7);
        animations.define(4, 0, vec![1, 2, 3, 4]).unwrap();
        for _ in 0..50 {
            let state = animations.start(4 | ANIM_RANDOM, 3).unwrap();
            assert_eq!(state.animation, 4);
            assert!(state.phase < 4);
            assert!(state.left < 3);
        }
    }

    #[test]
    fn unknown_animation_has_no_state() {
        let mut animations = Animations::with_seed(7);
        assert_eq!(animations.start(9 | ANIM_SYNC, 1), None);
    }
}
