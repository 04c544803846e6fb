use std::collections::HashMap;

use cf_core::constants::{DEFAULT_VIEW_X, DEFAULT_VIEW_Y};

use crate::animations::Animations;
use crate::decoder::{AnimationFrames, WireDecoder};
use crate::error::ProtocolError;
use crate::face_cache::FaceCache;
use crate::image_store::{DiskImageStore, ImageStore};
use crate::map::VirtualMap;
use crate::network::client_commands::ClientCommand;
use crate::network::server_commands::{ServerCommand, ServerCommandData, ServerCommandType};
use crate::settings::ClientSettings;

/// Parses `WxH` as sent in `setup mapsize`.
fn parse_map_size(value: &str) -> Option<(usize, usize)> {
    let (w, h) = value.split_once(['x', 'X'])?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// State of one server connection: the fog map, the faces and animations the
/// server announced, and whether the renderer has something new to draw.
pub struct ClientSession<S: ImageStore = DiskImageStore> {
    map: VirtualMap,
    faces: FaceCache<S>,
    animations: Animations,
    smooth_faces: HashMap<u16, u16>,
    redraw: bool,
    finished: bool,
}

impl ClientSession<DiskImageStore> {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let store = DiskImageStore::new(&settings.cache_dir, &settings.data_dir);
        Self::new(
            VirtualMap::new(
                DEFAULT_VIEW_X,
                DEFAULT_VIEW_Y,
                settings.fog_map_size,
                settings.fog_border_min,
            ),
            FaceCache::new(store, settings.image_cache_enabled),
            Animations::new(),
        )
    }
}

impl<S: ImageStore> ClientSession<S> {
    pub fn new(map: VirtualMap, faces: FaceCache<S>, animations: Animations) -> Self {
        Self {
            map,
            faces,
            animations,
            smooth_faces: HashMap::new(),
            redraw: false,
            finished: false,
        }
    }

    pub fn map(&self) -> &VirtualMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut VirtualMap {
        &mut self.map
    }

    pub fn faces(&self) -> &FaceCache<S> {
        &self.faces
    }

    pub fn animations(&self) -> &Animations {
        &self.animations
    }

    /// The face drawn over the edges of `face`, if the server sent one.
    pub fn smooth_face(&self, face: u16) -> Option<u16> {
        self.smooth_faces.get(&face).copied()
    }

    /// Set once the server said goodbye.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads and clears the redraw-needed flag.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// `askface` commands for every face that has to come from the server.
    pub fn take_face_requests(&mut self) -> Vec<ClientCommand> {
        self.faces
            .take_requests()
            .into_iter()
            .map(ClientCommand::new_askface)
            .collect()
    }

    /// Advances animations by one tick.
    pub fn animate(&mut self) {
        let mut frames = AnimationFrames {
            animations: &mut self.animations,
            faces: &self.faces,
        };
        self.map.animate(&mut frames);
    }

    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        let command = ServerCommand::from_bytes(frame)?;
        self.handle(command)
    }

    pub fn handle(&mut self, command: ServerCommand) -> Result<(), ProtocolError> {
        match command.structured_data {
            ServerCommandData::Map { payload } => {
                let mut decoder =
                    WireDecoder::new(&mut self.map, &mut self.faces, &mut self.animations);
                let result = match command.header {
                    ServerCommandType::MapExtended => decoder.map_extended(&payload),
                    _ => decoder.map2(&payload),
                };
                // A failed message still leaves the records before the error applied.
                self.redraw |= decoder.redraw_requested();
                result
            }
            ServerCommandData::MapScroll { dx, dy } => {
                self.map.scroll(dx, dy);
                self.redraw = true;
                Ok(())
            }
            ServerCommandData::Face2 {
                face,
                set,
                checksum,
                name,
            } => {
                log::trace!("face2 {face} set {set} {name} checksum {checksum}");
                self.faces.resolve(u32::from(face), &name, Some(checksum));
                Ok(())
            }
            ServerCommandData::Image2 { face, set, png } => {
                log::trace!("image2 {face} set {set}, {} bytes", png.len());
                match self.faces.on_face_data_received(face, &png) {
                    Ok(()) => self.redraw = true,
                    Err(err) => log::warn!("face {face}: {err}"),
                }
                Ok(())
            }
            ServerCommandData::Smooth { face, smooth_face } => {
                self.smooth_faces.insert(face, smooth_face);
                Ok(())
            }
            ServerCommandData::Anim { id, flags, faces } => {
                if let Err(err) = self.animations.define(id, flags, faces) {
                    log::warn!("{err}, ignoring");
                }
                Ok(())
            }
            ServerCommandData::Setup { values } => {
                self.apply_setup(&values);
                Ok(())
            }
            ServerCommandData::Empty => {
                match command.header {
                    ServerCommandType::NewMap => {
                        self.map.new_map();
                        self.redraw = true;
                    }
                    ServerCommandType::Goodbye => {
                        log::info!("server said goodbye");
                        self.finished = true;
                    }
                    other => log::debug!("ignoring empty {other:?}"),
                }
                Ok(())
            }
            ServerCommandData::Other { name, payload } => {
                log::debug!("ignoring {name} ({} bytes)", payload.len());
                Ok(())
            }
        }
    }

    fn apply_setup(&mut self, values: &[(String, String)]) {
        for (key, value) in values {
            match key.as_str() {
                "mapsize" => match parse_map_size(value) {
                    Some((w, h)) => {
                        log::info!("server map size {w}x{h}");
                        self.map.set_size(w, h);
                        self.redraw = true;
                    }
                    None => log::warn!("setup: server refused or mangled mapsize {value:?}"),
                },
                _ => log::debug!("setup {key} = {value}"),
            }
        }
    }
}

impl<S: ImageStore> Drop for ClientSession<S> {
    fn drop(&mut self) {
        self.faces.log_statistics();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_store::MemoryImageStore;

    fn session() -> ClientSession<MemoryImageStore> {
        ClientSession::new(
            VirtualMap::new(11, 11, 128, 16),
            FaceCache::new(MemoryImageStore::default(), true),
            Animations::with_seed(7),
        )
    }

    fn frame(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(b' ');
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn parses_map_sizes() {
        assert_eq!(parse_map_size("25x17"), Some((25, 17)));
        assert_eq!(parse_map_size("FALSE"), None);
        assert_eq!(parse_map_size("10x"), None);
    }

    #[test]
    fn setup_mapsize_resizes_view() {
        let mut session = session();
        session.handle_frame(b"setup mapsize 25x17").unwrap();
        assert_eq!(session.map().view_size(), (25, 17));
        assert!(session.take_redraw());
        assert!(!session.take_redraw());
    }

    #[test]
    fn face2_queues_one_askface() {
        let mut session = session();
        let mut payload = vec![0, 42, 0];
        payload.extend(7u32.to_be_bytes());
        payload.extend(b"grass.111");
        session.handle_frame(&frame("face2", &payload)).unwrap();
        session.handle_frame(&frame("face2", &payload)).unwrap();

        let requests = session.take_face_requests();
        assert_eq!(requests, vec![ClientCommand::new_askface(42)]);
        assert!(session.take_face_requests().is_empty());
    }

    #[test]
    fn smooth_and_goodbye() {
        let mut session = session();
        session.handle_frame(&frame("smooth", &[0, 3, 0, 9])).unwrap();
        assert_eq!(session.smooth_face(3), Some(9));
        assert_eq!(session.smooth_face(4), None);

        assert!(!session.is_finished());
        session.handle_frame(b"goodbye").unwrap();
        assert!(session.is_finished());
    }

    #[test]
    fn bad_animation_is_ignored() {
        let mut session = session();
        session.handle_frame(&frame("anim", &[0, 5, 0, 0])).unwrap();
        assert!(session.animations().get(5).is_none());
        session.handle_frame(&frame("anim", &[0, 5, 0, 0, 0, 1])).unwrap();
        assert_eq!(session.animations().get(5).map(|a| a.faces.clone()), Some(vec![1]));
    }

    #[test]
    fn map_scroll_and_newmap_request_redraw() {
        let mut session = session();
        session.handle_frame(b"map_scroll 1 0").unwrap();
        assert!(session.take_redraw());
        session.handle_frame(b"newmap").unwrap();
        assert!(session.take_redraw());
    }

    #[test]
    fn unknown_commands_are_ignored() {
        let mut session = session();
        session.handle_frame(b"drawinfo 0 hello").unwrap();
        assert!(!session.take_redraw());
    }
}
