use cf_core::{read_u16, read_u32, read_u8};

use crate::error::ProtocolError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerCommandType {
    Map2,
    MapExtended,
    MapScroll,
    NewMap,
    Face2,
    Image2,
    Smooth,
    Anim,
    Setup,
    Goodbye,
    Other,
}

impl ServerCommandType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "map2" => Self::Map2,
            "mapextended" => Self::MapExtended,
            "map_scroll" => Self::MapScroll,
            "newmap" => Self::NewMap,
            "face2" => Self::Face2,
            "image2" => Self::Image2,
            "smooth" => Self::Smooth,
            "anim" => Self::Anim,
            "setup" => Self::Setup,
            "goodbye" => Self::Goodbye,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommandData {
    Empty,
    /// `map2` and `mapextended` are decoded against the map later.
    Map {
        payload: Vec<u8>,
    },
    MapScroll {
        dx: i32,
        dy: i32,
    },
    Face2 {
        face: u16,
        set: u8,
        checksum: u32,
        name: String,
    },
    Image2 {
        face: u32,
        set: u8,
        png: Vec<u8>,
    },
    Smooth {
        face: u16,
        smooth_face: u16,
    },
    Anim {
        id: u16,
        flags: u16,
        faces: Vec<u16>,
    },
    /// Key/value pairs, as sent.
    Setup {
        values: Vec<(String, String)>,
    },
    Other {
        name: String,
        payload: Vec<u8>,
    },
}

fn malformed(command: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedMessage {
        command,
        reason: reason.into(),
    }
}

fn truncated(command: &'static str, payload: &[u8]) -> ProtocolError {
    ProtocolError::Truncated {
        command,
        offset: 0,
        len: payload.len(),
    }
}

fn parse_map_scroll(payload: &[u8]) -> Result<ServerCommandData, ProtocolError> {
    let text = String::from_utf8_lossy(payload);
    let mut parts = text.split_whitespace().map(str::parse::<i32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(dx)), Some(Ok(dy))) => Ok(ServerCommandData::MapScroll { dx, dy }),
        _ => Err(malformed("map_scroll", format!("expected '<dx> <dy>', got {text:?}"))),
    }
}

fn parse_face2(payload: &[u8]) -> Result<ServerCommandData, ProtocolError> {
    if payload.len() < 7 {
        return Err(truncated("face2", payload));
    }
    let mut offset = 0;
    let face = read_u16!(payload, offset);
    let set = read_u8!(payload, offset);
    let checksum = read_u32!(payload, offset);
    let name = String::from_utf8_lossy(&payload[offset..])
        .trim_end_matches('\0')
        .to_string();
    if name.is_empty() {
        return Err(malformed("face2", format!("face {face} has no name")));
    }
    Ok(ServerCommandData::Face2 {
        face,
        set,
        checksum,
        name,
    })
}

fn parse_image2(payload: &[u8]) -> Result<ServerCommandData, ProtocolError> {
    if payload.len() < 9 {
        return Err(truncated("image2", payload));
    }
    let mut offset = 0;
    let face = read_u32!(payload, offset);
    let set = read_u8!(payload, offset);
    let len = read_u32!(payload, offset);
    let png = &payload[offset..];
    if png.len() != len as usize {
        return Err(malformed(
            "image2",
            format!("face {face}: length {len} does not match {} data bytes", png.len()),
        ));
    }
    Ok(ServerCommandData::Image2 {
        face,
        set,
        png: png.to_vec(),
    })
}

fn parse_smooth(payload: &[u8]) -> Result<ServerCommandData, ProtocolError> {
    if payload.len() < 4 {
        return Err(truncated("smooth", payload));
    }
    let mut offset = 0;
    let face = read_u16!(payload, offset);
    let smooth_face = read_u16!(payload, offset);
    Ok(ServerCommandData::Smooth { face, smooth_face })
}

fn parse_anim(payload: &[u8]) -> Result<ServerCommandData, ProtocolError> {
    if payload.len() < 4 {
        return Err(truncated("anim", payload));
    }
    let mut offset = 0;
    let id = read_u16!(payload, offset);
    let flags = read_u16!(payload, offset);
    if payload.len() % 2 != 0 {
        log::warn!("anim {id}: odd payload length {}, ignoring last byte", payload.len());
    }
    let faces = payload[offset..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(ServerCommandData::Anim { id, flags, faces })
}

fn parse_setup(payload: &[u8]) -> ServerCommandData {
    let text = String::from_utf8_lossy(payload);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() % 2 != 0 {
        log::warn!("setup: dangling option {:?}", words.last());
    }
    let values = words
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect();
    ServerCommandData::Setup { values }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub header: ServerCommandType,
    pub structured_data: ServerCommandData,
}

impl ServerCommand {
    /// Parses one frame: a command name, optionally followed by a space and
    /// its payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let split = bytes.iter().position(|&b| b == b' ');
        let (name, payload) = match split {
            Some(pos) => (&bytes[..pos], &bytes[pos + 1..]),
            None => (bytes, &[][..]),
        };
        let name = String::from_utf8_lossy(name);
        let header = ServerCommandType::from_name(&name);

        let structured_data = match header {
            ServerCommandType::Map2 | ServerCommandType::MapExtended => ServerCommandData::Map {
                payload: payload.to_vec(),
            },
            ServerCommandType::MapScroll => parse_map_scroll(payload)?,
            ServerCommandType::NewMap | ServerCommandType::Goodbye => ServerCommandData::Empty,
            ServerCommandType::Face2 => parse_face2(payload)?,
            ServerCommandType::Image2 => parse_image2(payload)?,
            ServerCommandType::Smooth => parse_smooth(payload)?,
            ServerCommandType::Anim => parse_anim(payload)?,
            ServerCommandType::Setup => parse_setup(payload),
            ServerCommandType::Other => ServerCommandData::Other {
                name: name.into_owned(),
                payload: payload.to_vec(),
            },
        };

        Ok(ServerCommand {
            header,
            structured_data,
        })
    }
}
