use cf_core::constants::{VERSION_CS, VERSION_SC};

use super::framing::encode_frame;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientCommandType {
    Version,
    Setup,
    AskFace,
    RequestInfo,
}

impl ClientCommandType {
    fn name(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Setup => "setup",
            Self::AskFace => "askface",
            Self::RequestInfo => "requestinfo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    header: ClientCommandType,
    payload: Vec<u8>,
}

impl ClientCommand {
    fn new(header: ClientCommandType, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> ClientCommandType {
        self.header
    }

    /// Command name and payload, without framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let name = self.header.name().as_bytes();
        let mut bytes = Vec::with_capacity(name.len() + 1 + self.payload.len());
        bytes.extend_from_slice(name);
        if !self.payload.is_empty() {
            bytes.push(b' ');
            bytes.extend_from_slice(&self.payload);
        }
        bytes
    }

    /// The command as sent on the wire, with its length prefix.
    pub fn to_frame(&self) -> Vec<u8> {
        encode_frame(&self.to_bytes())
    }

    /// Announces the protocol versions and the client name.
    pub fn new_version(client_name: &str) -> Self {
        let text = format!("{VERSION_CS} {VERSION_SC} {client_name}");
        Self::new(ClientCommandType::Version, text.into_bytes())
    }

    /// Requests protocol options, e.g. `("mapsize", "25x25")`.
    pub fn new_setup(options: &[(&str, &str)]) -> Self {
        let text = options
            .iter()
            .map(|(key, value)| format!("{key} {value}"))
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!("Building setup packet: {text}");
        Self::new(ClientCommandType::Setup, text.into_bytes())
    }

    /// Asks the server for the image of face `face`.
    pub fn new_askface(face: u32) -> Self {
        log::debug!("Building askface packet: face={face}");
        Self::new(ClientCommandType::AskFace, face.to_string().into_bytes())
    }

    /// Asks for the image checksums and face sets.
    pub fn new_request_image_info() -> Self {
        Self::new(ClientCommandType::RequestInfo, b"image_info".to_vec())
    }
}
