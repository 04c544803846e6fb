use cf_core::constants::MAX_FRAME_LEN;

/// Prefixes `payload` with its 2-byte network order length.
///
/// Payloads longer than a frame can describe are cut off.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let payload = if payload.len() > MAX_FRAME_LEN {
        log::warn!("outgoing frame of {} bytes truncated", payload.len());
        &payload[..MAX_FRAME_LEN]
    } else {
        payload
    };

    let mut bytes = Vec::with_capacity(2 + payload.len());
    bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Splits a byte stream into length-prefixed frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received that do not form a whole frame yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let [hi, lo, ..] = self.buffer[..] else {
            return None;
        };
        let len = usize::from(u16::from_be_bytes([hi, lo]));
        if self.buffer.len() < 2 + len {
            return None;
        }

        let frame = self.buffer[2..2 + len].to_vec();
        self.buffer.drain(..2 + len);
        Some(frame)
    }
}
