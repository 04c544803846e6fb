use std::io;

use thiserror::Error;

/// Reasons a single server message could not be applied completely.
///
/// Decoding stops at the first error; whatever the message changed before
/// that point stays applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{command}: message truncated at byte {offset} of {len}")]
    Truncated {
        command: &'static str,
        offset: usize,
        len: usize,
    },

    #[error("{command}: space ({x},{y}) has no end-of-space marker")]
    MissingSentinel {
        command: &'static str,
        x: usize,
        y: usize,
    },

    #[error("mapextended: entry of {entrysize} bytes at {offset} overruns message of {len}")]
    EntryOverrun {
        entrysize: usize,
        offset: usize,
        len: usize,
    },

    #[error("{command}: {reason}")]
    MalformedMessage {
        command: &'static str,
        reason: String,
    },
}

/// Failures while loading a face from the local image cache.
///
/// All of them are recoverable: the face is requested from the server instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("image file {path} is missing: {source}")]
    MissingImageFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("checksum mismatch for {name}: expected {expected}, file has {actual}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("image data for {name} is corrupt: {source}")]
    CorruptImage {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("face {0} has no known name")]
    UnknownFaceId(u32),

    #[error(transparent)]
    Io(#[from] io::Error),
}
