use uuid::Uuid;

/// Errors surfaced by scale operations: adapter bring-up, connection setup,
/// command writes, and registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("bluetooth transport error: {0}")]
    Transport(#[from] btleplug::Error),

    #[error("no bluetooth adapter available")]
    NoAdapter,

    #[error("no device name prefixes to scan for")]
    NoPrefixes,

    #[error("scale service {0} not found on device")]
    ServiceNotFound(Uuid),

    #[error("expected write and notify characteristics, found {found}")]
    CharacteristicMismatch { found: usize },

    #[error("scale is already connected")]
    AlreadyConnected,

    #[error("scale is not connected")]
    NotConnected,

    #[error("{0} is not supported by this scale")]
    Unsupported(&'static str),

    #[error("no scale implementation registered for device '{0}'")]
    UnknownDevice(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors produced while decoding a notification buffer. These are local to
/// the notification dispatch path: the bad frame is logged and dropped, the
/// connection stays up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame header not found")]
    HeaderNotFound,

    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("frame length mismatch: expected {expected} bytes, buffer has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("{what} payload too short: {len} bytes")]
    PayloadTooShort { what: &'static str, len: usize },
}
