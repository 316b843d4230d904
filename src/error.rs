use thiserror::Error;

/// Reasons a fully assembled frame is rejected by a codec.
///
/// Every variant carries the expected and the actual value so the diagnostic
/// log line can show both. None of these are fatal: the frame is dropped and
/// the battery keeps its previous data.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {actual} bytes, need at least {minimum}")]
    TooShort { actual: usize, minimum: usize },

    #[error("invalid start marker 0x{actual:04x}, expected 0x{expected:04x}")]
    StartMarker { expected: u16, actual: u16 },

    #[error("unexpected frame length 0x{actual:04x}, expected 0x{expected:04x}")]
    FrameLength { expected: usize, actual: usize },

    #[error("unexpected data length 0x{actual:02x}, expected 0x{expected:02x}")]
    DataLength { expected: usize, actual: usize },

    #[error("invalid end marker 0x{actual:02x}, expected 0x{expected:02x}")]
    EndMarker { expected: u8, actual: u8 },

    #[error("invalid checksum 0x{actual:04x}, expected 0x{expected:04x}")]
    Checksum { expected: u16, actual: u16 },

    #[error("invalid status 0x{actual:02x}, expected 0x{expected:02x}")]
    Status { expected: u8, actual: u8 },

    #[error("unknown command 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("truncated payload: {0}")]
    Truncated(#[from] crate::reader::OutOfBounds),
}

/// Creates an anyhow error with the current file and line number
#[macro_export]
macro_rules! file_error {
    ($($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*)
        )
    };
}

/// Creates an anyhow error with the current file and line number, and includes a source error
#[macro_export]
macro_rules! file_error_with_source {
    ($source:expr, $($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}: {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*),
            $source
        )
    };
}
