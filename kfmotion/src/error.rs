use crate::AssetId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse motion binary: {message}")]
    BinaryParse { message: String },

    #[error("unsupported motion format version {version}.{sub_version}")]
    UnsupportedVersion { version: u16, sub_version: u16 },

    #[error("invalid motion duration {value}")]
    InvalidDuration { value: f32 },

    #[error("invalid ease duration {value}")]
    InvalidEaseDuration { value: f32 },

    #[error("too many animated joints: {count} (max {max})")]
    TooManyJoints { count: u32, max: u32 },

    #[error("invalid key count {count} for joint '{joint}'")]
    InvalidKeyCount { joint: String, count: i32 },

    #[error("keys out of order for joint '{joint}'")]
    KeysOutOfOrder { joint: String },

    #[error("unknown hand pose {value}")]
    UnknownHandPose { value: u32 },

    #[error("invalid constraint chain length {value}")]
    InvalidChainLength { value: u8 },

    #[error("unknown constraint type {value}")]
    UnknownConstraintType { value: u8 },

    #[error("motion {id} is not loaded")]
    NotLoaded { id: AssetId },

    #[cfg(feature = "json")]
    #[error("failed to encode diagnostic dump: {message}")]
    DumpEncode { message: String },
}
