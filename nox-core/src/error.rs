//! Error types shared by the audio and video subsystems.
//!
//! Two classes exist:
//! - **Recoverable** errors are reported back to the guest as a negative status code
//!   (see [`NoxError::code`]) and never abort the guest.
//! - **Fatal** errors ([`NoxError::Backend`]) mean the underlying audio/graphics backend
//!   failed mid-operation. Host imports turn these into traps.

use core::fmt;

/// Which kind of host resource a handle refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Sample,
    Image,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Sample => write!(f, "sample"),
            ResourceKind::Image => write!(f, "image"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NoxError {
    #[error("invalid {kind} handle {id}")]
    InvalidResource { kind: ResourceKind, id: u32 },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("unsupported channel layout ({0} channels)")]
    UnsupportedChannelLayout(u16),

    #[error("no free audio voice")]
    NoFreeVoice,

    #[error("could not determine display pixel format")]
    UnsupportedPixelFormat,

    #[error("image {0} is not a root image")]
    NotRootImage(u32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The audio or graphics backend failed; its state cannot be trusted anymore.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl NoxError {
    pub fn invalid(kind: ResourceKind, id: u32) -> Self {
        NoxError::InvalidResource { kind, id }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, NoxError::Backend(_))
    }

    /// Stable ABI error code (positive). Guests receive `-code`.
    pub fn code(&self) -> i32 {
        match self {
            NoxError::InvalidResource { .. } => 1,
            NoxError::Decode(_) => 2,
            NoxError::UnsupportedChannelLayout(_) => 3,
            NoxError::NoFreeVoice => 4,
            NoxError::UnsupportedPixelFormat => 5,
            NoxError::NotRootImage(_) => 6,
            NoxError::InvalidArgument(_) => 7,
            NoxError::Backend(_) => 8,
        }
    }
}

pub type Result<T> = core::result::Result<T, NoxError>;
