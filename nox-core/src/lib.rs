//! nox-core: an embeddable 2D runtime for WASM guests.
//!
//! The host owns every resource and hands the guest opaque integer handles:
//! - Audio: decoded samples (WAV, QOA) played on a fixed pool of 32 voices that a
//!   real-time mixer sums into the output device.
//! - Video: images backed by canvas textures, child images that view a region of a
//!   parent, and a single render target.
//!
//! The guest ABI is described in [`abi`] and mirrored by `nox-sdk`. [`player::run`]
//! drives a guest frame by frame; embedders can use [`runtime::NoxRuntime`] directly.

pub mod abi;
pub mod audio;
pub mod config;
pub mod error;
pub mod loader;
pub mod player;
pub mod resource;
pub mod runtime;
pub mod state;
pub mod util;
pub mod video;

pub use config::Config;
pub use error::{NoxError, Result};
pub use runtime::NoxRuntime;
pub use state::HostState;
