//! Keyframe skeletal motion playback runtime.
//!
//! This crate is renderer-agnostic. The skeleton, asset transport, and final
//! pose compositing live behind the traits in the runtime module; the crate
//! itself owns the wire codec, the shared data cache, curve evaluation, the
//! per-instance playback state machine, and positional constraint fix-up.
//!
//! All evaluation is single-threaded and tick-driven. The only asynchronous
//! boundary is asset loading: fetch completion must be marshalled back onto
//! the thread that owns the instance and the cache before
//! [`KeyframeMotion::handle_fetch_complete`] is called.

#![forbid(unsafe_code)]

mod binary;
mod cache;
mod error;
mod ids;
mod model;
mod runtime;
mod version;

#[cfg(feature = "json")]
pub mod dump;

pub use binary::{deserialize, serialize};
pub use cache::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use runtime::*;
pub use version::*;


#[cfg(test)]
mod cache_tests;
