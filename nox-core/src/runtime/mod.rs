//! Wasmtime-backed runtime glue.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine`/`Store` whose data is the [`crate::state::HostState`].
//! - Define host imports under module `"env"` matching the guest ABI.
//! - Instantiate a guest and drive its lifecycle exports.

pub mod imports;
#[allow(clippy::module_inception)]
pub mod runtime;

#[cfg(test)]
mod tests;

pub use runtime::NoxRuntime;
