//! bbmod-core: script bridge between an embedded Lua runtime and its host
//!
//! The bridge lives inside the host process. Scripts get read-only access to
//! host memory, a handful of host services, and a set of callbacks that run
//! once per frame. None of it is allowed to take the host down.
//!
//! # Architecture
//!
//! ```text
//! host input thread ──push──▶ KeyEventQueue ─┐
//!                                            ▼
//! host frame thread ──▶ Bridge::frame_tick (reload, fonts, key events, present)
//!                                            │
//!                                            ▼
//!                  Lua runtime ◀──▶ pso table (BridgeApi) ──▶ MemoryReader
//! ```
//!
//! # Modules
//!
//! - `memory`: bounds-checked, fault-safe reads of host memory
//! - `translate`: native failures to Lua errors, uncaught error reporting
//! - `fpu`: numeric-processor state isolation around callbacks
//! - `events`: cross-thread key event queue
//! - `staging`: deferred font reconfiguration
//! - `version`: bridge version and the script version gate
//! - `addons`: addon and font directory listing
//! - `host`: notification hooks a host implements
//! - `api`: the script-facing `pso` table
//! - `bridge`: lifecycle and the per-frame safe point
//! - `config`: `bbmod.toml` loading
//! - `logging`: tracing subscriber setup

pub mod addons;
pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod fpu;
pub mod host;
pub mod logging;
pub mod memory;
pub mod staging;
pub mod translate;
pub mod version;

pub use api::BridgeApi;
pub use bridge::{Bridge, BridgeState, FrameStats};
pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError, Error, Result};
pub use host::{HostHooks, ScriptHooks};
pub use memory::{HostMemory, MemoryReader, ProcessMemory};
pub use version::{BRIDGE_VERSION, VersionInfo, VersionTriple};

/// Re-exported so hosts can implement [`HostHooks`] without naming the Lua
/// crate themselves.
pub use mlua;
