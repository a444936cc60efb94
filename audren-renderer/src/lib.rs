//! # audren renderer library
//!
//! Per-frame command scheduling for an audio renderer service.
//!
//! **Purpose:** Apply client update requests to the renderer state, turn that
//! state into an ordered, cost-estimated command list once per frame, drop
//! low-priority voices when the frame would overrun its DSP budget, and hand
//! the list to a mixing consumer.
//!
//! **Architecture:** `parameter` decodes the wire records, `server` holds the
//! per-object state, `state_updater` applies a request, `command` generates
//! and estimates lists, and `render_system` ties one session together.

pub mod behaviour;
pub mod client;
pub mod command;
pub mod config;
pub mod consumer;
pub mod error;
pub mod parameter;
pub mod render_system;
pub mod server;
pub mod state_updater;
pub mod types;

pub use client::UpdateBuilder;
pub use config::TomlConfig;
pub use consumer::{DspMixer, MixingConsumer};
pub use error::{Error, Result, ResultCode};
pub use render_system::{compute_voice_drop, get_work_buffer_size, AudioRenderSystem, SessionResources};
pub use types::RendererConfiguration;
