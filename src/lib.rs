//! # crossaudio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Cross-platform, low-latency audio capture and playback behind one
//! uniform abstraction.
//!
//! `crossaudio` opens a device-agnostic [`Flux`] (a one-way real-time PCM
//! stream) on an [`Engine`] (a per-backend session) and delivers frames
//! through a short, bounded callback on a dedicated high-priority worker.
//! Host specifics (ALSA, WASAPI, CoreAudio, or the hardware-free dummy
//! device) stay behind the backend adapters.
//!
//! ## Quick Start
//!
//! ```no_run
//! use crossaudio::{
//!     BackendTag, BitFormat, Direction, Engine, FluxConfig, FluxFeedback,
//! };
//!
//! # fn main() -> Result<(), crossaudio::Error> {
//! BackendTag::Dummy.init()?;
//!
//! let engine = Engine::new(BackendTag::Dummy)?;
//! engine.start()?;
//!
//! let flux = engine.flux()?;
//! let mut config = FluxConfig::new(Direction::In, BitFormat::IntegerSigned, 16, 48000, 2);
//! flux.start(
//!     &mut config,
//!     FluxFeedback::new(|frame| {
//!         // Capture: frame.data holds interleaved PCM; None is silence.
//!         let _ = frame.frames;
//!     }),
//! )?;
//!
//! // ... stream runs on its worker thread ...
//!
//! flux.stop()?;
//! engine.stop()?;
//! BackendTag::Dummy.deinit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Application thread**: engine and flux lifecycle calls; the only
//!   blocking operation is the join inside `stop()`
//! - **Flux worker**: one dedicated thread per stream invoking the
//!   `process` callback in frame order
//! - **Hot-plug thread**: backend-owned, delivering node add/remove
//!   notifications with no library lock held
//!
//! The callback boundary is non-allocating: between buffer acquire and
//! commit the library takes no contended lock and performs no blocking
//! I/O, so a well-behaved callback keeps the stream glitch-free.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod backend;
mod backends;
mod engine;
mod error;
mod flux;
mod format;
mod node;
mod ring_buffer;
mod worker;

pub use backend::BackendTag;
pub use engine::{Engine, EngineFeedback, NodeCallback};
pub use error::Error;
pub use flux::{Flux, FluxConfig, FluxFeedback, FluxFrame, ProcessCallback};
pub use format::{BitFormat, ChannelPosition, SampleLayout, CHANNEL_MAX};
pub use node::{Direction, Node};
pub use ring_buffer::{RingBuffer, RingConsumer, RingProducer};
