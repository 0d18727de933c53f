//! One-way PCM streams.
//!
//! A [`Flux`] is a half-duplex stream bound to an [`Engine`]. Starting it
//! negotiates a format with the backend and spawns a dedicated worker
//! thread that surfaces frames to the application through a short, bounded
//! callback.

use parking_lot::Mutex;

use crate::backend::BackendFlux;
use crate::format::{BitFormat, ChannelPosition, CHANNEL_MAX};
use crate::{Direction, Engine, Error};

/// Stream configuration passed to [`Flux::start`].
///
/// On [`Error::Negotiate`] the backend has rewritten the fields to its
/// closest supported neighbor; the rewritten config is accepted on retry.
#[derive(Debug, Clone)]
pub struct FluxConfig {
    /// Target node id, or `None` for the backend default of the direction.
    pub node: Option<String>,
    /// `In` (capture) or `Out` (playback); anything else is rejected.
    pub direction: Direction,
    /// Sample encoding family.
    pub bit_format: BitFormat,
    /// Valid bits per sample (8/16/24/32/64, backend permitting).
    pub sample_bits: u8,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channels: u8,
    /// Speaker assignment of each interleaved channel; slots past
    /// `channels` are ignored.
    pub position: [ChannelPosition; CHANNEL_MAX],
}

impl FluxConfig {
    /// Config for the default node with the conventional channel layout.
    #[must_use]
    pub fn new(
        direction: Direction,
        bit_format: BitFormat,
        sample_bits: u8,
        sample_rate: u32,
        channels: u8,
    ) -> Self {
        Self {
            node: None,
            direction,
            bit_format,
            sample_bits,
            sample_rate,
            channels,
            position: ChannelPosition::default_map(channels),
        }
    }

    /// Targets a specific node instead of the backend default.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// The callback payload: one buffer of interleaved PCM.
///
/// On capture, `data` is the frames the host delivered; `None` means a
/// silence span of `frames` frames (never uninitialized memory). On
/// playback, `data` is a buffer to fill and `frames` arrives set to its
/// capacity; the callback lowers `frames` to what it produced, with `0`
/// requesting a full quantum of silence.
#[derive(Debug)]
pub struct FluxFrame<'a> {
    /// Interleaved frame bytes, owned by the worker for the duration of
    /// the call.
    pub data: Option<&'a mut [u8]>,
    /// Frame count (see type docs for the per-direction meaning).
    pub frames: u32,
}

/// The per-frame callback, invoked serialized on the flux worker.
///
/// The worker runs at elevated priority where the host allows it: do not
/// allocate, take contended locks or block. Calling back into the same
/// flux (start/stop/pause) from the callback deadlocks.
pub type ProcessCallback = Box<dyn FnMut(&mut FluxFrame<'_>) + Send>;

/// Wires a [`ProcessCallback`] to [`Flux::start`].
pub struct FluxFeedback {
    pub(crate) process: ProcessCallback,
}

impl FluxFeedback {
    /// Wraps a closure as the per-frame callback.
    pub fn new<F>(process: F) -> Self
    where
        F: FnMut(&mut FluxFrame<'_>) + Send + 'static,
    {
        Self {
            process: Box::new(process),
        }
    }
}

impl std::fmt::Debug for FluxFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluxFeedback").finish_non_exhaustive()
    }
}

struct FluxInner {
    be: Box<dyn BackendFlux>,
    started: bool,
}

/// A half-duplex PCM stream bound to an [`Engine`].
///
/// Created by [`Engine::flux`]. The stream lifecycle is
/// `start → (pause ⇄ resume) → stop`, and a stopped flux may be started
/// again. Dropping a running flux stops it.
pub struct Flux {
    engine: Engine,
    inner: Mutex<FluxInner>,
}

impl Flux {
    pub(crate) fn new(engine: Engine, be: Box<dyn BackendFlux>) -> Self {
        Self {
            engine,
            inner: Mutex::new(FluxInner { be, started: false }),
        }
    }

    /// The engine this flux is bound to.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Opens the native stream, negotiates `config` and starts frame
    /// delivery.
    ///
    /// # Errors
    ///
    /// - `Init` if already started.
    /// - `Generic` for malformed configs (direction not `In`/`Out`, zero
    ///   rate or channels, more than [`CHANNEL_MAX`] channels).
    /// - `Negotiate` if the backend rewrote `config`; retry with the
    ///   rewritten values.
    /// - Backend-specific errors otherwise.
    pub fn start(&self, config: &mut FluxConfig, feedback: FluxFeedback) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.started {
            return Err(Error::Init);
        }

        if !matches!(config.direction, Direction::In | Direction::Out) {
            return Err(Error::Generic);
        }
        if config.sample_rate == 0
            || config.channels == 0
            || usize::from(config.channels) > CHANNEL_MAX
        {
            return Err(Error::Generic);
        }

        inner.be.start(config, feedback)?;
        inner.started = true;
        self.engine.flux_started();

        tracing::debug!(
            direction = ?config.direction,
            rate = config.sample_rate,
            channels = config.channels,
            bits = config.sample_bits,
            "flux started"
        );
        Ok(())
    }

    /// Stops frame delivery and releases the native stream.
    ///
    /// Blocks until the worker has observed the halt; after `stop`
    /// returns, no further `process` invocation is made. Idempotent:
    /// stopping a stopped (or never-started) flux is `Ok`.
    pub fn stop(&self) -> Result<(), Error> {
        self.stop_inner(&mut self.inner.lock())
    }

    fn stop_inner(&self, inner: &mut FluxInner) -> Result<(), Error> {
        if !inner.started {
            return Ok(());
        }

        inner.be.stop()?;
        inner.started = false;
        self.engine.flux_stopped();

        tracing::debug!("flux stopped");
        Ok(())
    }

    /// Suspends (`true`) or resumes (`false`) frame delivery without
    /// tearing down the native stream.
    ///
    /// # Errors
    ///
    /// `Init` if the flux is not started.
    pub fn pause(&self, on: bool) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if !inner.started {
            return Err(Error::Init);
        }
        inner.be.pause(on)
    }

    /// The stream name, if one was assigned.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.inner.lock().be.name_get()
    }

    /// Assigns the stream name shown by host session UIs.
    ///
    /// # Errors
    ///
    /// Backend-specific errors.
    pub fn set_name(&self, name: &str) -> Result<(), Error> {
        self.inner.lock().be.name_set(name)
    }
}

impl Drop for Flux {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Err(err) = self.stop_inner(&mut inner) {
            tracing::warn!(%err, "flux stop on drop failed");
        }
    }
}

impl std::fmt::Debug for Flux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flux")
            .field("started", &self.inner.lock().started)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_positions_from_channel_count() {
        let config = FluxConfig::new(Direction::In, BitFormat::IntegerSigned, 16, 48000, 2);
        assert_eq!(config.position[0], ChannelPosition::FrontLeft);
        assert_eq!(config.position[1], ChannelPosition::FrontRight);
        assert_eq!(config.node, None);
    }

    #[test]
    fn test_config_with_node_targets_it() {
        let config =
            FluxConfig::new(Direction::Out, BitFormat::Float, 32, 48000, 2).with_node("hdmi:1");
        assert_eq!(config.node.as_deref(), Some("hdmi:1"));
    }

    #[test]
    fn test_frame_silence_span_has_no_data() {
        let frame = FluxFrame {
            data: None,
            frames: 480,
        };
        assert!(frame.data.is_none());
        assert_eq!(frame.frames, 480);
    }
}
