//! Backend identification and the uniform adapter contract.
//!
//! A backend adapter implements the same set of lifecycle and I/O
//! operations against one host audio API. The façade ([`Engine`],
//! [`Flux`]) resolves an adapter once at construction and routes every
//! operation through it; applications never talk to an adapter directly.
//!
//! [`Engine`]: crate::Engine
//! [`Flux`]: crate::Flux

use crate::backends;
use crate::engine::{EngineFeedback, NodesUpdate};
use crate::flux::{FluxConfig, FluxFeedback};
use crate::Error;

/// Identifies a host audio API.
///
/// A tag existing in this enum does not mean the backend is usable:
/// [`exists`](Self::exists) reports whether this build carries an adapter
/// for it and the adapter's runtime requirements are met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendTag {
    /// Hardware-free software device, always available. Capture delivers
    /// silence, playback discards; timing, pause and negotiation behave
    /// like a real device.
    Dummy,
    /// Linux ALSA.
    Alsa,
    /// FreeBSD OSS.
    Oss,
    /// Windows WASAPI.
    Wasapi,
    /// macOS CoreAudio.
    CoreAudio,
    /// PulseAudio.
    PulseAudio,
    /// OpenBSD/NetBSD sndio.
    Sndio,
    /// PipeWire.
    PipeWire,
}

impl BackendTag {
    /// True if this build has an adapter for the tag and its mandatory
    /// runtime pieces are available.
    #[must_use]
    pub fn exists(self) -> bool {
        backends::lookup(self).is_some()
    }

    /// Human-readable backend name, if an adapter exists.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        backends::lookup(self).map(Backend::name)
    }

    /// Backend/library version, if an adapter exists and reports one.
    #[must_use]
    pub fn version(self) -> Option<String> {
        backends::lookup(self).and_then(Backend::version)
    }

    /// Process-wide adapter setup. Reference counted: each successful
    /// `init` must be balanced by one [`deinit`](Self::deinit).
    ///
    /// # Errors
    ///
    /// `Null` if no adapter exists for this tag; adapter-specific errors
    /// otherwise. On failure the process-wide state is unchanged.
    pub fn init(self) -> Result<(), Error> {
        backends::lookup(self).ok_or(Error::Null)?.init()
    }

    /// Process-wide adapter teardown.
    ///
    /// # Errors
    ///
    /// `Null` if no adapter exists; `Init` if not currently initialized.
    pub fn deinit(self) -> Result<(), Error> {
        backends::lookup(self).ok_or(Error::Null)?.deinit()
    }
}

impl std::fmt::Display for BackendTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name().unwrap_or("unavailable"))
    }
}

/// Process-wide face of one backend adapter.
pub(crate) trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> Option<String>;

    /// Load and initialize whatever the host API needs process-wide.
    /// Reference counted; nested calls are balanced by `deinit`.
    fn init(&self) -> Result<(), Error>;

    fn deinit(&self) -> Result<(), Error>;

    /// Constructs the per-session state behind an [`Engine`](crate::Engine).
    fn engine_new(&self) -> Result<Box<dyn BackendEngine>, Error>;
}

/// Adapter state behind one engine: the host connection and node
/// inventory.
pub(crate) trait BackendEngine: Send {
    /// Connects to the host and seeds the node inventory. Hot-plug events
    /// are delivered through `feedback` from a backend-owned thread, never
    /// with an engine lock held.
    fn start(&mut self, feedback: EngineFeedback) -> Result<(), Error>;

    fn stop(&mut self) -> Result<(), Error>;

    fn name_get(&self) -> Option<String>;

    /// Updates the application name in the pre-connection bag and, when
    /// connected, on the live connection.
    fn name_set(&mut self, name: &str) -> Result<(), Error>;

    /// Owned snapshot of the currently known endpoints, plus hot-plug
    /// events observed while taking it (for backends that diff on
    /// demand). The façade dispatches the events after unlocking.
    fn nodes(&mut self) -> Result<NodesUpdate, Error>;

    /// Constructs the per-stream state behind a [`Flux`](crate::Flux).
    fn flux_new(&mut self) -> Result<Box<dyn BackendFlux>, Error>;
}

/// Adapter state behind one flux: the native stream and its worker.
pub(crate) trait BackendFlux: Send {
    /// Opens the native stream, negotiates the format and spawns the
    /// worker. May rewrite `config` and return [`Error::Negotiate`].
    fn start(&mut self, config: &mut FluxConfig, feedback: FluxFeedback) -> Result<(), Error>;

    /// Halts and joins the worker, then releases the native stream.
    /// Idempotent.
    fn stop(&mut self) -> Result<(), Error>;

    /// Suspends or resumes the stream without tearing it down.
    fn pause(&mut self, on: bool) -> Result<(), Error>;

    fn name_get(&self) -> Option<String>;

    fn name_set(&mut self, name: &str) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_backend_always_exists() {
        assert!(BackendTag::Dummy.exists());
        assert_eq!(BackendTag::Dummy.name(), Some("Dummy"));
    }

    #[test]
    fn test_unbuilt_backends_do_not_exist() {
        // No adapter is shipped for these hosts on any platform.
        for tag in [BackendTag::Sndio, BackendTag::PipeWire, BackendTag::Oss] {
            assert!(!tag.exists());
            assert_eq!(tag.name(), None);
            assert_eq!(tag.init(), Err(Error::Null));
            assert_eq!(tag.deinit(), Err(Error::Null));
        }
    }

    #[test]
    fn test_init_deinit_balance_repeatedly() {
        for _ in 0..8 {
            assert_eq!(BackendTag::Dummy.init(), Ok(()));
            assert_eq!(BackendTag::Dummy.deinit(), Ok(()));
        }
    }

    #[test]
    fn test_display_names_the_adapter() {
        assert_eq!(BackendTag::Dummy.to_string(), "Dummy");
        assert_eq!(BackendTag::Sndio.to_string(), "unavailable");
    }
}
