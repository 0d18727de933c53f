//! Per-backend sessions.
//!
//! An [`Engine`] owns the connection to one host audio system, the
//! application identity shown in session UIs, and the inventory of host
//! endpoints. Fluxes are created from an engine and must be stopped before
//! it is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BackendEngine, BackendTag};
use crate::{backends, Error, Flux, Node};

/// Hot-plug callback: receives ownership of the affected [`Node`].
pub type NodeCallback = Arc<dyn Fn(Node) + Send + Sync>;

/// Hot-plug notification wiring for [`Engine::start_with`].
///
/// Callbacks run on a backend-owned thread with no engine or flux lock
/// held. Do not block in them; hand the node off to your own machinery.
#[derive(Clone, Default)]
pub struct EngineFeedback {
    node_added: Option<NodeCallback>,
    node_removed: Option<NodeCallback>,
}

impl EngineFeedback {
    /// Feedback with no callbacks wired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked when the host advertises a new endpoint.
    #[must_use]
    pub fn on_node_added<F>(mut self, callback: F) -> Self
    where
        F: Fn(Node) + Send + Sync + 'static,
    {
        self.node_added = Some(Arc::new(callback));
        self
    }

    /// Invoked when an endpoint disappears.
    #[must_use]
    pub fn on_node_removed<F>(mut self, callback: F) -> Self
    where
        F: Fn(Node) + Send + Sync + 'static,
    {
        self.node_removed = Some(Arc::new(callback));
        self
    }

    pub(crate) fn added(&self, node: Node) {
        if let Some(callback) = &self.node_added {
            callback(node);
        }
    }

    pub(crate) fn removed(&self, node: Node) {
        if let Some(callback) = &self.node_removed {
            callback(node);
        }
    }
}

impl std::fmt::Debug for EngineFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineFeedback")
            .field("node_added", &self.node_added.is_some())
            .field("node_removed", &self.node_removed.is_some())
            .finish()
    }
}

/// Inventory snapshot plus the hot-plug events observed while taking it.
///
/// Backends without host change notifications diff their inventory when a
/// snapshot is requested; the façade dispatches the events after releasing
/// its lock.
#[derive(Default)]
pub(crate) struct NodesUpdate {
    pub snapshot: Vec<Node>,
    pub added: Vec<Node>,
    pub removed: Vec<Node>,
}

struct EngineInner {
    be: Box<dyn BackendEngine>,
    feedback: EngineFeedback,
    started: bool,
}

struct EngineShared {
    tag: BackendTag,
    inner: Mutex<EngineInner>,
    active_fluxes: AtomicUsize,
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.started {
            if let Err(err) = inner.be.stop() {
                tracing::warn!(%err, backend = %self.tag, "engine stop on drop failed");
            }
        }
    }
}

/// A session on one backend.
///
/// `Engine` is a cheap-clone handle; clones refer to the same session.
/// The lifecycle is `new → start → stop`, with metadata queries answered
/// before `start` from a pre-connection property bag.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Constructs a session on the given backend.
    ///
    /// # Errors
    ///
    /// `Null` if no adapter exists for `tag`; adapter errors if the
    /// session state cannot be constructed.
    pub fn new(tag: BackendTag) -> Result<Self, Error> {
        let backend = backends::lookup(tag).ok_or(Error::Null)?;
        let be = backend.engine_new()?;

        Ok(Self {
            shared: Arc::new(EngineShared {
                tag,
                inner: Mutex::new(EngineInner {
                    be,
                    feedback: EngineFeedback::default(),
                    started: false,
                }),
                active_fluxes: AtomicUsize::new(0),
            }),
        })
    }

    /// The backend this session runs on.
    #[must_use]
    pub fn backend(&self) -> BackendTag {
        self.shared.tag
    }

    /// Starts the session without hot-plug notifications.
    ///
    /// # Errors
    ///
    /// See [`start_with`](Self::start_with).
    pub fn start(&self) -> Result<(), Error> {
        self.start_with(EngineFeedback::default())
    }

    /// Connects to the host, seeds the node inventory and arms hot-plug
    /// delivery.
    ///
    /// # Errors
    ///
    /// - `Init` if already started.
    /// - `Connect` if the host audio server is unreachable.
    /// - `Permission` if denied by host policy.
    pub fn start_with(&self, feedback: EngineFeedback) -> Result<(), Error> {
        let mut inner = self.shared.inner.lock();
        if inner.started {
            return Err(Error::Init);
        }

        inner.be.start(feedback.clone())?;
        inner.feedback = feedback;
        inner.started = true;

        tracing::info!(backend = %self.shared.tag, "engine started");
        Ok(())
    }

    /// Disconnects from the host. After `stop` returns, no further
    /// hot-plug callback is invoked.
    ///
    /// Stopping a never-started or already-stopped engine is `Ok`.
    ///
    /// # Errors
    ///
    /// `Busy` while started fluxes exist; stop them first.
    pub fn stop(&self) -> Result<(), Error> {
        let mut inner = self.shared.inner.lock();
        if self.shared.active_fluxes.load(Ordering::Acquire) > 0 {
            return Err(Error::Busy);
        }
        if !inner.started {
            return Ok(());
        }

        inner.be.stop()?;
        inner.feedback = EngineFeedback::default();
        inner.started = false;

        tracing::info!(backend = %self.shared.tag, "engine stopped");
        Ok(())
    }

    /// The application name the host associates with this session.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.shared.inner.lock().be.name_get()
    }

    /// Updates the application name, both in the pre-connection bag and,
    /// if started, on the live connection.
    ///
    /// # Errors
    ///
    /// Backend-specific errors.
    pub fn set_name(&self, name: &str) -> Result<(), Error> {
        self.shared.inner.lock().be.name_set(name)
    }

    /// Owned snapshot of all currently known endpoints.
    ///
    /// Two snapshots taken with no intervening hot-plug event contain the
    /// same set of ids; later events never mutate a returned snapshot.
    ///
    /// # Errors
    ///
    /// Backend-specific errors.
    pub fn nodes(&self) -> Result<Vec<Node>, Error> {
        let (update, feedback) = {
            let mut inner = self.shared.inner.lock();
            (inner.be.nodes()?, inner.feedback.clone())
        };

        // Dispatch outside the engine lock so callbacks may re-enter.
        for node in update.added {
            feedback.added(node);
        }
        for node in update.removed {
            feedback.removed(node);
        }

        Ok(update.snapshot)
    }

    /// Creates a flux bound to this engine.
    ///
    /// # Errors
    ///
    /// Backend-specific errors.
    pub fn flux(&self) -> Result<Flux, Error> {
        let be = self.shared.inner.lock().be.flux_new()?;
        Ok(Flux::new(self.clone(), be))
    }

    pub(crate) fn flux_started(&self) {
        self.shared.active_fluxes.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn flux_stopped(&self) {
        self.shared.active_fluxes.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.shared.tag)
            .field(
                "active_fluxes",
                &self.shared.active_fluxes.load(Ordering::Relaxed),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_dispatch_is_optional() {
        let feedback = EngineFeedback::new();
        // No callbacks wired: dispatch must be a no-op, not a panic.
        feedback.added(Node::new("a", "A", crate::Direction::In));
        feedback.removed(Node::new("b", "B", crate::Direction::Out));
    }

    #[test]
    fn test_feedback_transfers_node_ownership() {
        use std::sync::Mutex as StdMutex;

        let seen: Arc<StdMutex<Vec<Node>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let feedback =
            EngineFeedback::new().on_node_added(move |node| sink.lock().unwrap().push(node));

        feedback.added(Node::new("usb-1", "USB Microphone", crate::Direction::In));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, "usb-1");
    }
}
