//! Hardware-free software backend.
//!
//! The dummy device behaves like a real one (clock-paced frame delivery,
//! pause gating, format negotiation, hot-plug seeding) without touching
//! any host API. Capture delivers silence spans, playback consumes and
//! discards. It backs the test suite and gives applications a predictable
//! fallback when no host audio system is usable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::backend::{Backend, BackendEngine, BackendFlux};
use crate::engine::{EngineFeedback, NodesUpdate};
use crate::flux::{FluxConfig, FluxFeedback, FluxFrame};
use crate::format::{BitFormat, ChannelPosition, SampleLayout};
use crate::worker::{finish_playback_buffer, quantum_frames, WorkerGate};
use crate::{Direction, Error, Node};

const CAPTURE_NODE: &str = "null-in";
const PLAYBACK_NODE: &str = "null-out";
const DEFAULT_APP_NAME: &str = "crossaudio";

pub(crate) static NULL: NullBackend = NullBackend {
    refs: AtomicUsize::new(0),
};

pub(crate) struct NullBackend {
    refs: AtomicUsize,
}

impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }

    fn init(&self) -> Result<(), Error> {
        self.refs.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn deinit(&self) -> Result<(), Error> {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                refs.checked_sub(1)
            })
            .map(|_| ())
            .map_err(|_| Error::Init)
    }

    fn engine_new(&self) -> Result<Box<dyn BackendEngine>, Error> {
        Ok(Box::new(NullEngine::new()))
    }
}

enum HotplugEvent {
    Added(Node),
    Removed(Node),
}

struct EventState {
    pending: VecDeque<HotplugEvent>,
    halt: bool,
}

/// Queue between the engine and its event-delivery thread. Callbacks run
/// on that thread, so no engine lock is ever held while calling out.
struct EventQueue {
    state: Mutex<EventState>,
    wakeup: Condvar,
}

impl EventQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(EventState {
                pending: VecDeque::new(),
                halt: false,
            }),
            wakeup: Condvar::new(),
        }
    }

    fn push(&self, event: HotplugEvent) {
        self.state.lock().pending.push_back(event);
        self.wakeup.notify_all();
    }

    fn halt(&self) {
        self.state.lock().halt = true;
        self.wakeup.notify_all();
    }

    /// Blocks for the next event; `None` once halted (pending events are
    /// discarded so no callback outlives the engine stop).
    fn pop(&self) -> Option<HotplugEvent> {
        let mut state = self.state.lock();
        loop {
            if state.halt {
                return None;
            }
            if let Some(event) = state.pending.pop_front() {
                return Some(event);
            }
            self.wakeup.wait(&mut state);
        }
    }
}

struct EventThread {
    queue: Arc<EventQueue>,
    handle: Option<JoinHandle<()>>,
}

impl EventThread {
    fn spawn(feedback: EngineFeedback) -> Result<Self, Error> {
        let queue = Arc::new(EventQueue::new());
        let drain = Arc::clone(&queue);

        let handle = std::thread::Builder::new()
            .name("crossaudio-null-events".into())
            .spawn(move || {
                while let Some(event) = drain.pop() {
                    match event {
                        HotplugEvent::Added(node) => feedback.added(node),
                        HotplugEvent::Removed(node) => feedback.removed(node),
                    }
                }
            })
            .map_err(|_| Error::Generic)?;

        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.queue.halt();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventThread {
    fn drop(&mut self) {
        self.stop();
    }
}

struct NullEngine {
    name: String,
    nodes: Vec<Node>,
    events: Option<EventThread>,
}

impl NullEngine {
    fn new() -> Self {
        Self {
            name: DEFAULT_APP_NAME.to_string(),
            nodes: vec![
                Node::new(CAPTURE_NODE, "Null Capture", Direction::In),
                Node::new(PLAYBACK_NODE, "Null Playback", Direction::Out),
            ],
            events: None,
        }
    }

    #[cfg(test)]
    fn inject(&self, event: HotplugEvent) {
        if let Some(events) = &self.events {
            events.queue.push(event);
        }
    }
}

impl BackendEngine for NullEngine {
    fn start(&mut self, feedback: EngineFeedback) -> Result<(), Error> {
        if self.events.is_some() {
            return Err(Error::Init);
        }

        let events = EventThread::spawn(feedback)?;
        for node in &self.nodes {
            events.queue.push(HotplugEvent::Added(node.clone()));
        }
        self.events = Some(events);

        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        if let Some(mut events) = self.events.take() {
            events.stop();
        }
        Ok(())
    }

    fn name_get(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn name_set(&mut self, name: &str) -> Result<(), Error> {
        self.name = name.to_string();
        Ok(())
    }

    fn nodes(&mut self) -> Result<NodesUpdate, Error> {
        Ok(NodesUpdate {
            snapshot: self.nodes.clone(),
            ..NodesUpdate::default()
        })
    }

    fn flux_new(&mut self) -> Result<Box<dyn BackendFlux>, Error> {
        Ok(Box::new(NullFlux::new()))
    }
}

struct RunningWorker {
    gate: Arc<WorkerGate>,
    handle: JoinHandle<()>,
}

struct NullFlux {
    name: Option<String>,
    worker: Option<RunningWorker>,
}

impl NullFlux {
    fn new() -> Self {
        Self {
            name: None,
            worker: None,
        }
    }
}

/// Rewrites an unsupported format to the closest neighbor the dummy
/// device accepts.
fn negotiate(config: &mut FluxConfig) -> Result<SampleLayout, Error> {
    if let Ok(layout) = SampleLayout::padded(config.bit_format, config.sample_bits) {
        return Ok(layout);
    }

    config.bit_format = BitFormat::IntegerSigned;
    config.sample_bits = 16;
    config.position = ChannelPosition::default_map(config.channels);
    Err(Error::Negotiate)
}

fn resolve_node(config: &FluxConfig) -> Result<(), Error> {
    let expected = match config.direction {
        Direction::In => CAPTURE_NODE,
        Direction::Out => PLAYBACK_NODE,
        _ => return Err(Error::Generic),
    };

    match config.node.as_deref() {
        None | Some("") => Ok(()),
        Some(id) if id == expected => Ok(()),
        Some(_) => Err(Error::Generic),
    }
}

impl BackendFlux for NullFlux {
    fn start(&mut self, config: &mut FluxConfig, feedback: FluxFeedback) -> Result<(), Error> {
        if self.worker.is_some() {
            return Err(Error::Init);
        }

        resolve_node(config)?;
        let layout = negotiate(config)?;

        let quantum = quantum_frames(config.sample_rate);
        let frame_bytes = layout.frame_bytes(config.channels);
        let period = Duration::from_secs_f64(f64::from(quantum) / f64::from(config.sample_rate));
        let direction = config.direction;

        let gate = Arc::new(WorkerGate::new());
        let worker_gate = Arc::clone(&gate);
        let mut process = feedback.process;

        let handle = std::thread::Builder::new()
            .name("crossaudio-null-io".into())
            .spawn(move || {
                let mut buffer = vec![0u8; frame_bytes * quantum as usize];
                let mut next = Instant::now() + period;

                while !worker_gate.halted() {
                    worker_gate.wait_if_paused();
                    if worker_gate.halted() {
                        break;
                    }

                    // The "host" wake-up: one quantum of wall clock. After
                    // a stall (pause, scheduling gap) the schedule resnaps
                    // instead of burst-delivering the missed quanta.
                    let now = Instant::now();
                    if now < next {
                        std::thread::sleep(next - now);
                    } else if now.duration_since(next) > period {
                        next = now;
                    }
                    next += period;

                    if worker_gate.halted() || worker_gate.paused() {
                        continue;
                    }

                    match direction {
                        Direction::In => {
                            // The null device captures silence spans.
                            let mut frame = FluxFrame {
                                data: None,
                                frames: quantum,
                            };
                            process(&mut frame);
                        }
                        _ => {
                            let mut frame = FluxFrame {
                                data: Some(&mut buffer[..]),
                                frames: quantum,
                            };
                            process(&mut frame);

                            let produced = if frame.data.is_none() { 0 } else { frame.frames };
                            finish_playback_buffer(&mut buffer, produced, quantum, frame_bytes);
                        }
                    }
                }
            })
            .map_err(|_| Error::Generic)?;

        tracing::debug!(
            ?direction,
            rate = config.sample_rate,
            channels = config.channels,
            quantum,
            "null flux worker running"
        );

        self.worker = Some(RunningWorker { gate, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        if let Some(worker) = self.worker.take() {
            worker.gate.halt();
            let _ = worker.handle.join();
        }
        Ok(())
    }

    fn pause(&mut self, on: bool) -> Result<(), Error> {
        match &self.worker {
            Some(worker) => {
                worker.gate.set_paused(on);
                Ok(())
            }
            None => Err(Error::Init),
        }
    }

    fn name_get(&self) -> Option<String> {
        self.name.clone()
    }

    fn name_set(&mut self, name: &str) -> Result<(), Error> {
        self.name = Some(name.to_string());
        Ok(())
    }
}

impl Drop for NullFlux {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex as StdMutex;

    fn capture_config() -> FluxConfig {
        FluxConfig::new(Direction::In, BitFormat::IntegerSigned, 16, 8000, 1)
    }

    #[test]
    fn test_negotiate_rewrites_unsupported_bits() {
        let mut config = FluxConfig::new(Direction::Out, BitFormat::IntegerSigned, 11, 48000, 2);
        assert_eq!(negotiate(&mut config).unwrap_err(), Error::Negotiate);
        assert_eq!(config.sample_bits, 16);
        assert_eq!(config.bit_format, BitFormat::IntegerSigned);

        // Fixed point: the rewritten config is accepted as-is.
        assert!(negotiate(&mut config).is_ok());
    }

    #[test]
    fn test_resolve_node_accepts_default_and_matching_id() {
        let mut config = capture_config();
        assert!(resolve_node(&config).is_ok());

        config.node = Some(String::new());
        assert!(resolve_node(&config).is_ok());

        config.node = Some(CAPTURE_NODE.to_string());
        assert!(resolve_node(&config).is_ok());

        config.node = Some(PLAYBACK_NODE.to_string());
        assert_eq!(resolve_node(&config).unwrap_err(), Error::Generic);
    }

    #[test]
    fn test_capture_delivers_silence_spans() {
        let frames = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&frames);

        let mut flux = NullFlux::new();
        let mut config = capture_config();
        flux.start(
            &mut config,
            FluxFeedback::new(move |frame| {
                assert!(frame.data.is_none());
                sink.fetch_add(u64::from(frame.frames), Ordering::Relaxed);
            }),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(120));
        flux.stop().unwrap();

        // ~12 quanta of 80 frames in 120 ms; allow generous scheduling slack.
        let delivered = frames.load(Ordering::Relaxed);
        assert!(delivered >= 80, "delivered only {delivered} frames");
    }

    #[test]
    fn test_stop_synchronizes_with_last_callback() {
        let calls = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&calls);

        let mut flux = NullFlux::new();
        let mut config = capture_config();
        flux.start(
            &mut config,
            FluxFeedback::new(move |_| {
                sink.fetch_add(1, Ordering::Relaxed);
            }),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        flux.stop().unwrap();

        let after_stop = calls.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(calls.load(Ordering::Relaxed), after_stop);
    }

    #[test]
    fn test_double_stop_is_ok() {
        let mut flux = NullFlux::new();
        let mut config = capture_config();
        flux.start(&mut config, FluxFeedback::new(|_| {})).unwrap();
        assert!(flux.stop().is_ok());
        assert!(flux.stop().is_ok());
    }

    #[test]
    fn test_start_while_started_is_rejected() {
        let mut flux = NullFlux::new();
        let mut config = capture_config();
        flux.start(&mut config, FluxFeedback::new(|_| {})).unwrap();
        assert_eq!(
            flux.start(&mut config, FluxFeedback::new(|_| {}))
                .unwrap_err(),
            Error::Init
        );
        flux.stop().unwrap();
    }

    #[test]
    fn test_pause_without_start_is_invalid() {
        let mut flux = NullFlux::new();
        assert_eq!(flux.pause(true).unwrap_err(), Error::Init);
    }

    #[test]
    fn test_playback_commit_rules_apply() {
        // Callback alternates: silence request, partial buffer, overrun.
        let mut flux = NullFlux::new();
        let mut config = FluxConfig::new(Direction::Out, BitFormat::IntegerSigned, 16, 8000, 1);
        let step = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&step);

        flux.start(
            &mut config,
            FluxFeedback::new(move |frame| {
                let capacity = frame.frames;
                match counter.fetch_add(1, Ordering::Relaxed) % 3 {
                    0 => frame.frames = 0,
                    1 => frame.frames = capacity / 2,
                    _ => frame.frames = capacity * 4,
                }
            }),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(80));
        flux.stop().unwrap();
        assert!(step.load(Ordering::Relaxed) >= 3);
    }

    #[test]
    fn test_engine_seeds_node_added_events() {
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut engine = NullEngine::new();
        engine
            .start(EngineFeedback::new().on_node_added(move |node| {
                sink.lock().unwrap().push(node.id);
            }))
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        engine.stop().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], CAPTURE_NODE);
        assert_eq!(seen[1], PLAYBACK_NODE);
    }

    #[test]
    fn test_injected_unplug_reaches_the_callback() {
        let removed: Arc<StdMutex<Vec<Node>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&removed);

        let mut engine = NullEngine::new();
        engine
            .start(EngineFeedback::new().on_node_removed(move |node| {
                sink.lock().unwrap().push(node);
            }))
            .unwrap();

        engine.inject(HotplugEvent::Removed(Node::new(
            CAPTURE_NODE,
            "Null Capture",
            Direction::In,
        )));
        std::thread::sleep(Duration::from_millis(50));
        engine.stop().unwrap();

        let removed = removed.lock().unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].direction, Direction::In);
    }

    #[test]
    fn test_no_events_after_engine_stop() {
        let count = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&count);

        let mut engine = NullEngine::new();
        engine
            .start(EngineFeedback::new().on_node_added(move |_| {
                sink.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        engine.stop().unwrap();
        let after_stop = count.load(Ordering::Relaxed);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
    }

    #[test]
    fn test_snapshots_are_idempotent_without_hotplug() {
        let mut engine = NullEngine::new();
        let first = engine.nodes().unwrap().snapshot;
        let second = engine.nodes().unwrap().snapshot;

        let ids = |nodes: &[Node]| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }
}
