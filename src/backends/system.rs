//! System backend over the platform's native audio host.
//!
//! Reaches ALSA on Linux, WASAPI on Windows and CoreAudio on macOS through
//! cpal. Host streams are thread-affine, so each flux owns a dedicated
//! control thread that builds, pauses and tears down its stream; the data
//! callbacks cpal runs on its own high-priority thread bridge raw bytes to
//! the user callback behind an atomic pause gate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfig};

use crate::backend::{Backend, BackendEngine, BackendFlux};
use crate::engine::{EngineFeedback, NodesUpdate};
use crate::flux::{FluxConfig, FluxFeedback, FluxFrame, ProcessCallback};
use crate::format::{BitFormat, ChannelPosition, CHANNEL_MAX};
use crate::worker::{finish_playback_buffer, quantum_frames};
use crate::{Direction, Error, Node};

pub(crate) static SYSTEM: CpalBackend = CpalBackend {
    refs: AtomicUsize::new(0),
};

pub(crate) struct CpalBackend {
    refs: AtomicUsize,
}

impl Backend for CpalBackend {
    fn name(&self) -> &'static str {
        if cfg!(target_os = "windows") {
            "WASAPI"
        } else if cfg!(target_os = "macos") {
            "CoreAudio"
        } else {
            "ALSA"
        }
    }

    fn version(&self) -> Option<String> {
        None
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
        Ok(Box::new(CpalEngine::new()))
    }
}

/// Enumerates host endpoints. A device present on both the input and the
/// output side becomes one duplex node. Devices whose name cannot be
/// queried are not advertised.
fn enumerate() -> Result<Vec<Node>, Error> {
    let host = cpal::default_host();
    let mut nodes: Vec<Node> = Vec::new();

    let inputs = host.input_devices().map_err(|_| Error::Connect)?;
    for device in inputs {
        if let Ok(name) = device.name() {
            nodes.push(Node::new(name.clone(), name, Direction::In));
        }
    }

    let outputs = host.output_devices().map_err(|_| Error::Connect)?;
    for device in outputs {
        if let Ok(name) = device.name() {
            match nodes.iter_mut().find(|node| node.id == name) {
                Some(existing) => existing.direction = Direction::Both,
                None => nodes.push(Node::new(name.clone(), name, Direction::Out)),
            }
        }
    }

    Ok(nodes)
}

struct CpalEngine {
    name: String,
    inventory: Vec<Node>,
    started: bool,
}

impl CpalEngine {
    fn new() -> Self {
        Self {
            name: "crossaudio".to_string(),
            inventory: Vec::new(),
            started: false,
        }
    }
}

impl BackendEngine for CpalEngine {
    fn start(&mut self, _feedback: EngineFeedback) -> Result<(), Error> {
        if self.started {
            return Err(Error::Init);
        }

        self.inventory = enumerate()?;
        self.started = true;

        tracing::info!(nodes = self.inventory.len(), "system engine started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        self.inventory.clear();
        self.started = false;
        Ok(())
    }

    fn name_get(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn name_set(&mut self, name: &str) -> Result<(), Error> {
        // The host exposes no per-session identity; the bag answers
        // queries and is applied to streams created afterwards.
        self.name = name.to_string();
        Ok(())
    }

    /// The host delivers no change notifications, so hot-plug is detected
    /// by diffing the inventory against a fresh enumeration on each
    /// snapshot request.
    fn nodes(&mut self) -> Result<NodesUpdate, Error> {
        if !self.started {
            return Ok(NodesUpdate::default());
        }

        let current = enumerate()?;

        let added = current
            .iter()
            .filter(|node| !self.inventory.iter().any(|known| known.id == node.id))
            .cloned()
            .collect();
        let removed = self
            .inventory
            .iter()
            .filter(|known| !current.iter().any(|node| node.id == known.id))
            .cloned()
            .collect();

        self.inventory = current.clone();

        Ok(NodesUpdate {
            snapshot: current,
            added,
            removed,
        })
    }

    fn flux_new(&mut self) -> Result<Box<dyn BackendFlux>, Error> {
        Ok(Box::new(CpalFlux::new()))
    }
}

/// Maps a requested encoding onto the host sample format.
fn translate_format(format: BitFormat, bits: u8) -> Option<SampleFormat> {
    match (format, bits) {
        (BitFormat::IntegerSigned, 8) => Some(SampleFormat::I8),
        (BitFormat::IntegerSigned, 16) => Some(SampleFormat::I16),
        (BitFormat::IntegerSigned, 32) => Some(SampleFormat::I32),
        (BitFormat::IntegerSigned, 64) => Some(SampleFormat::I64),
        (BitFormat::IntegerUnsigned, 8) => Some(SampleFormat::U8),
        (BitFormat::IntegerUnsigned, 16) => Some(SampleFormat::U16),
        (BitFormat::IntegerUnsigned, 32) => Some(SampleFormat::U32),
        (BitFormat::IntegerUnsigned, 64) => Some(SampleFormat::U64),
        (BitFormat::Float, 32) => Some(SampleFormat::F32),
        (BitFormat::Float, 64) => Some(SampleFormat::F64),
        _ => None,
    }
}

/// Maps a host sample format back onto the wire description, for
/// rewriting a config during negotiation.
fn format_from_host(format: SampleFormat) -> (BitFormat, u8) {
    match format {
        SampleFormat::I8 => (BitFormat::IntegerSigned, 8),
        SampleFormat::I16 => (BitFormat::IntegerSigned, 16),
        SampleFormat::I32 => (BitFormat::IntegerSigned, 32),
        SampleFormat::I64 => (BitFormat::IntegerSigned, 64),
        SampleFormat::U8 => (BitFormat::IntegerUnsigned, 8),
        SampleFormat::U16 => (BitFormat::IntegerUnsigned, 16),
        SampleFormat::U32 => (BitFormat::IntegerUnsigned, 32),
        SampleFormat::U64 => (BitFormat::IntegerUnsigned, 64),
        SampleFormat::F32 => (BitFormat::Float, 32),
        SampleFormat::F64 => (BitFormat::Float, 64),
        _ => (BitFormat::IntegerSigned, 16),
    }
}

fn rewrite_config(config: &mut FluxConfig, supported: &SupportedStreamConfig) {
    let (bit_format, sample_bits) = format_from_host(supported.sample_format());
    config.bit_format = bit_format;
    config.sample_bits = sample_bits;
    config.sample_rate = supported.sample_rate().0;
    config.channels = supported.channels().min(CHANNEL_MAX as u16) as u8;
    config.position = ChannelPosition::default_map(config.channels);
}

/// Requests ~10 ms buffers where the host advertises a supported range,
/// otherwise leaves the choice to the host.
fn buffer_size_for(supported: &SupportedStreamConfig, sample_rate: u32) -> BufferSize {
    let quantum = quantum_frames(sample_rate);
    match supported.buffer_size() {
        SupportedBufferSize::Range { min, max } => BufferSize::Fixed(quantum.clamp(*min, *max)),
        SupportedBufferSize::Unknown => BufferSize::Default,
    }
}

enum Command {
    Pause(bool),
    Stop,
}

/// Outcome of stream setup on the control thread. A `Negotiate` failure
/// carries the rewritten config for the caller.
type StartReply = Result<(), (Error, Option<FluxConfig>)>;

struct StreamThread {
    commands: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
    paused: Arc<AtomicBool>,
}

struct CpalFlux {
    name: Option<String>,
    stream: Option<StreamThread>,
}

impl CpalFlux {
    fn new() -> Self {
        Self {
            name: None,
            stream: None,
        }
    }
}

fn resolve_device(host: &cpal::Host, config: &FluxConfig) -> Result<cpal::Device, Error> {
    let by_name = |name: &str| -> Result<cpal::Device, Error> {
        let devices = match config.direction {
            Direction::In => host.input_devices(),
            _ => host.output_devices(),
        }
        .map_err(|_| Error::Connect)?;

        for device in devices {
            if device.name().is_ok_and(|candidate| candidate == name) {
                return Ok(device);
            }
        }
        Err(Error::Generic)
    };

    match config.node.as_deref() {
        Some(name) if !name.is_empty() => by_name(name),
        _ => match config.direction {
            Direction::In => host.default_input_device().ok_or(Error::Null),
            _ => host.default_output_device().ok_or(Error::Null),
        },
    }
}

/// Finds a supported host config matching the request exactly, or `None`
/// if the device proposes something else.
fn match_supported(
    device: &cpal::Device,
    config: &FluxConfig,
    sample_format: SampleFormat,
) -> Option<SupportedStreamConfig> {
    let ranges: Vec<_> = match config.direction {
        Direction::In => device.supported_input_configs().ok()?.collect(),
        _ => device.supported_output_configs().ok()?.collect(),
    };

    ranges
        .into_iter()
        .filter(|range| {
            range.sample_format() == sample_format
                && range.channels() == u16::from(config.channels)
        })
        .find_map(|range| range.try_with_sample_rate(SampleRate(config.sample_rate)))
}

fn build_capture_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    frame_bytes: usize,
    sample_rate: u32,
    mut process: ProcessCallback,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, Error> {
    // Host buffers are only borrowed for the duration of the callback and
    // arrive read-only; stage them in a scratch buffer sized for a full
    // second so steady-state delivery never allocates.
    let mut scratch = vec![0u8; frame_bytes * sample_rate as usize];

    device
        .build_input_stream_raw(
            stream_config,
            sample_format,
            move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                if paused.load(Ordering::Acquire) {
                    return;
                }

                let bytes = data.bytes();
                if bytes.len() > scratch.len() {
                    scratch.resize(bytes.len(), 0);
                }
                scratch[..bytes.len()].copy_from_slice(bytes);

                let mut frame = FluxFrame {
                    data: Some(&mut scratch[..bytes.len()]),
                    frames: (bytes.len() / frame_bytes) as u32,
                };
                process(&mut frame);
            },
            |err| tracing::error!(%err, "capture stream error"),
            None,
        )
        .map_err(map_build_error)
}

fn build_playback_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    frame_bytes: usize,
    mut process: ProcessCallback,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, Error> {
    device
        .build_output_stream_raw(
            stream_config,
            sample_format,
            move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                let bytes = data.bytes_mut();
                if paused.load(Ordering::Acquire) {
                    bytes.fill(0);
                    return;
                }

                let capacity = (bytes.len() / frame_bytes) as u32;
                let mut frame = FluxFrame {
                    data: Some(&mut *bytes),
                    frames: capacity,
                };
                process(&mut frame);

                let produced = if frame.data.is_none() { 0 } else { frame.frames };
                finish_playback_buffer(bytes, produced, capacity, frame_bytes);
            },
            |err| tracing::error!(%err, "playback stream error"),
            None,
        )
        .map_err(map_build_error)
}

fn map_build_error(err: cpal::BuildStreamError) -> Error {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => Error::Connect,
        cpal::BuildStreamError::StreamConfigNotSupported => Error::Generic,
        _ => Error::Generic,
    }
}

/// Runs on the control thread: resolves the device, negotiates, builds
/// and starts the stream, then serves pause/stop commands until told to
/// exit. The stream never leaves this thread.
fn run_stream(
    mut config: FluxConfig,
    process: ProcessCallback,
    paused: Arc<AtomicBool>,
    reply: &mpsc::Sender<StartReply>,
    commands: &mpsc::Receiver<Command>,
) {
    let host = cpal::default_host();

    let device = match resolve_device(&host, &config) {
        Ok(device) => device,
        Err(err) => {
            let _ = reply.send(Err((err, None)));
            return;
        }
    };

    let default_config = match config.direction {
        Direction::In => device.default_input_config(),
        _ => device.default_output_config(),
    };
    let default_config = match default_config {
        Ok(supported) => supported,
        Err(_) => {
            let _ = reply.send(Err((Error::Generic, None)));
            return;
        }
    };

    let supported = translate_format(config.bit_format, config.sample_bits)
        .and_then(|format| match_supported(&device, &config, format));
    let supported = match supported {
        Some(supported) => supported,
        None => {
            // Closest-match proposal: rewrite the caller's config from the
            // device default and let them retry.
            rewrite_config(&mut config, &default_config);
            let _ = reply.send(Err((Error::Negotiate, Some(config))));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let frame_bytes = sample_format.sample_size() * usize::from(config.channels);
    let stream_config = cpal::StreamConfig {
        channels: u16::from(config.channels),
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: buffer_size_for(&supported, config.sample_rate),
    };

    let stream = match config.direction {
        Direction::In => build_capture_stream(
            &device,
            &stream_config,
            sample_format,
            frame_bytes,
            config.sample_rate,
            process,
            Arc::clone(&paused),
        ),
        _ => build_playback_stream(
            &device,
            &stream_config,
            sample_format,
            frame_bytes,
            process,
            Arc::clone(&paused),
        ),
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = reply.send(Err((err, None)));
            return;
        }
    };

    if stream.play().is_err() {
        let _ = reply.send(Err((Error::Generic, None)));
        return;
    }

    let _ = reply.send(Ok(()));

    while let Ok(command) = commands.recv() {
        match command {
            Command::Pause(on) => {
                // Advisory: the atomic gate already stops delivery; the
                // host pause saves wake-ups where supported.
                if on {
                    if let Err(err) = stream.pause() {
                        tracing::warn!(%err, "host pause failed");
                    }
                } else if let Err(err) = stream.play() {
                    tracing::warn!(%err, "host resume failed");
                }
            }
            Command::Stop => break,
        }
    }
    // Dropping the stream here releases the native handles on the thread
    // that owns them.
}

impl BackendFlux for CpalFlux {
    fn start(&mut self, config: &mut FluxConfig, feedback: FluxFeedback) -> Result<(), Error> {
        if self.stream.is_some() {
            return Err(Error::Init);
        }

        let paused = Arc::new(AtomicBool::new(false));
        let (reply_tx, reply_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();

        let thread_config = config.clone();
        let thread_paused = Arc::clone(&paused);
        let process = feedback.process;

        let handle = std::thread::Builder::new()
            .name("crossaudio-stream".into())
            .spawn(move || {
                run_stream(
                    thread_config,
                    process,
                    thread_paused,
                    &reply_tx,
                    &command_rx,
                );
            })
            .map_err(|_| Error::Generic)?;

        match reply_rx.recv() {
            Ok(Ok(())) => {
                self.stream = Some(StreamThread {
                    commands: command_tx,
                    handle,
                    paused,
                });
                Ok(())
            }
            Ok(Err((err, rewritten))) => {
                let _ = handle.join();
                if let Some(rewritten) = rewritten {
                    *config = rewritten;
                }
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Generic)
            }
        }
    }

    fn stop(&mut self) -> Result<(), Error> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.commands.send(Command::Stop);
            let _ = stream.handle.join();
        }
        Ok(())
    }

    fn pause(&mut self, on: bool) -> Result<(), Error> {
        match &self.stream {
            Some(stream) => {
                stream.paused.store(on, Ordering::Release);
                stream
                    .commands
                    .send(Command::Pause(on))
                    .map_err(|_| Error::Init)
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

impl Drop for CpalFlux {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_covers_the_wire_formats() {
        assert_eq!(
            translate_format(BitFormat::IntegerSigned, 16),
            Some(SampleFormat::I16)
        );
        assert_eq!(
            translate_format(BitFormat::Float, 32),
            Some(SampleFormat::F32)
        );
        assert_eq!(
            translate_format(BitFormat::IntegerUnsigned, 8),
            Some(SampleFormat::U8)
        );
        // Packed 24-bit and malformed requests negotiate instead.
        assert_eq!(translate_format(BitFormat::IntegerSigned, 24), None);
        assert_eq!(translate_format(BitFormat::None, 16), None);
        assert_eq!(translate_format(BitFormat::IntegerSigned, 11), None);
    }

    #[test]
    fn test_translate_round_trips_through_the_host() {
        for (format, bits) in [
            (BitFormat::IntegerSigned, 16),
            (BitFormat::IntegerSigned, 32),
            (BitFormat::IntegerUnsigned, 8),
            (BitFormat::Float, 32),
            (BitFormat::Float, 64),
        ] {
            let host = translate_format(format, bits).unwrap();
            assert_eq!(format_from_host(host), (format, bits));
        }
    }

    #[test]
    fn test_backend_names_match_the_platform() {
        let name = SYSTEM.name();
        assert!(["ALSA", "WASAPI", "CoreAudio"].contains(&name));
    }

    #[test]
    fn test_engine_answers_metadata_before_start() {
        let engine = CpalEngine::new();
        assert_eq!(engine.name_get().as_deref(), Some("crossaudio"));
    }

    #[test]
    fn test_unstarted_engine_has_no_nodes() {
        let mut engine = CpalEngine::new();
        let update = engine.nodes().unwrap();
        assert!(update.snapshot.is_empty());
        assert!(update.added.is_empty());
    }

    #[test]
    fn test_name_set_updates_the_bag() {
        let mut engine = CpalEngine::new();
        engine.name_set("My App").unwrap();
        assert_eq!(engine.name_get().as_deref(), Some("My App"));
    }

    #[test]
    fn test_flux_ops_without_start_are_invalid() {
        let mut flux = CpalFlux::new();
        assert_eq!(flux.pause(true).unwrap_err(), Error::Init);
        assert!(flux.stop().is_ok());
    }

    // Tests touching real devices require audio hardware and are skipped
    // in CI, as in any host-facing suite.
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_enumerate_lists_hardware() {
        let nodes = enumerate().unwrap();
        assert!(nodes.iter().all(|node| !node.id.is_empty()));
    }
}
