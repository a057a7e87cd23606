//! Transport worker state machine and run loop.
//!
//! [`SerialTransport`] registers itself on the bus under
//! [`TRANSPORT_ID`] and feeds a bounded FIFO from the delivery handler.
//! A dedicated worker thread owns the link and the queue's receiving end.
//!
//! # State machine
//!
//! ```text
//! Stopped ──start()──► Connecting ──settled──► Running
//!    ▲                     │                      │
//!    └──── open failed ────┘        stop() / flag cleared
//!    │                                            ▼
//!    └──────────── link closed ◄──────────── Stopping
//! ```
//!
//! Physical writes are at least `min_write_interval` apart, measured from
//! the end of one write attempt (successful or not) to the start of the
//! next. Commands still queued when the worker stops are dropped and
//! counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use commander_common::bus::{BusError, MessageBus};
use commander_common::config::{Backpressure, TransportSection};
use commander_common::consts::{
    MIN_WRITE_INTERVAL, OUTBOUND_QUEUE_CAPACITY, READ_TIMEOUT, SETTLE_DELAY, TRANSPORT_ID,
};
use commander_common::envelope::{Envelope, LowLevelCommand, Payload, SubscriberId};
use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError, bounded,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::framing::{FrameAssembler, bytes_to_text, encode_frame};
use crate::link::{Link, LinkError};

/// Upper bound on one sleep while waiting out the write interval or the settle delay.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Error types for transport lifecycle and encoding.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link could not be opened; the transport is back in `Stopped`.
    #[error("Link open failed: {0}")]
    LinkOpen(#[source] LinkError),

    /// `start()` was called on a transport that already has (or had) a worker.
    #[error("Transport worker already started")]
    AlreadyStarted,

    /// The worker thread could not be spawned.
    #[error("Failed to spawn transport worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// A command could not be encoded or a frame could not be parsed.
    #[error("Frame encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Bus registration or posting failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Worker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Full-queue policy.
    pub backpressure: Backpressure,
    /// How long one loop iteration waits for an outbound command.
    pub read_timeout: Duration,
    /// Minimum spacing between physical writes.
    pub min_write_interval: Duration,
    /// Wait after opening before discarding stale input.
    pub settle_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            backpressure: Backpressure::Block,
            read_timeout: READ_TIMEOUT,
            min_write_interval: MIN_WRITE_INTERVAL,
            settle_delay: SETTLE_DELAY,
        }
    }
}

impl TransportConfig {
    /// Standard timings with queue sizing from the `[transport]` section.
    pub fn from_section(section: &TransportSection) -> Self {
        Self {
            queue_capacity: section.queue_capacity.max(1),
            backpressure: section.backpressure,
            ..Self::default()
        }
    }
}

/// Lifecycle state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    /// No worker; the link is closed.
    Stopped = 0,
    /// Opening the link and waiting for the line to settle.
    Connecting = 1,
    /// Draining the queue.
    Running = 2,
    /// Shutting down; pending commands are being dropped.
    Stopping = 3,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Point-in-time copy of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Commands accepted into the outbound queue.
    pub queued: u64,
    /// Successful physical writes.
    pub writes: u64,
    /// Failed physical writes.
    pub write_errors: u64,
    /// Commands that could not be encoded.
    pub encode_errors: u64,
    /// Bytes read from the link.
    pub bytes_in: u64,
    /// Complete inbound frames handed to the sink.
    pub frames_in: u64,
    /// Commands discarded on shutdown.
    pub dropped: u64,
}

impl StatsSnapshot {
    /// Commands accepted but not yet written, failed or dropped.
    pub fn in_flight(&self) -> u64 {
        self.queued.saturating_sub(
            self.writes + self.write_errors + self.encode_errors + self.dropped,
        )
    }
}

#[derive(Debug, Default)]
struct TransportStats {
    queued: AtomicU64,
    writes: AtomicU64,
    write_errors: AtomicU64,
    encode_errors: AtomicU64,
    bytes_in: AtomicU64,
    frames_in: AtomicU64,
    dropped: AtomicU64,
}

impl TransportStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the transport handle, its bus handler and the worker.
#[derive(Debug)]
struct Shared {
    running: Arc<AtomicBool>,
    state: AtomicU8,
    stats: TransportStats,
}

impl Shared {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: LinkState) {
        let previous = LinkState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            info!("Transport state {:?} -> {:?}", previous, state);
        }
    }

    fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Receiver of complete inbound frames, called on the worker thread.
pub trait InboundSink: Send + Sync {
    /// Handle one frame, delimiter stripped.
    fn on_frame(&self, frame: &str);
}

/// Sink that logs every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInbound;

impl InboundSink for LogInbound {
    fn on_frame(&self, frame: &str) {
        info!("Marshaller: {}", frame);
    }
}

/// Sink that posts every frame as a text envelope from the transport.
pub struct ForwardToBus {
    bus: Arc<MessageBus>,
    source: SubscriberId,
    destination: SubscriberId,
}

impl ForwardToBus {
    /// Forward frames to `destination` on `bus`.
    pub fn new(bus: Arc<MessageBus>, destination: SubscriberId) -> Result<Self, BusError> {
        Ok(Self {
            bus,
            source: SubscriberId::new(TRANSPORT_ID)?,
            destination,
        })
    }
}

impl InboundSink for ForwardToBus {
    fn on_frame(&self, frame: &str) {
        let envelope = Envelope::new(
            self.destination.clone(),
            self.source.clone(),
            Payload::Text(frame.to_string()),
        );
        if let Err(e) = self.bus.post(envelope) {
            warn!("Inbound frame not delivered to '{}': {}", self.destination, e);
        }
    }
}

/// Owner of the single physical link to the marshaller.
pub struct SerialTransport {
    id: SubscriberId,
    config: TransportConfig,
    shared: Arc<Shared>,
    receiver: Option<Receiver<LowLevelCommand>>,
    sink: Arc<dyn InboundSink>,
    worker: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Create the transport in `Stopped` and register its handler on `bus`.
    ///
    /// Commands posted before [`start`](Self::start) accumulate in the queue.
    pub fn new(
        bus: &MessageBus,
        config: TransportConfig,
        sink: Arc<dyn InboundSink>,
    ) -> Result<Self, TransportError> {
        let id = SubscriberId::new(TRANSPORT_ID)?;
        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            running: Arc::new(AtomicBool::new(false)),
            state: AtomicU8::new(LinkState::Stopped as u8),
            stats: TransportStats::default(),
        });

        bus.register(
            id.clone(),
            inbox_handler(sender, config.backpressure, Arc::clone(&shared), id.clone()),
        );
        info!(
            "Transport registered as '{}' (queue={}, backpressure={:?})",
            id, config.queue_capacity, config.backpressure
        );

        Ok(Self {
            id,
            config,
            shared,
            receiver: Some(receiver),
            sink,
            worker: None,
        })
    }

    /// Open the link with `open` and spawn the worker.
    ///
    /// # Errors
    /// - [`TransportError::AlreadyStarted`] if a worker was started before.
    /// - [`TransportError::LinkOpen`] if `open` fails; the transport returns
    ///   to `Stopped` and `start` may be retried.
    /// - [`TransportError::Spawn`] if the thread could not be created.
    pub fn start<F>(&mut self, open: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Result<Box<dyn Link>, LinkError>,
    {
        if self.worker.is_some() || self.receiver.is_none() {
            return Err(TransportError::AlreadyStarted);
        }

        self.shared.set_state(LinkState::Connecting);
        let link = match open() {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to open link: {}", e);
                self.shared.set_state(LinkState::Stopped);
                return Err(TransportError::LinkOpen(e));
            }
        };
        let receiver = self.receiver.take().ok_or(TransportError::AlreadyStarted)?;

        self.shared.running.store(true, Ordering::SeqCst);
        let worker = Worker {
            link: Some(link),
            receiver,
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
            config: self.config,
            assembler: FrameAssembler::new(),
            last_write: None,
        };

        match thread::Builder::new()
            .name("commander-link".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.set_state(LinkState::Stopped);
                Err(TransportError::Spawn(e))
            }
        }
    }

    /// Ask the worker to finish and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Transport worker panicked");
                self.shared.set_state(LinkState::Stopped);
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.running)
    }

    /// Bus id the transport is registered under.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn inbox_handler(
    sender: Sender<LowLevelCommand>,
    backpressure: Backpressure,
    shared: Arc<Shared>,
    id: SubscriberId,
) -> impl Fn(Envelope) -> Result<(), BusError> + Send + Sync + 'static {
    move |envelope: Envelope| -> Result<(), BusError> {
        let source = envelope.source().clone();
        let cmd = match envelope.into_content() {
            Payload::Command(cmd) => cmd,
            Payload::Text(text) => {
                warn!("Text from '{}' not transmitted: {:?}", source, text);
                return Ok(());
            }
        };

        let result = match backpressure {
            Backpressure::Block => send_blocking(&sender, cmd, &shared, &id),
            Backpressure::Reject => sender.try_send(cmd).map_err(|e| match e {
                TrySendError::Full(_) => BusError::QueueFull { id: id.to_string() },
                TrySendError::Disconnected(_) => BusError::Closed { id: id.to_string() },
            }),
        };
        if result.is_ok() {
            TransportStats::bump(&shared.stats.queued, 1);
        }
        result
    }
}

/// Block while a worker is draining the queue; fail once nothing will.
fn send_blocking(
    sender: &Sender<LowLevelCommand>,
    mut cmd: LowLevelCommand,
    shared: &Shared,
    id: &SubscriberId,
) -> Result<(), BusError> {
    loop {
        match sender.send_timeout(cmd, READ_TIMEOUT) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(BusError::Closed { id: id.to_string() });
            }
            Err(SendTimeoutError::Timeout(returned)) => match shared.state() {
                LinkState::Connecting | LinkState::Running => cmd = returned,
                LinkState::Stopping => return Err(BusError::Closed { id: id.to_string() }),
                LinkState::Stopped => {
                    warn!("Inbox of '{}' is full and no worker is draining it", id);
                    return Err(BusError::QueueFull { id: id.to_string() });
                }
            },
        }
    }
}

struct Worker {
    link: Option<Box<dyn Link>>,
    receiver: Receiver<LowLevelCommand>,
    sink: Arc<dyn InboundSink>,
    shared: Arc<Shared>,
    config: TransportConfig,
    assembler: FrameAssembler,
    last_write: Option<Instant>,
}

impl Worker {
    fn run(mut self) {
        self.settle();
        if self.shared.running() {
            self.shared.set_state(LinkState::Running);
            info!("Transport running");
        }

        while self.shared.running() {
            self.poll_inbound();
            match self.receiver.recv_timeout(self.config.read_timeout) {
                Ok(cmd) => self.transmit(cmd),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Transport inbox disconnected");
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Let the line settle, then discard whatever arrived before we were ready.
    fn settle(&mut self) {
        let deadline = Instant::now() + self.config.settle_delay;
        while self.shared.running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(WAIT_SLICE));
        }
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.clear_input() {
                warn!("Failed to discard stale input: {}", e);
            }
        }
    }

    fn poll_inbound(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let available = match link.bytes_to_read() {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                warn!("Inbound poll failed: {}", e);
                return;
            }
        };

        let mut buf = vec![0u8; available];
        let n = match link.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("Inbound read failed: {}", e);
                return;
            }
        };
        if n == 0 {
            return;
        }
        TransportStats::bump(&self.shared.stats.bytes_in, n as u64);

        let text = bytes_to_text(&buf[..n]);
        for frame in self.assembler.push(&text) {
            TransportStats::bump(&self.shared.stats.frames_in, 1);
            self.sink.on_frame(&frame);
        }
    }

    fn transmit(&mut self, cmd: LowLevelCommand) {
        let frame = match encode_frame(&cmd) {
            Ok(frame) => frame,
            Err(e) => {
                TransportStats::bump(&self.shared.stats.encode_errors, 1);
                error!("Dropping {}: {}", cmd, e);
                return;
            }
        };

        self.wait_for_write_slot();
        if !self.shared.running() {
            TransportStats::bump(&self.shared.stats.dropped, 1);
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let result = link.write_all(&frame);
        self.last_write = Some(Instant::now());
        match result {
            Ok(()) => {
                TransportStats::bump(&self.shared.stats.writes, 1);
                debug!("Sent {}", cmd);
            }
            Err(e) => {
                TransportStats::bump(&self.shared.stats.write_errors, 1);
                error!("Write of {} failed: {}", cmd, e);
            }
        }
    }

    /// Sleep until `min_write_interval` has passed since the last write attempt.
    fn wait_for_write_slot(&mut self) {
        let Some(last) = self.last_write else {
            return;
        };
        let ready_at = last + self.config.min_write_interval;
        while self.shared.running() {
            let now = Instant::now();
            if now >= ready_at {
                break;
            }
            self.poll_inbound();
            thread::sleep((ready_at - now).min(WAIT_SLICE));
        }
    }

    fn shutdown(self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_state(LinkState::Stopping);

        let Worker {
            link,
            receiver,
            shared,
            ..
        } = self;

        let dropped = receiver.try_iter().count() as u64;
        drop(receiver);
        if dropped > 0 {
            warn!("Dropped {} queued command(s) on shutdown", dropped);
        }
        TransportStats::bump(&shared.stats.dropped, dropped);

        if let Some(mut link) = link {
            if let Err(e) = link.close() {
                warn!("Error closing link: {}", e);
            }
        }

        shared.set_state(LinkState::Stopped);
        let stats = shared.stats.snapshot();
        info!(
            "Transport stopped: {} writes, {} write errors, {} frames in, {} dropped",
            stats.writes, stats.write_errors, stats.frames_in, stats.dropped
        );
    }
}
