//! Serial Command Engine
//!
//! Owns one device connection. At most one request is in flight: an atomic
//! flag guards the port, and the reader task hands each complete response to
//! the waiting caller through a single-slot channel. A background worker
//! drains the optional command queue in submission order.

pub mod command;
pub mod motion;
pub mod operations;
pub mod queue;
pub mod reception;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_config::{AxisSettings, AxisTable, BridgeSettings};
use common::hex::describe_binary;
use errors::{BridgeError, BridgeResult};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::modbus::frame::{function_code_description, is_read_function};
use crate::modbus::{decode_values_checked, ModbusCommand};
use crate::transport::{
    SerialTransport, SerialTransportConfig, Transport, TransportError, TransportReader,
    TransportStats, TransportWriter,
};

pub use command::{Command, ResponseCode, SendMode, SerialResponse};
pub use motion::{MotionChange, MotionEvent, MotionProgress, MotionTracker};
pub use operations::AxisDefinition;
pub use queue::{CommandQueue, QueuedCommand};
pub use reception::ReceptionBuffer;

/// Releases the single-flight flag when the exchange ends, however it ends
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State shared between a caller's exchange and the reader task
#[derive(Debug)]
struct Exchange {
    buffer: ReceptionBuffer,
    /// Completion slot of the caller waiting for the current response
    pending: Option<oneshot::Sender<Vec<u8>>>,
    /// Function code of an outstanding binary request
    binary_function: Option<u8>,
    motion: Option<MotionTracker>,
}

struct EngineInner {
    settings: BridgeSettings,
    axes: RwLock<AxisTable>,
    open: AtomicBool,
    busy: AtomicBool,
    queued_mode: AtomicBool,
    exchange: Mutex<Exchange>,
    writer: tokio::sync::Mutex<Option<TransportWriter>>,
    queue: Option<CommandQueue>,
    stats: Mutex<TransportStats>,
    shutdown: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Serial command engine for one device
pub struct SerialEngine {
    inner: Arc<EngineInner>,
}

impl SerialEngine {
    /// Create a closed engine from a settings snapshot
    pub fn new(settings: BridgeSettings) -> BridgeResult<Self> {
        // Reject an unsupported data/stop/parity combination up front
        settings.engine.line()?;

        let queue = (settings.engine.queue_max_len > 0)
            .then(|| CommandQueue::new(settings.engine.queue_max_len));
        let exchange = Exchange {
            buffer: ReceptionBuffer::new(settings.engine.input_buffer_capacity()),
            pending: None,
            binary_function: None,
            motion: None,
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                axes: RwLock::new(settings.axes.clone()),
                open: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                queued_mode: AtomicBool::new(false),
                exchange: Mutex::new(exchange),
                writer: tokio::sync::Mutex::new(None),
                queue,
                stats: Mutex::new(TransportStats::new()),
                shutdown: Mutex::new(CancellationToken::new()),
                tasks: Mutex::new(Vec::new()),
                settings,
            }),
        })
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.inner.settings
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Open the configured serial port, optionally overriding port and baud rate
    pub async fn open_serial(&self, port: Option<&str>, baud_rate: Option<u32>) -> BridgeResult<()> {
        let config = SerialTransportConfig::from_settings(&self.inner.settings, port, baud_rate)?;
        self.open(SerialTransport::new(config)?).await
    }

    /// Connect the transport and start the reader task (and queue worker)
    pub async fn open<T: Transport>(&self, mut transport: T) -> BridgeResult<()> {
        if self.is_open() {
            self.close().await;
        }

        let (reader, writer) = match transport.connect().await {
            Ok(halves) => halves,
            Err(err) => {
                self.inner.stats.lock().record_failed_connection();
                error!("Failed to open {}: {}", transport.name(), err);
                return Err(err.into());
            },
        };

        *self.inner.writer.lock().await = Some(writer);
        self.inner.exchange.lock().buffer.clear();

        let shutdown = CancellationToken::new();
        *self.inner.shutdown.lock() = shutdown.clone();
        self.inner.open.store(true, Ordering::Release);
        self.inner.stats.lock().record_successful_connection();

        let mut tasks = vec![tokio::spawn(read_loop(
            self.inner.clone(),
            reader,
            shutdown.clone(),
        ))];
        if self.inner.queue.is_some() {
            tasks.push(tokio::spawn(queue_loop(self.inner.clone(), shutdown)));
        }
        *self.inner.tasks.lock() = tasks;

        info!(
            "Serial engine opened on {} ({})",
            transport.name(),
            transport.transport_type()
        );
        Ok(())
    }

    /// Stop the background tasks and release the port
    pub async fn close(&self) {
        self.inner.shutdown.lock().cancel();
        self.inner.open.store(false, Ordering::Release);

        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        {
            let mut exchange = self.inner.exchange.lock();
            exchange.pending = None;
            exchange.motion = None;
            exchange.buffer.clear();
        }
        self.inner.stats.lock().record_disconnection();
        info!("Serial engine closed");
    }

    /// Submit a command
    ///
    /// In queued mode the command is appended to the queue and the outcome is
    /// `Queued` or `QueueOverflow`. Otherwise it is sent immediately; `Busy`
    /// if another request is in flight.
    pub async fn send(&self, command: Command, mode: SendMode) -> BridgeResult<SerialResponse> {
        self.submit(command, mode, MotionChange::Keep).await
    }

    async fn submit(
        &self,
        command: Command,
        mode: SendMode,
        motion: MotionChange,
    ) -> BridgeResult<SerialResponse> {
        self.inner.ensure_open()?;

        if self.is_queued_mode() {
            let timeout = match mode {
                SendMode::Wait(timeout) => timeout,
                SendMode::NoWait => None,
            };
            return self.inner.enqueue(QueuedCommand {
                command,
                motion,
                timeout,
            });
        }

        self.inner.dispatch(&command, mode, motion).await
    }

    /// Send a Modbus frame and decode its register values
    ///
    /// Read functions return the decoded registers, writes (and queued
    /// submissions) return `[0]`.
    pub async fn send_modbus(&self, frame: ModbusCommand) -> BridgeResult<Vec<u16>> {
        let function = frame.function_code();
        debug!(
            "Modbus request: {} (0x{:02X})",
            function_code_description(function),
            function
        );
        let response = self
            .send(Command::from(frame), SendMode::wait())
            .await?
            .into_result()?;

        if response.code == ResponseCode::Queued || !is_read_function(function) {
            return Ok(vec![0]);
        }
        decode_values_checked(&response.payload)
    }

    pub fn is_queued_mode(&self) -> bool {
        self.inner.queued_mode.load(Ordering::Acquire)
    }

    /// Route every following submission through the command queue
    pub fn set_queued_mode(&self, enabled: bool) -> BridgeResult<()> {
        if enabled && self.inner.queue.is_none() {
            return Err(BridgeError::invalid_config(
                "engine.queue_max_len",
                "command queue is disabled (queue_max_len = 0)",
            ));
        }
        self.inner.queued_mode.store(enabled, Ordering::Release);
        debug!("Queued mode: {}", enabled);
        Ok(())
    }

    /// Commands waiting in (or being dispatched from) the queue
    pub fn queue_len(&self) -> usize {
        self.inner.queue.as_ref().map_or(0, CommandQueue::len)
    }

    /// Block until every queued command has been dispatched
    pub async fn wait_for_queue_drain(&self) {
        if let Some(queue) = &self.inner.queue {
            queue.wait_empty().await;
        }
    }

    /// Progress of the outstanding move, for polling callers
    pub fn moving_position(&self) -> MotionProgress {
        let (axis, stale) = {
            let exchange = self.inner.exchange.lock();
            match exchange.motion.as_ref() {
                None => return MotionProgress::Ended,
                Some(tracker) => (tracker.axis(), tracker.notify_timed_out()),
            }
        };

        if stale {
            return MotionProgress::NotifyTimeout;
        }
        self.inner
            .axes
            .read()
            .get(axis)
            .map_or(MotionProgress::Ended, |settings| {
                MotionProgress::Position(settings.current_position)
            })
    }

    /// Snapshot of one axis
    pub fn axis(&self, letter: char) -> Option<AxisSettings> {
        self.inner.axes.read().get(letter).cloned()
    }

    /// Snapshot of the axis table
    pub fn axes(&self) -> AxisTable {
        self.inner.axes.read().clone()
    }

    pub fn stats(&self) -> TransportStats {
        self.inner.stats.lock().clone()
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.settings.engine.command_timeout_ms)
    }

    fn min_move_notify_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.settings.engine.min_move_notify_timeout_ms)
    }
}

impl Drop for SerialEngine {
    fn drop(&mut self) {
        self.inner.shutdown.lock().cancel();
    }
}

impl std::fmt::Debug for SerialEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialEngine")
            .field("port", &self.inner.settings.port_name)
            .field("open", &self.is_open())
            .field("queued_mode", &self.is_queued_mode())
            .finish()
    }
}

impl EngineInner {
    fn ensure_open(&self) -> BridgeResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BridgeError::PortNotOpen)
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.engine.read_timeout_ms)
    }

    fn enqueue(&self, entry: QueuedCommand) -> BridgeResult<SerialResponse> {
        let Some(queue) = &self.queue else {
            return Err(BridgeError::invalid_config(
                "engine.queue_max_len",
                "command queue is disabled (queue_max_len = 0)",
            ));
        };

        let command = entry.command.to_string();
        match queue.push(entry) {
            Ok(()) => {
                debug!("Queued command={}, pending={}", command, queue.len());
                Ok(SerialResponse::queued())
            },
            Err(BridgeError::QueueOverflow) => {
                warn!("Command queue exceeded, dropped command={}", command);
                Ok(SerialResponse::queue_overflow())
            },
            Err(err) => Err(err),
        }
    }

    /// One request/response exchange under the single-flight flag
    async fn dispatch(
        &self,
        command: &Command,
        mode: SendMode,
        motion: MotionChange,
    ) -> BridgeResult<SerialResponse> {
        self.ensure_open()?;

        let Some(_flight) = FlightGuard::acquire(&self.busy) else {
            debug!("Port busy, rejected command={}", command);
            return Ok(SerialResponse::busy());
        };

        let started = Instant::now();
        let receiver = {
            let mut exchange = self.exchange.lock();
            // No request id on the wire: nothing received so far belongs to this request
            exchange.buffer.clear();
            exchange.binary_function = command.binary_function();

            match motion {
                MotionChange::Keep => {},
                MotionChange::Start(mut tracker) => {
                    tracker.start(started);
                    exchange.motion = Some(tracker);
                },
                MotionChange::Cancel(axis) => {
                    if exchange.motion.as_ref().is_some_and(|t| t.axis() == axis) {
                        exchange.motion = None;
                    }
                },
            }

            match mode {
                SendMode::NoWait => {
                    exchange.pending = None;
                    None
                },
                SendMode::Wait(_) => {
                    let (sender, receiver) = oneshot::channel();
                    exchange.pending = Some(sender);
                    Some(receiver)
                },
            }
        };

        let bytes = command.wire_bytes();
        if let Err(err) = self.write(&bytes).await {
            self.exchange.lock().pending = None;
            error!("command={}, write failed: {}", command, err);
            return Err(err);
        }
        self.stats.lock().record_request(bytes.len());

        let Some(receiver) = receiver else {
            debug!("command={}, no wait", command);
            return Ok(SerialResponse::ok(b"OK".to_vec()));
        };

        let timeout = match mode {
            SendMode::Wait(Some(timeout)) if !timeout.is_zero() => timeout,
            _ => self.read_timeout(),
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(payload)) => {
                let response = SerialResponse::from_device(payload);
                debug!(
                    "command={}, response={}, elapsed={:.2}ms",
                    command,
                    describe_payload(command, &response.payload),
                    started.elapsed().as_secs_f64() * 1000.0
                );
                Ok(response)
            },
            Ok(Err(_)) => Err(TransportError::ConnectionLost(
                "connection closed while waiting for response".to_string(),
            )
            .into()),
            Err(_) => {
                // A late response finds no waiter and is discarded
                self.exchange.lock().pending = None;
                self.stats.lock().record_timeout();
                warn!(
                    "command={}, response=timeout, elapsed={}ms",
                    command,
                    timeout.as_millis()
                );
                Ok(SerialResponse::timeout())
            },
        }
    }

    async fn write(&self, bytes: &[u8]) -> BridgeResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(BridgeError::PortNotOpen)?;
        let write_timeout = Duration::from_millis(self.settings.engine.write_timeout_ms);

        let result = tokio::time::timeout(write_timeout, async {
            writer.write_all(bytes).await?;
            writer.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::SendFailed(e.to_string()).into()),
            Err(_) => Err(TransportError::SendFailed(format!(
                "write timed out after {}ms",
                write_timeout.as_millis()
            ))
            .into()),
        }
    }

    /// Reader task entry point for each chunk from the transport
    fn on_data(&self, chunk: &[u8]) {
        self.stats.lock().record_bytes_received(chunk.len());

        let mut exchange = self.exchange.lock();
        exchange.buffer.append(chunk);
        if !exchange.buffer.is_complete(chunk, exchange.binary_function) {
            return;
        }

        let response = exchange.buffer.take();
        let text = String::from_utf8_lossy(&response).into_owned();

        let now = Instant::now();
        let motion = exchange
            .motion
            .as_mut()
            .map(|tracker| (tracker.axis(), tracker.handle(&text, now)));

        if let Some((axis, update)) = motion {
            if let Some(position) = update.position {
                if let Some(settings) = self.axes.write().get_mut(axis) {
                    settings.current_position = position;
                }
            }

            match update.event {
                MotionEvent::Progress => {
                    debug!("Axis {} progress: {}", axis, text.trim());
                    return;
                },
                MotionEvent::Ended => {
                    debug!("Axis {} move ended", axis);
                    exchange.motion = None;
                },
                MotionEvent::Failed => {
                    warn!("Axis {} move failed: {}", axis, text.trim());
                    exchange.motion = None;
                },
                MotionEvent::Unrelated => {},
            }
        }

        match exchange.pending.take() {
            Some(sender) => {
                let delivered = sender.send(response).is_ok();
                let mut stats = self.stats.lock();
                if delivered {
                    stats.record_response();
                } else {
                    stats.record_discarded();
                }
            },
            None => {
                debug!("Discarding response nobody waits for: {}", text.trim());
                self.stats.lock().record_discarded();
            },
        }
    }
}

fn describe_payload(command: &Command, payload: &[u8]) -> String {
    match command {
        Command::Text(_) => String::from_utf8_lossy(payload).trim().to_string(),
        Command::Binary(_) => describe_binary(payload),
    }
}

async fn read_loop(inner: Arc<EngineInner>, mut reader: TransportReader, shutdown: CancellationToken) {
    let mut chunk = vec![0u8; inner.settings.engine.input_buffer_capacity()];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = reader.read(&mut chunk) => match result {
                Ok(0) => {
                    info!("Device closed the connection");
                    break;
                },
                Ok(n) => inner.on_data(&chunk[..n]),
                Err(e) => {
                    error!("Serial read failed: {}", e);
                    break;
                },
            },
        }
    }

    inner.open.store(false, Ordering::Release);
    inner.exchange.lock().pending = None;
    inner.stats.lock().record_disconnection();
    debug!("Reader task stopped");
}

async fn queue_loop(inner: Arc<EngineInner>, shutdown: CancellationToken) {
    let Some(queue) = inner.queue.as_ref() else {
        return;
    };
    let poll = Duration::from_millis(inner.settings.engine.queue_poll_interval_ms.max(1));

    loop {
        let Some(entry) = queue.front() else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = queue.added() => {},
            }
            continue;
        };

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = inner.dispatch(&entry.command, SendMode::Wait(entry.timeout), entry.motion.clone()) => result,
        };

        match result {
            // A direct command holds the port: keep the entry and retry
            Ok(response) if response.code == ResponseCode::Busy => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll) => {},
                }
            },
            Ok(response) => {
                debug!("Queued command={} done: {:?}", entry.command, response.code);
                queue.complete_front();
            },
            Err(err) => {
                error!("Queued command={} failed: {}", entry.command, err);
                queue.complete_front();
            },
        }
    }

    debug!("Queue worker stopped");
}
