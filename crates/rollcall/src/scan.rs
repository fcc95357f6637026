//! Live scanning: turn a stream of detected faces into one attendance mark.
//!
//! A [`FrameSource`] produces [`Frame`]s (the faces found in one camera
//! frame). A forwarder task pushes them into a bounded channel and a
//! [`ScanSession`] consumes them, recognising the first face of each frame
//! until a student is marked, the source runs dry or the session is stopped
//! through its [`ScanHandle`]. Recognition attempts never overlap: frames
//! arriving while one is in flight are dropped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::attendance::{AttendanceBackend, AttendanceService, Recognition};
use crate::embedding::Embedding;
use crate::error::{Error, Result};

/// The faces detected in one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Face embeddings, in detector order.
    pub faces: Vec<Embedding>,
}

impl Frame {
    /// Create a frame from detected faces.
    #[must_use]
    pub fn new(faces: Vec<Embedding>) -> Self {
        Self { faces }
    }

    /// The face used for recognition.
    #[must_use]
    pub fn primary(&self) -> Option<&Embedding> {
        self.faces.first()
    }

    /// Whether no face was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// What the scanning screen shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScanStatus {
    /// Not scanning.
    #[default]
    Idle,
    /// Waiting for a recognisable face.
    Scanning,
    /// A student was marked present.
    Success {
        /// Student name.
        student_name: String,
        /// Roll number.
        roll_number: String,
        /// Class name, or "Unknown".
        class_name: String,
        /// Match distance.
        distance: f32,
    },
    /// The recognised student was already marked today.
    AlreadyMarked {
        /// Student name.
        student_name: String,
    },
    /// Scanning stopped on an error.
    Error(String),
}

impl ScanStatus {
    /// Back to [`ScanStatus::Idle`].
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }

    /// Whether this status ends a session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::AlreadyMarked { .. } | Self::Error(_)
        )
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Success {
                student_name,
                roll_number,
                class_name,
                ..
            } => write!(
                f,
                "attendance marked for {student_name} (roll {roll_number}, class {class_name})"
            ),
            Self::AlreadyMarked { student_name } => {
                write!(f, "attendance already marked today for {student_name}")
            }
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Progress notifications from a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A frame had no face; ask the subject to face the camera.
    NoFace,
    /// A recognition attempt finished.
    Recognized(Recognition),
    /// Scanning stopped on an error.
    Failed(String),
}

/// A producer of detection frames.
///
/// Implementors wrap whatever produces face embeddings (a camera plus a
/// detector, a recorded file, a test fixture).
#[async_trait]
pub trait FrameSource: Send {
    /// The next frame, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot produce a valid frame.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// A handle to control a scan session.
///
/// This is a lightweight, cloneable handle that can be used from other tasks.
#[derive(Debug, Clone, Default)]
pub struct ScanHandle {
    stop_signal: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
    wake: Arc<Notify>,
}

impl ScanHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the session to stop.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Reset the stop signal and counters.
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        self.dropped.store(0, Ordering::SeqCst);
    }

    /// Whether a recognition attempt is running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Frames discarded because an attempt was running or the queue was full.
    #[must_use]
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    fn set_in_flight(&self, value: bool) {
        self.in_flight.store(value, Ordering::SeqCst);
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Final status.
    pub status: ScanStatus,
    /// Frames taken off the queue.
    pub frames: usize,
    /// Recognition attempts made.
    pub attempts: usize,
    /// Frames dropped before reaching the session.
    pub dropped: usize,
}

/// Drives recognition over a frame source.
#[derive(Debug)]
pub struct ScanSession<B> {
    service: AttendanceService<B>,
    handle: ScanHandle,
    queue: usize,
    status: ScanStatus,
    events: Option<mpsc::Sender<ScanEvent>>,
}

impl<B: AttendanceBackend> ScanSession<B> {
    /// Create a session with a frame queue of `queue` entries.
    #[must_use]
    pub fn new(service: AttendanceService<B>, queue: usize) -> Self {
        Self {
            service,
            handle: ScanHandle::new(),
            queue: queue.max(1),
            status: ScanStatus::Idle,
            events: None,
        }
    }

    /// Send progress notifications to `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<ScanEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// A handle for stopping this session from elsewhere.
    #[must_use]
    pub fn handle(&self) -> ScanHandle {
        self.handle.clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> &ScanStatus {
        &self.status
    }

    /// Clear a finished session so it can scan again.
    pub fn reset(&mut self) {
        self.status.reset();
        self.handle.reset();
    }

    /// The underlying service.
    #[must_use]
    pub fn service(&self) -> &AttendanceService<B> {
        &self.service
    }

    /// Scan using the local clock for attendance timestamps.
    pub async fn run<S>(&mut self, source: S) -> ScanReport
    where
        S: FrameSource + 'static,
    {
        self.run_with_clock(source, || Local::now().naive_local())
            .await
    }

    /// Scan until a student is marked, the source ends, an error occurs or
    /// the handle is stopped.
    ///
    /// `clock` is read once per recognition attempt.
    pub async fn run_with_clock<S, C>(&mut self, source: S, mut clock: C) -> ScanReport
    where
        S: FrameSource + 'static,
        C: FnMut() -> NaiveDateTime,
    {
        let (tx, mut rx) = mpsc::channel(self.queue);
        let producer = tokio::spawn(forward_frames(source, tx, self.handle.clone()));

        self.status = ScanStatus::Scanning;
        let mut frames = 0;
        let mut attempts = 0;
        info!("Scan session started");

        loop {
            if self.handle.should_stop() {
                break;
            }
            let item = tokio::select! {
                item = rx.recv() => item,
                () = self.handle.wake.notified() => continue,
            };
            let Some(item) = item else {
                debug!("Frame source exhausted");
                break;
            };
            frames += 1;

            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    self.fail(e.to_string()).await;
                    break;
                }
            };
            let Some(face) = frame.primary() else {
                debug!("No face in frame");
                self.emit(ScanEvent::NoFace).await;
                continue;
            };

            attempts += 1;
            self.handle.set_in_flight(true);
            let attempt = self.service.recognize_and_mark(face, clock());
            self.handle.set_in_flight(false);

            match attempt {
                Ok(recognition) => {
                    let next = status_after(&recognition);
                    self.emit(ScanEvent::Recognized(recognition)).await;
                    if let Some(status) = next {
                        self.status = status;
                        break;
                    }
                }
                Err(e) => {
                    self.fail(e.to_string()).await;
                    break;
                }
            }
        }

        producer.abort();
        if !self.status.is_terminal() {
            self.status = ScanStatus::Idle;
        }
        info!("Scan session ended: {}", self.status);

        ScanReport {
            status: self.status.clone(),
            frames,
            attempts,
            dropped: self.handle.dropped_frames(),
        }
    }

    async fn fail(&mut self, message: String) {
        warn!("Scan failed: {}", message);
        self.emit(ScanEvent::Failed(message.clone())).await;
        self.status = ScanStatus::Error(message);
    }

    async fn emit(&self, event: ScanEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is watching
            let _ = tx.send(event).await;
        }
    }
}

fn status_after(recognition: &Recognition) -> Option<ScanStatus> {
    match recognition {
        Recognition::NoMatch { .. } => None,
        Recognition::Marked {
            student, distance, ..
        } => Some(ScanStatus::Success {
            student_name: student.name.clone(),
            roll_number: student.roll_number.clone(),
            class_name: student.class_label().to_string(),
            distance: *distance,
        }),
        Recognition::AlreadyMarked { student, .. } => Some(ScanStatus::AlreadyMarked {
            student_name: student.name.clone(),
        }),
    }
}

/// Pull frames from `source` into `tx` until the source ends or the session
/// goes away. Frames arriving while an attempt is in flight, or while the
/// queue is full, are dropped. Source errors are always delivered.
async fn forward_frames<S: FrameSource>(
    mut source: S,
    tx: mpsc::Sender<Result<Frame>>,
    handle: ScanHandle,
) {
    loop {
        if handle.should_stop() {
            break;
        }
        match source.next_frame().await {
            Ok(Some(frame)) => {
                if handle.is_in_flight() {
                    handle.record_drop();
                    continue;
                }
                match tx.try_send(Ok(frame)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => handle.record_drop(),
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

/// Reads frames as JSON lines: each line is an array of embeddings
/// (`[[0.1, ...], ...]`); `[]` is a frame with no face. Blank lines are
/// ignored.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    dimensions: usize,
    line_number: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    /// Read frames from `reader`, validating each embedding's length.
    pub fn new(reader: R, dimensions: usize) -> Self {
        Self {
            lines: reader.lines(),
            dimensions,
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> FrameSource for JsonLinesSource<R> {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: Vec<Vec<f32>> = serde_json::from_str(line)?;
            let faces = raw
                .into_iter()
                .map(|values| Embedding::new(values, self.dimensions))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| match e {
                    Error::InvalidEmbedding { message } => {
                        Error::invalid_embedding(format!("line {}: {message}", self.line_number))
                    }
                    other => other,
                })?;
            return Ok(Some(Frame::new(faces)));
        }
        Ok(None)
    }
}
