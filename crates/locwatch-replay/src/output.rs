//! JSON-lines event output.
//!
//! Every delegate callback and every platform request the engine makes is
//! written as one JSON object per line, so a replay can be diffed against an
//! expected transcript.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use locwatch_core::{
    AuthorizationStatus, LocationDelegate, LocationError, LocationSnapshot, ModeState,
    MonitoredRegion, MonitoringMode, SnapshotRecord,
};

/// A request the engine issued to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum PlatformCall {
    /// Authorization prompt.
    RequestAuthorization {
        /// Whether "always" authorization was asked for.
        always: bool,
    },
    /// Start of a monitoring mode.
    StartUpdates {
        /// Mode being started.
        mode: MonitoringMode,
        /// Generation to confirm with.
        generation: u64,
    },
    /// Stop of a monitoring mode.
    StopUpdates {
        /// Mode being stopped.
        mode: MonitoringMode,
    },
    /// Start watching a region.
    StartRegion {
        /// Region identifier.
        identifier: String,
        /// Radius in meters.
        radius: f64,
    },
    /// Stop watching a region.
    StopRegion {
        /// Region identifier.
        identifier: String,
    },
}

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutputRecord {
    /// Accepted fixes or a visit.
    DeviceUpdate {
        /// Flat snapshot records.
        snapshots: Vec<SnapshotRecord>,
        /// Whether the app was in the background.
        in_background: bool,
    },
    /// A region boundary event.
    RegionUpdate {
        /// The region concerned.
        region: MonitoredRegion,
        /// The region snapshot.
        snapshot: SnapshotRecord,
        /// Whether the app was in the background.
        in_background: bool,
    },
    /// New authorization status.
    AuthorizationChange {
        /// The status.
        status: AuthorizationStatus,
    },
    /// Asynchronous error forwarded by the engine.
    Error {
        /// Machine-readable code, when an error value was supplied.
        code: Option<String>,
        /// Error text.
        message: Option<String>,
        /// Whether the error concerns geofences.
        in_geo: bool,
    },
    /// State of a mode after a start step.
    ModeState {
        /// The mode.
        mode: MonitoringMode,
        /// Its state.
        state: ModeState,
    },
    /// A platform request.
    Platform {
        /// The request.
        call: PlatformCall,
    },
    /// A direct call made by a step returned an error.
    StepError {
        /// Zero-based step index.
        step: usize,
        /// Step name.
        name: String,
        /// Machine-readable code.
        code: String,
        /// Error text.
        message: String,
    },
    /// End of the replay.
    Summary {
        /// Steps executed.
        steps: usize,
        /// Steps that returned an error.
        step_errors: usize,
    },
}

/// In-memory output buffer, shared with an [`EventSink`].
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

struct BufferWriter(SharedBuffer);

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Thread-safe line writer for [`OutputRecord`]s.
#[derive(Clone)]
pub struct EventSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EventSink {
    /// Write to an arbitrary writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write to a buffer the caller can read back.
    #[must_use]
    pub fn memory() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(BufferWriter(Arc::clone(&buffer))), buffer)
    }

    /// Write one record as a JSON line.
    ///
    /// Output failures are logged and otherwise ignored; a replay never stops
    /// because its output is gone.
    pub fn emit(&self, record: &OutputRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(error) => {
                warn!(error = %error, "Failed to encode output record");
                return;
            }
        };

        let mut writer = self.writer.lock();
        if let Err(error) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!(error = %error, "Failed to write output record");
        }
    }
}

/// Parse the lines written to a [`SharedBuffer`].
///
/// # Errors
///
/// Returns an error if the buffer is not UTF-8 or a line is not a record.
pub fn read_records(buffer: &SharedBuffer) -> anyhow::Result<Vec<OutputRecord>> {
    let bytes = buffer.lock().clone();
    let text = String::from_utf8(bytes)?;
    text.lines()
        .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
        .collect()
}

/// Delegate that writes every callback to an [`EventSink`].
#[derive(Clone)]
pub struct JsonLinesDelegate {
    sink: EventSink,
}

impl JsonLinesDelegate {
    /// Create a delegate writing to `sink`.
    #[must_use]
    pub const fn new(sink: EventSink) -> Self {
        Self { sink }
    }
}

impl LocationDelegate for JsonLinesDelegate {
    fn on_device_update(&self, snapshots: &[LocationSnapshot], in_background: bool) {
        self.sink.emit(&OutputRecord::DeviceUpdate {
            snapshots: snapshots.iter().map(LocationSnapshot::to_record).collect(),
            in_background,
        });
    }

    fn on_region_update(
        &self,
        region: &MonitoredRegion,
        snapshot: &LocationSnapshot,
        in_background: bool,
    ) {
        self.sink.emit(&OutputRecord::RegionUpdate {
            region: region.clone(),
            snapshot: snapshot.to_record(),
            in_background,
        });
    }

    fn on_authorization_change(&self, status: AuthorizationStatus) {
        self.sink.emit(&OutputRecord::AuthorizationChange { status });
    }

    fn on_error(&self, error: Option<&LocationError>, message: Option<&str>, in_geo: bool) {
        self.sink.emit(&OutputRecord::Error {
            code: error.map(|e| e.error_code().to_string()),
            message: message.map(str::to_string),
            in_geo,
        });
    }
}
