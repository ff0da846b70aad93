//! Structured JSON-line logging shared by the registry, container, and
//! diagnostics listeners. Sinks are best-effort: a failing sink never
//! disturbs protocol traffic.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub type LogFields = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub ts_ms: u128,
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "LogFields::is_empty", default)]
    pub fields: LogFields,
}

impl LogEvent {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ts_ms: current_ms(),
            level,
            target: target.into(),
            message: message.into(),
            fields: LogFields::new(),
        }
    }

    pub fn with_fields(
        level: LogLevel,
        target: impl Into<String>,
        message: impl Into<String>,
        fields: LogFields,
    ) -> Self {
        Self {
            fields,
            ..Self::new(level, target, message)
        }
    }
}

fn current_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub type LoggingResult<T> = std::result::Result<T, LoggingError>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait LogSink: Send + Sync {
    fn log(&self, event: &LogEvent) -> LoggingResult<()>;
}

/// Cheaply cloneable logger handle over a shared sink.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    min_level: LogLevel,
}

impl Logger {
    pub fn new<S>(sink: S) -> Self
    where
        S: LogSink + 'static,
    {
        Self {
            sink: Arc::new(sink),
            min_level: LogLevel::Trace,
        }
    }

    /// Discard events below `level` before they reach the sink.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn log(&self, level: LogLevel, target: &str, message: &str) -> LoggingResult<()> {
        self.log_event(LogEvent::new(level, target, message))
    }

    pub fn log_event(&self, event: LogEvent) -> LoggingResult<()> {
        if event.level < self.min_level {
            return Ok(());
        }
        self.sink.log(&event)
    }
}

/// Append-only JSON-line file sink with size-based truncation.
pub struct FileSink {
    path: PathBuf,
    max_bytes: u64,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>, max_bytes: u64) -> LoggingResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            max_bytes,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_line(&self, mut line: String) -> LoggingResult<()> {
        line.push('\n');
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if self.should_rotate(guard.get_ref(), line.len() as u64)? {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?;
            *guard = BufWriter::new(file);
        }

        guard.write_all(line.as_bytes())?;
        guard.flush()?;
        Ok(())
    }

    fn should_rotate(&self, file: &File, incoming_len: u64) -> std::io::Result<bool> {
        if self.max_bytes == 0 {
            return Ok(false);
        }
        let current = file.metadata()?.len();
        Ok(current + incoming_len > self.max_bytes)
    }
}

impl LogSink for FileSink {
    fn log(&self, event: &LogEvent) -> LoggingResult<()> {
        let line = serde_json::to_string(event)?;
        self.write_line(line)
    }
}

/// In-memory sink, inspectable after the fact. Intended for tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn is_empty(&self) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl LogSink for MemorySink {
    fn log(&self, event: &LogEvent) -> LoggingResult<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

pub fn event_with_fields(
    level: LogLevel,
    target: &str,
    message: &str,
    fields: impl IntoIterator<Item = (String, Value)>,
) -> LogEvent {
    let mut map = LogFields::new();
    for (k, v) in fields.into_iter() {
        map.insert(k, v);
    }
    LogEvent::with_fields(level, target, message, map)
}

pub fn json_kv(key: &str, value: impl Into<Value>) -> (String, Value) {
    (key.to_string(), value.into())
}
