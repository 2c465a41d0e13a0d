use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of records the console can replay
pub const LOG_HISTORY_CAPACITY: usize = 200;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LogMessage {
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp: String,
}

impl LogMessage {
    fn from_record(record: &Record) -> Self {
        Self {
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        }
    }
}

/// Bounded ring of recent log records. Cloning yields another handle to
/// the same ring.
#[derive(Clone)]
pub struct LogHistory {
    messages: Arc<Mutex<VecDeque<LogMessage>>>,
    capacity: usize,
}

impl LogHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, message: LogMessage) {
        if self.capacity == 0 {
            return;
        }
        let mut messages = self.lock();
        while messages.len() >= self.capacity {
            messages.pop_front();
        }
        messages.push_back(message);
    }

    /// Up to `count` of the newest records, oldest first.
    pub fn recent(&self, count: usize) -> Vec<LogMessage> {
        let messages = self.lock();
        let skip = messages.len().saturating_sub(count);
        messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writes through env_logger and keeps a copy of every record in a [`LogHistory`].
pub struct ConsoleLogger {
    inner: env_logger::Logger,
    history: LogHistory,
}

impl ConsoleLogger {
    /// Installs the logger. `RUST_LOG` overrides `default_level`.
    pub fn init(default_level: LevelFilter) -> Result<LogHistory, SetLoggerError> {
        let inner = env_logger::Builder::new()
            .filter_level(default_level)
            .parse_default_env()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    Local::now().to_rfc3339(),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .build();
        let max_level = inner.filter();
        let history = LogHistory::new(LOG_HISTORY_CAPACITY);

        let logger: &'static ConsoleLogger = Box::leak(Box::new(ConsoleLogger {
            inner,
            history: history.clone(),
        }));
        log::set_logger(logger).map(|()| log::set_max_level(max_level))?;
        Ok(history)
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.inner.matches(record) {
            self.inner.log(record);
            self.history.push(LogMessage::from_record(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
