use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, OnceLock};

const LOG_LEVEL_VAR: &str = "CORRAL_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Silent,
}

impl LogLevel {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "silent" => Some(LogLevel::Silent),
            _ => None,
        }
    }
}

fn level() -> LogLevel {
    static LEVEL: OnceLock<LogLevel> = OnceLock::new();
    *LEVEL.get_or_init(|| {
        env::var(LOG_LEVEL_VAR)
            .ok()
            .and_then(|value| LogLevel::parse(&value))
            .unwrap_or(LogLevel::Info)
    })
}

fn use_color() -> bool {
    static USE_COLOR: OnceLock<bool> = OnceLock::new();
    *USE_COLOR.get_or_init(|| env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal())
}

fn paint(code: &str, text: &str) -> String {
    if use_color() {
        format!("\u{1b}[{}m{}\u{1b}[0m", code, text)
    } else {
        text.to_string()
    }
}

pub fn dim(text: &str) -> String {
    paint("2", text)
}

pub fn yellow(text: &str) -> String {
    paint("33", text)
}

pub fn red(text: &str) -> String {
    paint("31", text)
}

/// Per-package log sink. Lines are buffered until `flush` so output from
/// packages running concurrently is emitted in whole blocks rather than
/// interleaved line by line.
#[derive(Debug, Default)]
pub struct PackageLogger {
    tag: Option<String>,
    buffer: Mutex<String>,
}

impl PackageLogger {
    pub fn new(tag: Option<String>) -> Self {
        PackageLogger {
            tag,
            buffer: Mutex::new(String::new()),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn prefix(&self) -> String {
        match self.tag.as_deref() {
            Some(tag) if !tag.is_empty() => dim(&format!("[{}] ", tag)),
            _ => String::new(),
        }
    }

    fn push(&self, line: &str) {
        let prefix = self.prefix();

        if let Ok(mut buffer) = self.buffer.lock() {
            for part in line.lines() {
                buffer.push_str(&prefix);
                buffer.push_str(part);
                buffer.push('\n');
            }
        }
    }

    pub fn info(&self, message: &str) {
        if level() <= LogLevel::Info {
            self.push(message);
        }
    }

    pub fn warn(&self, message: &str) {
        if level() <= LogLevel::Warn {
            self.push(&yellow(&format!("<warn> {}", message)));
        }
    }

    pub fn error(&self, message: &str) {
        if level() <= LogLevel::Error {
            self.push(&red(&format!("<error> {}", message)));
        }
    }

    /// Write everything buffered so far to stderr as one block.
    pub fn flush(&self) {
        let pending = match self.buffer.lock() {
            Ok(mut buffer) if !buffer.is_empty() => std::mem::take(&mut *buffer),
            _ => return,
        };

        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = handle.write_all(pending.as_bytes());
        let _ = handle.flush();
    }
}
