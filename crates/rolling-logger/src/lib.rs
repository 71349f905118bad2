//! Rolling file logger with a circular buffer of recent lines.
//!
//! `init_logger` installs a `tracing` subscriber (records from the `log`
//! facade are bridged) that writes to `<dir>/<app_name>.log`. When the file
//! grows past its size limit it is rotated to `<app_name>.log.1`, older files
//! shift up, and files beyond the retention count are deleted. The most recent
//! lines are also kept in memory for display in the host application.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::MakeWriter;

/// Sink installed by `init_logger`
static GLOBAL: OnceLock<RollingSink> = OnceLock::new();

/// Size and retention limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Rotate once the active file reaches this many bytes
    pub max_file_bytes: u64,
    /// Rotated files kept besides the active one
    pub max_files: usize,
    /// Lines kept in memory
    pub recent_lines: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * 1024 * 1024,
            max_files: 3,
            recent_lines: 500,
        }
    }
}

/// Initialize the global logger with default limits
pub fn init_logger(dir: impl AsRef<Path>, app_name: &str) -> io::Result<()> {
    init_logger_with(dir, app_name, LoggerConfig::default())
}

pub fn init_logger_with(dir: impl AsRef<Path>, app_name: &str, config: LoggerConfig) -> io::Result<()> {
    let sink = RollingSink::open(dir, app_name, config)?;
    if GLOBAL.set(sink.clone()).is_err() {
        return Err(io::Error::new(io::ErrorKind::AlreadyExists, "logger already initialized"));
    }

    tracing_subscriber::fmt()
        .with_writer(sink)
        .with_ansi(false)
        .with_timer(LocalTimer)
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    tracing::info!("logger initialized for {}", app_name);
    log::debug!("log records bridged into {}", sink_display());
    Ok(())
}

/// Write an INFO line straight to the log
pub fn info(message: &str) -> io::Result<()> {
    global()?.write_line("INFO", message)
}

/// Write a WARN line straight to the log
pub fn warn(message: &str) -> io::Result<()> {
    global()?.write_line("WARN", message)
}

/// Write an ERROR line straight to the log
pub fn error(message: &str) -> io::Result<()> {
    global()?.write_line("ERROR", message)
}

/// Up to `limit` most recent lines, oldest first
pub fn recent_lines(limit: usize) -> Vec<String> {
    GLOBAL.get().map(|sink| sink.recent(limit)).unwrap_or_default()
}

/// Path of the active log file, once initialized
pub fn log_path() -> Option<PathBuf> {
    GLOBAL.get().map(RollingSink::path)
}

fn sink_display() -> String {
    log_path().map_or_else(String::new, |path| path.display().to_string())
}

fn global() -> io::Result<&'static RollingSink> {
    GLOBAL
        .get()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "logger not initialized"))
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", timestamp())
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Shared handle to the log file and the recent-lines buffer
#[derive(Clone)]
pub struct RollingSink {
    inner: Arc<Mutex<SinkState>>,
}

struct SinkState {
    dir: PathBuf,
    app_name: String,
    config: LoggerConfig,
    file: File,
    written: u64,
    recent: VecDeque<String>,
    /// Bytes of a line not yet terminated by a newline
    partial: Vec<u8>,
}

impl RollingSink {
    /// Open (or append to) `<dir>/<app_name>.log`, creating `dir` if needed
    pub fn open(dir: impl AsRef<Path>, app_name: &str, config: LoggerConfig) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let path = active_path(&dir, app_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            inner: Arc::new(Mutex::new(SinkState {
                dir,
                app_name: app_name.to_string(),
                config,
                file,
                written,
                recent: VecDeque::new(),
                partial: Vec::new(),
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        match self.inner.lock() {
            Ok(state) => active_path(&state.dir, &state.app_name),
            Err(poisoned) => {
                let state = poisoned.into_inner();
                active_path(&state.dir, &state.app_name)
            }
        }
    }

    /// Append one formatted line
    pub fn write_line(&self, level: &str, message: &str) -> io::Result<()> {
        let line = format!("{} {:>5} {}", timestamp(), level, message);
        self.lock()?.push_line(line)
    }

    pub fn recent(&self, limit: usize) -> Vec<String> {
        let Ok(state) = self.inner.lock() else {
            return Vec::new();
        };
        let skip = state.recent.len().saturating_sub(limit);
        state.recent.iter().skip(skip).cloned().collect()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, SinkState>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink poisoned"))
    }
}

impl SinkState {
    fn push_line(&mut self, line: String) -> io::Result<()> {
        let bytes = line.len() as u64 + 1;
        if self.written > 0 && self.written + bytes > self.config.max_file_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{}", line)?;
        self.written += bytes;

        self.recent.push_back(line);
        while self.recent.len() > self.config.recent_lines {
            self.recent.pop_front();
        }
        Ok(())
    }

    /// app.log -> app.log.1 -> app.log.2 ... ; the oldest beyond `max_files` is removed
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let active = active_path(&self.dir, &self.app_name);

        if self.config.max_files == 0 {
            fs::remove_file(&active)?;
        } else {
            let oldest = rotated_path(&self.dir, &self.app_name, self.config.max_files);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.config.max_files).rev() {
                let from = rotated_path(&self.dir, &self.app_name, index);
                if from.exists() {
                    fs::rename(&from, rotated_path(&self.dir, &self.app_name, index + 1))?;
                }
            }
            fs::rename(&active, rotated_path(&self.dir, &self.app_name, 1))?;
        }

        self.file = OpenOptions::new().create(true).append(true).open(&active)?;
        self.written = 0;
        Ok(())
    }
}

fn active_path(dir: &Path, app_name: &str) -> PathBuf {
    dir.join(format!("{}.log", app_name))
}

fn rotated_path(dir: &Path, app_name: &str, index: usize) -> PathBuf {
    dir.join(format!("{}.log.{}", app_name, index))
}

// ============================================================================
// tracing-subscriber integration
// ============================================================================

impl<'a> MakeWriter<'a> for RollingSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Writer handed to the fmt layer; splits output into lines
pub struct SinkWriter {
    inner: Arc<Mutex<SinkState>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink poisoned"))?;
        state.partial.extend_from_slice(buf);
        while let Some(end) = state.partial.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = state.partial.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]).into_owned();
            state.push_line(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink poisoned"))?;
        state.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> LoggerConfig {
        LoggerConfig {
            max_file_bytes: 200,
            max_files: 2,
            recent_lines: 3,
        }
    }

    #[test]
    fn test_lines_reach_file_and_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RollingSink::open(dir.path(), "app", LoggerConfig::default()).unwrap();
        sink.write_line("INFO", "hello").unwrap();
        sink.write_line("ERROR", "boom").unwrap();

        let contents = fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(contents.contains(" INFO hello"));
        assert!(contents.contains("ERROR boom"));

        let recent = sink.recent(1);
        assert_eq!(recent.len(), 1);
        assert!(recent[0].ends_with("boom"));
    }

    #[test]
    fn test_recent_buffer_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RollingSink::open(dir.path(), "app", small()).unwrap();
        for i in 0..10 {
            sink.write_line("INFO", &format!("line {}", i)).unwrap();
        }
        let recent = sink.recent(100);
        assert_eq!(recent.len(), 3);
        assert!(recent[2].ends_with("line 9"));
    }

    #[test]
    fn test_rotation_keeps_limited_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RollingSink::open(dir.path(), "app", small()).unwrap();
        for i in 0..40 {
            sink.write_line("INFO", &format!("a fairly long message number {}", i)).unwrap();
        }

        assert!(dir.path().join("app.log").exists());
        assert!(dir.path().join("app.log.1").exists());
        assert!(dir.path().join("app.log.2").exists());
        assert!(!dir.path().join("app.log.3").exists());
        let active = fs::metadata(dir.path().join("app.log")).unwrap().len();
        assert!(active <= 200);
    }

    #[test]
    fn test_writer_splits_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RollingSink::open(dir.path(), "app", LoggerConfig::default()).unwrap();
        let mut writer = sink.make_writer();
        writer.write_all(b"first\nsec").unwrap();
        writer.write_all(b"ond\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(sink.recent(10), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sink = RollingSink::open(dir.path(), "app", LoggerConfig::default()).unwrap();
            sink.write_line("INFO", "before").unwrap();
        }
        let sink = RollingSink::open(dir.path(), "app", LoggerConfig::default()).unwrap();
        sink.write_line("INFO", "after").unwrap();

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert!(contents.contains("before"));
        assert!(contents.contains("after"));
    }
}
