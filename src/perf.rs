//! Opt-in timing scopes and a file-backed debug event log.
//!
//! Both are off by default. Timing scopes report through `tracing` when
//! enabled with [`set_enabled`]; debug events are appended to the file set
//! with [`set_debug_log_path`] and cost a mutex check when disabled.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);
static DEBUG_LOGGER: LazyLock<Mutex<DebugLogger>> =
    LazyLock::new(|| Mutex::new(DebugLogger::new()));

/// Reports its lifetime when dropped, if timing is enabled.
#[derive(Debug)]
pub struct Scope {
    name: &'static str,
    start: Instant,
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(target: "marksync::perf", scope = self.name, elapsed_ms, "perf");
        log_event(self.name, format!("{elapsed_ms:.3} ms"));
    }
}

#[derive(Debug)]
struct DebugLogger {
    enabled: bool,
    start: Instant,
    writer: Option<BufWriter<File>>,
}

impl DebugLogger {
    fn new() -> Self {
        Self {
            enabled: false,
            start: Instant::now(),
            writer: None,
        }
    }
}

// Poisoning is ignored: the logger has no invariant a panic could break.
fn logger() -> MutexGuard<'static, DebugLogger> {
    DEBUG_LOGGER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Turn timing scopes on or off.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Start a timing scope that reports when dropped.
pub fn scope(name: &'static str) -> Scope {
    Scope {
        name,
        start: Instant::now(),
    }
}

/// Returns true if timing scopes are enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Start writing debug events to `path`, or stop when `None`.
///
/// # Errors
/// Returns an error if the log file cannot be created or written.
pub fn set_debug_log_path(path: Option<&Path>) -> std::io::Result<()> {
    let mut logger = logger();
    if let Some(path) = path {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "marksync debug log start")?;
        writer.flush()?;
        logger.enabled = true;
        logger.start = Instant::now();
        logger.writer = Some(writer);
    } else {
        logger.enabled = false;
        logger.writer = None;
    }
    Ok(())
}

/// Returns true if debug events are being written.
pub fn is_debug_log_enabled() -> bool {
    logger().enabled
}

/// Append one event to the debug log, if enabled.
pub fn log_event(name: &str, detail: impl AsRef<str>) {
    let mut logger = logger();
    if !logger.enabled {
        return;
    }
    let elapsed_ms = logger.start.elapsed().as_secs_f64() * 1000.0;
    if let Some(writer) = logger.writer.as_mut() {
        let _ = writeln!(
            writer,
            "[{elapsed_ms:>10.3} ms] {name}: {}",
            detail.as_ref()
        );
        let _ = writer.flush();
    }
}
