//! Marksync - block mapping, scroll sync and stream replay for markdown editors.
//!
//! # Usage
//!
//! ```bash
//! marksync blocks README.md
//! marksync sync README.md --trace scroll.txt --throttle-ms 0
//! marksync replay capture.sse --flush-delay-ms 30
//! marksync --save --throttle-ms 8
//! ```

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use marksync::ai::{
    AiConfig, CompletionRequest, CompletionTransport, Provider, StreamAggregator, StreamSender,
    TransportError,
};
use marksync::blocks::{BlockTable, compute_blocks};
use marksync::config::{
    ConfigFlags, clear_config_flags, global_config_path, load_config_flags, local_override_path,
    save_config_flags,
};
use marksync::perf;
use marksync::sync::{
    DocumentId, Pane, ScrollSurface, ScrollSync, ScrollSyncConfig, SyncOutcome, surface_ref,
};

/// Simulated editor line height.
const EDITOR_LINE_PX: f64 = 20.0;
/// Simulated preview line height; rendered text is taller than source.
const PREVIEW_LINE_PX: f64 = 28.0;
/// Simulated spacing between rendered blocks.
const PREVIEW_BLOCK_GAP_PX: f64 = 16.0;
/// Simulated visible height of both panes.
const VIEWPORT_PX: f64 = 600.0;

/// Scroll sync and streaming AI tooling for markdown editors
#[derive(Parser, Debug)]
#[command(name = "marksync", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Disable editor/preview scroll synchronization
    #[arg(long, global = true)]
    no_sync: bool,

    /// Enable timing logs
    #[arg(long, global = true)]
    perf: bool,

    /// How long the sync lock is held after a programmatic scroll
    #[arg(long, value_name = "MS", global = true)]
    release_ms: Option<u64>,

    /// Minimum spacing between scroll syncs (0 disables)
    #[arg(long, value_name = "MS", global = true)]
    throttle_ms: Option<u64>,

    /// Weight of the block position when aligning scroll targets (0 to 1)
    #[arg(long, value_name = "WEIGHT", global = true)]
    blend_weight: Option<f64>,

    /// Delay before buffered stream text is shown
    #[arg(long, value_name = "MS", global = true)]
    flush_delay_ms: Option<u64>,

    /// Fail completions still running after this long (0 waits forever)
    #[arg(long, value_name = "MS", global = true)]
    timeout_ms: Option<u64>,

    /// Write sync and stream debug events to a file
    #[arg(long, value_name = "PATH", global = true)]
    debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the top-level block table of a markdown file
    Blocks {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Drive scroll sync between a simulated editor and preview of a file.
    ///
    /// Trace lines are `editor <top>`, `preview <top>` or `cursor <offset>`,
    /// each with an optional `@<ms> ` prefix; `#` starts a comment.
    Sync {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Scripted scroll events
        #[arg(long, value_name = "PATH")]
        trace: PathBuf,
    },
    /// Replay a captured completion stream through the aggregator.
    ///
    /// One event per line; an optional `@<ms> ` prefix sets its arrival time.
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

impl From<&Cli> for ConfigFlags {
    fn from(cli: &Cli) -> Self {
        Self {
            no_sync: cli.no_sync,
            perf: cli.perf,
            release_ms: cli.release_ms,
            throttle_ms: cli.throttle_ms,
            blend_weight: cli.blend_weight,
            flush_delay_ms: cli.flush_delay_ms,
            timeout_ms: cli.timeout_ms,
            debug_log: cli.debug_log.clone(),
        }
    }
}

/// Transport that hands the session's sender back to the replay loop.
#[derive(Default)]
struct ReplayTransport {
    sender: Option<StreamSender>,
}

impl CompletionTransport for ReplayTransport {
    fn start(
        &mut self,
        _request: CompletionRequest,
        sender: StreamSender,
    ) -> Result<(), TransportError> {
        self.sender = Some(sender);
        Ok(())
    }

    fn test_connection(&mut self, _config: &AiConfig) -> Result<String, TransportError> {
        Ok("replay transport is always available".to_string())
    }

    fn list_models(&mut self, _config: &AiConfig) -> Result<Vec<String>, TransportError> {
        Ok(Vec::new())
    }
}

/// A pane with fixed geometry standing in for a real editor or preview.
struct TraceSurface {
    top: f64,
    height: f64,
    anchor: Option<usize>,
}

impl TraceSurface {
    const fn new(height: f64) -> Self {
        Self {
            top: 0.0,
            height,
            anchor: None,
        }
    }
}

impl ScrollSurface for TraceSurface {
    fn scroll_top(&self) -> f64 {
        self.top
    }

    fn scroll_height(&self) -> f64 {
        self.height
    }

    fn client_height(&self) -> f64 {
        VIEWPORT_PX
    }

    fn set_scroll_top(&mut self, top: f64) {
        self.top = top.clamp(0.0, self.max_scroll());
    }

    fn anchor_offset(&self) -> Option<usize> {
        self.anchor
    }
}

/// One scripted step of a scroll trace.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ScrollStep {
    /// The user scrolled `pane` to `top`
    Scroll { pane: Pane, top: f64 },
    /// The editor cursor moved to a byte offset
    Cursor(usize),
}

fn parse_scroll_step(event: &str) -> Option<ScrollStep> {
    let (command, value) = event.trim().split_once(char::is_whitespace)?;
    let value = value.trim();
    match command {
        "editor" => value.parse().ok().map(|top| ScrollStep::Scroll {
            pane: Pane::Editor,
            top,
        }),
        "preview" => value.parse().ok().map(|top| ScrollStep::Scroll {
            pane: Pane::Preview,
            top,
        }),
        "cursor" => value.parse().ok().map(ScrollStep::Cursor),
        _ => None,
    }
}

fn pane_heights(source: &str, blocks: &BlockTable) -> (f64, f64) {
    let editor = source.lines().count().max(1) as f64 * EDITOR_LINE_PX;
    let preview = blocks
        .iter()
        .map(|span| {
            let lines = source[span.range()].lines().count().max(1) as f64;
            lines.mul_add(PREVIEW_LINE_PX, PREVIEW_BLOCK_GAP_PX)
        })
        .sum::<f64>()
        .max(PREVIEW_LINE_PX);
    (editor, preview)
}

fn describe(outcome: SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Synced { target, top } => format!("synced target={target:.4} top={top:.1}"),
        other => format!("{other:?}").to_lowercase(),
    }
}

/// Run a scroll trace and return every outcome it printed, echoes included.
fn run_sync_trace(
    source_path: &Path,
    trace_path: &Path,
    config: ScrollSyncConfig,
) -> Result<Vec<SyncOutcome>> {
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read {}", source_path.display()))?;
    let trace = fs::read_to_string(trace_path)
        .with_context(|| format!("Failed to read {}", trace_path.display()))?;

    let blocks = compute_blocks(&source);
    let (editor_height, preview_height) = pane_heights(&source, &blocks);
    let editor = Rc::new(RefCell::new(TraceSurface::new(editor_height)));
    let preview = Rc::new(RefCell::new(TraceSurface::new(preview_height)));
    println!(
        "{} blocks, editor {editor_height:.0}px, preview {preview_height:.0}px",
        blocks.len()
    );

    let mut sync = ScrollSync::new(config);
    let _handle = sync.attach(
        DocumentId::path(source_path),
        surface_ref(&editor),
        surface_ref(&preview),
        blocks,
    );

    let mut outcomes = Vec::new();
    let mut now = 0;
    for (number, line) in trace.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let Some((at_ms, event)) = parse_replay_line(line, now) else {
            continue;
        };
        while let Some(deadline) = sync.next_deadline().filter(|&d| d <= at_ms) {
            if sync.tick(deadline) {
                println!("[{deadline:>6} ms] lock released");
            }
        }
        now = at_ms;

        match parse_scroll_step(event) {
            Some(ScrollStep::Cursor(offset)) => editor.borrow_mut().anchor = Some(offset),
            Some(ScrollStep::Scroll { pane, top }) => {
                let surface = match pane {
                    Pane::Editor => &editor,
                    Pane::Preview => &preview,
                };
                surface.borrow_mut().set_scroll_top(top);
                let outcome = sync.on_scroll(pane, now);
                println!("[{now:>6} ms] {} {top:.1}: {}", pane.label(), describe(outcome));
                outcomes.push(outcome);
                if matches!(outcome, SyncOutcome::Synced { .. }) {
                    // The programmatic write fires a scroll event on the other pane
                    let echo = sync.on_scroll(pane.other(), now);
                    println!("[{now:>6} ms] {} echo: {}", pane.other().label(), describe(echo));
                    outcomes.push(echo);
                }
            }
            None => tracing::warn!(line = number + 1, event, "unrecognised trace line"),
        }
    }

    while let Some(deadline) = sync.next_deadline() {
        if sync.tick(deadline) {
            println!("[{deadline:>6} ms] lock released");
        }
    }
    Ok(outcomes)
}

fn print_blocks(path: &Path) -> Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let table = compute_blocks(&source);
    for span in &table {
        let first_line = source[span.range()].lines().next().unwrap_or_default();
        let preview: String = first_line.chars().take(60).collect();
        println!("{:>4}  {:>7}..{:<7}  {preview}", span.index, span.start, span.end);
    }
    println!("{} blocks", table.len());
    Ok(())
}

/// Split a replay line into its arrival time and event text.
fn parse_replay_line(line: &str, last_ms: u64) -> Option<(u64, &str)> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }
    if let Some(rest) = line.strip_prefix('@') {
        let (ms, event) = rest.split_once(' ').unwrap_or((rest, ""));
        if let Ok(ms) = ms.parse::<u64>() {
            return Some((ms.max(last_ms), event));
        }
    }
    Some((last_ms, line))
}

fn report(ai: &StreamAggregator<ReplayTransport>, shown: &mut usize, at_ms: u64) {
    let text = ai.result_text();
    if text.len() > *shown {
        println!("[{at_ms:>6} ms] +{:?}", &text[*shown..]);
    } else if text.len() < *shown {
        println!("[{at_ms:>6} ms] {text:?}");
    }
    *shown = text.len();
}

fn replay(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let capture = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut ai = StreamAggregator::new(ReplayTransport::default(), flags.stream_config());
    ai.invoke(
        format!("replay {}", path.display()),
        &AiConfig::for_provider(Provider::Ollama),
        0,
    )?;
    let sender = ai
        .transport_mut()
        .sender
        .take()
        .context("replay transport was not started")?;

    let mut now = 0;
    let mut shown = 0;
    for line in capture.lines() {
        let Some((at_ms, event)) = parse_replay_line(line, now) else {
            continue;
        };
        while let Some(deadline) = ai.next_deadline().filter(|&d| d <= at_ms) {
            if ai.poll(deadline) {
                report(&ai, &mut shown, deadline);
            }
        }
        now = at_ms;
        sender.frame(event);
        if ai.poll(now) {
            report(&ai, &mut shown, now);
        }
    }
    sender.close();
    if ai.poll(now) {
        report(&ai, &mut shown, now);
    }

    let view = ai.view();
    if view.loading {
        println!("stream still loading");
    } else {
        println!(
            "done in {} ms, {} chars",
            view.elapsed_ms,
            view.result_text.chars().count()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = ConfigFlags::from(&cli);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    let debug_log_path = effective
        .debug_log
        .clone()
        .or_else(|| std::env::var_os("MARKSYNC_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_debug_log_path(debug_log_path.as_deref()) {
        eprintln!(
            "[warn] Failed to initialize debug log {}: {}",
            debug_log_path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            err
        );
    }

    match cli.command {
        Some(Command::Blocks { file }) => print_blocks(&file),
        Some(Command::Sync { file, trace }) => {
            run_sync_trace(&file, &trace, effective.scroll_sync_config()).map(|_| ())
        }
        Some(Command::Replay { file }) => replay(&file, &effective),
        None => {
            if !cli.save && !cli.clear {
                Cli::command().print_help()?;
            }
            Ok(())
        }
    }
}
