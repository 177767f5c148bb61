use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::ai::StreamConfig;
use crate::sync::ScrollSyncConfig;

const APP_DIR: &str = "marksync";
const LOCAL_FILE: &str = ".marksyncrc";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigFlags {
    pub no_sync: bool,
    pub perf: bool,
    pub release_ms: Option<u64>,
    pub throttle_ms: Option<u64>,
    pub blend_weight: Option<f64>,
    pub flush_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    /// Merge `other` over `self`: booleans are OR-ed, `other`'s values win.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            no_sync: self.no_sync || other.no_sync,
            perf: self.perf || other.perf,
            release_ms: other.release_ms.or(self.release_ms),
            throttle_ms: other.throttle_ms.or(self.throttle_ms),
            blend_weight: other.blend_weight.or(self.blend_weight),
            flush_delay_ms: other.flush_delay_ms.or(self.flush_delay_ms),
            timeout_ms: other.timeout_ms.or(self.timeout_ms),
            debug_log: other.debug_log.clone().or_else(|| self.debug_log.clone()),
        }
    }

    /// Scroll synchronizer settings, with defaults for anything unset.
    pub fn scroll_sync_config(&self) -> ScrollSyncConfig {
        let defaults = ScrollSyncConfig::default();
        ScrollSyncConfig {
            enabled: !self.no_sync,
            release_ms: self.release_ms.unwrap_or(defaults.release_ms),
            throttle_ms: self.throttle_ms.unwrap_or(defaults.throttle_ms),
            blend_weight: self
                .blend_weight
                .filter(|w| w.is_finite())
                .map_or(defaults.blend_weight, |w| w.clamp(0.0, 1.0)),
            ..defaults
        }
    }

    /// Stream aggregator settings. A timeout of 0 means none.
    pub fn stream_config(&self) -> StreamConfig {
        let defaults = StreamConfig::default();
        StreamConfig {
            flush_delay_ms: self.flush_delay_ms.unwrap_or(defaults.flush_delay_ms),
            timeout_ms: self.timeout_ms.filter(|&t| t > 0),
        }
    }

    fn apply_value(&mut self, flag: &str, value: &str) {
        match flag {
            "--release-ms" => self.release_ms = parse_number(flag, value),
            "--throttle-ms" => self.throttle_ms = parse_number(flag, value),
            "--blend-weight" => self.blend_weight = parse_number(flag, value),
            "--flush-delay-ms" => self.flush_delay_ms = parse_number(flag, value),
            "--timeout-ms" => self.timeout_ms = parse_number(flag, value),
            "--debug-log" => self.debug_log = Some(PathBuf::from(value)),
            _ => {}
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR).join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join(APP_DIR)
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR).join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR).join("config");
        }
    }

    PathBuf::from(LOCAL_FILE)
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(LOCAL_FILE)
}

/// Read a flag file. A missing file yields default flags.
///
/// # Errors
/// Returns an error if the file exists but cannot be read.
pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

/// Write `flags` as a flag file, creating parent directories.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# marksync defaults (saved with --save)".to_string()];
    if flags.no_sync {
        lines.push("--no-sync".to_string());
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    let valued = [
        ("--release-ms", flags.release_ms.map(|v| v.to_string())),
        ("--throttle-ms", flags.throttle_ms.map(|v| v.to_string())),
        ("--blend-weight", flags.blend_weight.map(|v| v.to_string())),
        ("--flush-delay-ms", flags.flush_delay_ms.map(|v| v.to_string())),
        ("--timeout-ms", flags.timeout_ms.map(|v| v.to_string())),
        (
            "--debug-log",
            flags.debug_log.as_ref().map(|p| p.display().to_string()),
        ),
    ];
    for (flag, value) in valued {
        if let Some(value) = value {
            lines.push(format!("{flag} {value}"));
        }
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

/// Delete a flag file if present.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pick the known flags out of a token list; everything else is ignored.
///
/// Valued flags accept both `--flag value` and `--flag=value`.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let (flag, inline) = match token.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (token, None),
        };
        match flag {
            "--no-sync" => flags.no_sync = true,
            "--perf" => flags.perf = true,
            "--release-ms" | "--throttle-ms" | "--blend-weight" | "--flush-delay-ms"
            | "--timeout-ms" | "--debug-log" => {
                let value = match inline {
                    Some(value) => Some(value),
                    None => {
                        let next = tokens.get(i + 1).map(String::as_str);
                        if next.is_some() {
                            i += 1;
                        }
                        next
                    }
                };
                if let Some(value) = value {
                    flags.apply_value(flag, value);
                }
            }
            _ => {}
        }
        i += 1;
    }
    flags
}

fn parse_number<T>(flag: &str, value: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!(flag, value, %err, "ignoring invalid config value");
            None
        }
    }
}
