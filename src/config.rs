//! File configuration for CLI defaults.
//!
//! The file is a flat list of `key = value` lines; strings are double-quoted,
//! `#` starts a comment. Command-line flags take precedence over file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::download::constants::MAX_CHUNK_SIZE;

/// Directory name under the user config root.
const CONFIG_DIR_NAME: &str = "playlist-dl";

/// Defaults read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default output directory for downloaded items.
    pub output_dir: Option<PathBuf>,
    /// Bytes read per transfer-loop iteration.
    pub chunk_size: Option<usize>,
    /// Preferred vertical resolution.
    pub preferred_quality: Option<u32>,
    /// Prefer separate audio/video streams and remux them.
    pub dash: Option<bool>,
    /// ffmpeg executable used for remuxing.
    pub ffmpeg_path: Option<PathBuf>,
    /// Directory for the rotating application and remux logs.
    pub log_dir: Option<PathBuf>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP idle read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates values against runtime and CLI constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first field that is out of range.
    pub fn validate(&self) -> Result<()> {
        if let Some(chunk_size) = self.chunk_size
            && !(1..=MAX_CHUNK_SIZE).contains(&chunk_size)
        {
            bail!(
                "Invalid config value for `chunk_size`: {chunk_size}. Expected range: 1..={MAX_CHUNK_SIZE}"
            );
        }

        if let Some(quality) = self.preferred_quality
            && !(1..=4320).contains(&quality)
        {
            bail!("Invalid config value for `preferred_quality`: {quality}. Expected range: 1..=4320");
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Where the configuration came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed values; defaults when no file exists.
    pub config: FileConfig,
    /// Whether a file was read.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/playlist-dl/config.toml`
/// 2. `$HOME/.config/playlist-dl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` if given, else from the default path if present.
///
/// # Errors
///
/// Returns an error if an explicit path is missing, or if an existing file
/// cannot be read, parsed, or validated.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Parses the contents of a config file.
///
/// # Errors
///
/// Returns an error on unknown keys, malformed lines, or invalid values.
pub fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "chunk_size" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("chunk_size out of range for usize"))?;
                cfg.chunk_size = Some(n);
            }
            "preferred_quality" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("preferred_quality out of range for u32"))?;
                cfg.preferred_quality = Some(n);
            }
            "dash" => {
                cfg.dash = Some(parse_boolean(value).with_context(invalid)?);
            }
            "ffmpeg_path" => {
                cfg.ffmpeg_path = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "log_dir" => {
                cfg.log_dir = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
