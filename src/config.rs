use std::fs;
use std::path::{Path, PathBuf};

/// Typed view over the daemon's key/value configuration file.
///
/// The file format is line based: `key = value`, `#` starts a comment,
/// blank lines are ignored. Values may be bare or wrapped in double quotes;
/// surrounding whitespace is stripped either way. `music-dir` may repeat —
/// each occurrence appends to [`Config::music_dirs`].
#[derive(Debug, Clone)]
pub struct Config {
    pub listening_address: String,
    pub listening_port: u16,
    pub document_root: PathBuf,
    pub database_path: PathBuf,
    /// `0` means "auto" (`max(1, cpu_count - 1)`), resolved by the scheduler.
    pub scheduler_threads: usize,
    pub music_dirs: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listening_address: "0.0.0.0".to_string(),
            listening_port: 8080,
            document_root: PathBuf::from("./public"),
            database_path: PathBuf::from("./sonance.db"),
            scheduler_threads: 0,
            music_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration line {line_no}: {line}")]
    MalformedLine { line_no: usize, line: String },

    #[error("configuration must list at least one music-dir")]
    NoMusicDir,

    #[error("invalid value for listening-port: {0}")]
    InvalidPort(String),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Config::default();

        for (line_no, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = split_key_value(line) else {
                return Err(ConfigError::MalformedLine {
                    line_no: line_no + 1,
                    line: raw_line.to_string(),
                });
            };

            match key {
                "listening-address" => config.listening_address = value.to_string(),
                "listening-port" => {
                    config.listening_port = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidPort(value.to_string()))?;
                }
                "document-root" => config.document_root = PathBuf::from(value),
                "database-path" => config.database_path = PathBuf::from(value),
                "scheduler-threads" => {
                    config.scheduler_threads = value.parse().unwrap_or(0);
                }
                "music-dir" => config.music_dirs.push(PathBuf::from(value)),
                unknown => {
                    log::warn!("Ignoring unrecognized configuration key: {unknown}");
                }
            }
        }

        if config.music_dirs.is_empty() {
            return Err(ConfigError::NoMusicDir);
        }

        Ok(config)
    }
}

/// Splits a non-comment, non-blank line on its first `=`, trimming
/// whitespace and a single layer of surrounding double quotes from the
/// value. Mirrors the original daemon's `cfg.c` line parser.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let eq = line.find('=')?;
    let key = line[..eq].trim();
    let mut value = line[eq + 1..].trim();

    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    }

    if key.is_empty() {
        return None;
    }

    Some((key, value))
}
