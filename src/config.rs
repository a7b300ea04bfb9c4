//! Startup configuration — output→wallpaper mapping, blur intensity,
//! cache directory.
//!
//! Built once from the command line and shared read-only (behind an
//! `Arc`) by generation, the initial apply, and every re-check.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Blur intensity used when `--blur` is not given.
pub const DEFAULT_BLUR: &str = "0x2";

/// File stem of the wildcard entry's variants.
const GLOBAL_STEM: &str = "_global";

/// Cache directory name under `$HOME`.
const CACHE_DIR_NAME: &str = ".waybl";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no wallpaper given")]
    NoWallpapers,
    #[error("empty output name in {0:?}")]
    EmptyOutput(String),
    #[error("empty image path in {0:?}")]
    EmptyPath(String),
    #[error("output name {0:?} is reserved")]
    ReservedOutput(String),
    #[error("invalid blur {0:?}: expected <radius>x<sigma>")]
    InvalidBlur(String),
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which output(s) a wallpaper targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputSelector {
    /// Every output without its own entry.
    All,
    Named(String),
}

impl OutputSelector {
    /// Stem used for this selector's variant files in the cache directory.
    pub fn file_stem(&self) -> &str {
        match self {
            Self::All => GLOBAL_STEM,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for OutputSelector {
    /// Formats as the compositor's output selector (`*` for all).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Gaussian blur parameters in ImageMagick's `<radius>x<sigma>` form.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurIntensity(String);

impl BlurIntensity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlurIntensity {
    fn default() -> Self {
        Self(DEFAULT_BLUR.to_string())
    }
}

impl FromStr for BlurIntensity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s
            .split_once('x')
            .is_some_and(|(radius, sigma)| radius.parse::<f64>().is_ok() && sigma.parse::<f64>().is_ok());
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ConfigError::InvalidBlur(s.to_string()))
        }
    }
}

impl fmt::Display for BlurIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from output to source image. Immutable after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputConfig {
    named: HashMap<String, PathBuf>,
    global: Option<PathBuf>,
}

impl OutputConfig {
    /// Parse positional arguments: `output:path` entries and bare paths.
    ///
    /// Only the first `:` separates output from path. Later entries for
    /// the same output (or later bare paths) replace earlier ones.
    /// Environment variables in paths are expanded.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            match arg.split_once(':') {
                Some((output, path)) => {
                    if output.is_empty() {
                        return Err(ConfigError::EmptyOutput(arg.to_string()));
                    }
                    if path.is_empty() {
                        return Err(ConfigError::EmptyPath(arg.to_string()));
                    }
                    // Would share its variant files with the wildcard entry.
                    if output == GLOBAL_STEM {
                        return Err(ConfigError::ReservedOutput(output.to_string()));
                    }
                    config
                        .named
                        .insert(output.to_string(), PathBuf::from(expand_env(path)));
                }
                None => {
                    if arg.is_empty() {
                        return Err(ConfigError::EmptyPath(arg.to_string()));
                    }
                    config.global = Some(PathBuf::from(expand_env(arg)));
                }
            }
        }
        if config.is_empty() {
            return Err(ConfigError::NoWallpapers);
        }
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.global.is_none()
    }

    /// Number of configured selectors (named outputs plus the wildcard).
    pub fn len(&self) -> usize {
        self.named.len() + usize::from(self.global.is_some())
    }

    /// Source image for an output: its own entry, else the global one.
    pub fn source_for(&self, output: &str) -> Option<&Path> {
        self.named
            .get(output)
            .or(self.global.as_ref())
            .map(PathBuf::as_path)
    }

    /// Selector whose variant files an output switches between.
    pub fn variant_selector(&self, output: &str) -> Option<OutputSelector> {
        if self.named.contains_key(output) {
            Some(OutputSelector::Named(output.to_string()))
        } else if self.global.is_some() {
            Some(OutputSelector::All)
        } else {
            None
        }
    }

    /// All configured selectors with their source images, the wildcard
    /// first and named outputs sorted by name.
    pub fn entries(&self) -> Vec<(OutputSelector, &Path)> {
        let mut named: Vec<_> = self.named.iter().collect();
        named.sort_by(|a, b| a.0.cmp(b.0));

        self.global
            .iter()
            .map(|path| (OutputSelector::All, path.as_path()))
            .chain(
                named
                    .into_iter()
                    .map(|(name, path)| (OutputSelector::Named(name.clone()), path.as_path())),
            )
            .collect()
    }
}

/// Resolve the cache directory (explicit override or `$HOME/.waybl`)
/// and create it if missing. An existing directory is not an error.
pub fn prepare_cache_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => dirs::home_dir()
            .ok_or(ConfigError::NoHomeDir)?
            .join(CACHE_DIR_NAME),
    };
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CacheDir {
        path: dir.clone(),
        source: e,
    })?;
    Ok(dir)
}

/// Expand `$VAR` and `${VAR}` from the process environment. Unknown
/// variables expand to the empty string.
pub fn expand_env(input: &str) -> String {
    shellexpand::env_with_context_no_errors(input, |name| {
        Some(std::env::var(name).unwrap_or_default())
    })
    .into_owned()
}
