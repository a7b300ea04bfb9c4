//! Cache file names for an output's wallpaper variants.

use std::path::{Path, PathBuf};

/// The two precomputed images kept per output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Normal,
    Blurred,
}

impl Variant {
    pub fn path(self, stem: &str, dir: &Path) -> PathBuf {
        match self {
            Self::Normal => normal_path(stem, dir),
            Self::Blurred => blurred_path(stem, dir),
        }
    }
}

/// `dir/<stem>.jpg`
pub fn normal_path(stem: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{stem}.jpg"))
}

/// `dir/<stem>_blur.jpg`
pub fn blurred_path(stem: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{stem}_blur.jpg"))
}
