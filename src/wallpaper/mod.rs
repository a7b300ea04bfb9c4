//! Wallpaper files and the external programs that produce and apply them.

pub mod apply;
pub mod generate;
pub mod paths;

pub use apply::{ApplyError, RetryPolicy, Swaymsg, WallpaperSetter};
pub use generate::{GenerateError, ImageMagick, VariantRenderer, generate_all};
pub use paths::Variant;
