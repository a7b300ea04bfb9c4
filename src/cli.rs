use std::path::PathBuf;

use clap::Parser;

use crate::config::{BlurIntensity, DEFAULT_BLUR};

#[derive(Parser)]
#[command(
    name = "waybl",
    about = "Blur sway wallpapers while windows are visible",
    after_help = "Each WALLPAPER is either OUTPUT:PATH for one output or a bare PATH \
                  used for every output without its own entry."
)]
pub struct Cli {
    /// Blur intensity as <radius>x<sigma>
    #[arg(short, long, default_value = DEFAULT_BLUR, value_parser = parse_blur)]
    pub blur: BlurIntensity,

    /// Directory for generated wallpapers [default: ~/.waybl]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Compositor IPC socket [default: $SWAYSOCK]
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Wallpapers: OUTPUT:PATH or PATH
    #[arg(required = true, value_name = "WALLPAPER")]
    pub wallpapers: Vec<String>,
}

fn parse_blur(s: &str) -> Result<BlurIntensity, String> {
    s.parse().map_err(|e: crate::config::ConfigError| e.to_string())
}
