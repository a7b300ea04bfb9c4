//! Focus-driven blur — classify outputs from a tree snapshot and switch
//! each output between its normal and blurred wallpaper.

pub mod focus;
pub mod state;
pub mod worker;

pub use focus::output_signals;
pub use state::BlurStates;
pub use worker::{BlurContext, BlurDispatcher};
