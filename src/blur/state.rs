//! Per-output blur state.
//!
//! The map sits behind a mutex; the only mutation is
//! [`BlurStates::transition`], a compare-and-set on a single output.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::wallpaper::Variant;

/// Blurred / not-blurred flag per output. Absent entries read as not
/// blurred.
#[derive(Debug, Default)]
pub struct BlurStates {
    blurred: Mutex<HashMap<String, bool>>,
}

impl BlurStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `should_blur` for `output`.
    ///
    /// Returns the variant to apply when the state flipped, or `None`
    /// when it already matched.
    pub fn transition(&self, output: &str, should_blur: bool) -> Option<Variant> {
        let mut blurred = self.blurred.lock();
        let current = blurred.get(output).copied().unwrap_or(false);
        if current == should_blur {
            return None;
        }
        blurred.insert(output.to_string(), should_blur);
        Some(if should_blur {
            Variant::Blurred
        } else {
            Variant::Normal
        })
    }

    #[cfg(test)]
    pub fn is_blurred(&self, output: &str) -> bool {
        self.blurred.lock().get(output).copied().unwrap_or(false)
    }
}
