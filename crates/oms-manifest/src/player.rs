use crate::model::Period;

/// Capabilities the player lends to manifest loading.
///
/// The parser does not inspect the context; it only hands the converted
/// periods to it before returning the manifest.
pub trait PlayerContext: Send + Sync {
    /// Drop or adjust streams the platform cannot play.
    fn filter_all_periods(&self, _periods: &mut [Period]) {}
}

/// A context that accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPlayerContext;

impl PlayerContext for NoopPlayerContext {}
