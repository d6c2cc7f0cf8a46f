// Redraw error types
//
// Only target acquisition aborts a redraw; per-drawable and per-layer
// failures are logged and counted in the report instead.

use sc_rendering::{LayerId, SurfaceError};
use thiserror::Error;

use crate::target::ZBand;

/// Redraw errors
#[derive(Debug, Error)]
pub enum RedrawError {
    #[error("Draw target unavailable for {band:?}: {source}")]
    SurfaceUnavailable {
        band: ZBand,
        #[source]
        source: SurfaceError,
    },

    #[error("Unknown layer: {0}")]
    UnknownLayer(LayerId),
}

impl RedrawError {
    pub fn unavailable(band: ZBand, source: SurfaceError) -> Self {
        Self::SurfaceUnavailable { band, source }
    }
}

/// Result type alias
pub type RedrawResult<T> = Result<T, RedrawError>;
