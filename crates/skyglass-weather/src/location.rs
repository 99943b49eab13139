//! One-shot device position lookup.

use crate::types::{Coordinates, LocationError};

/// Where the device position comes from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LocationSource {
    /// No positioning capability
    #[default]
    Disabled,
    /// Capability present but the user withheld permission
    Denied,
    /// Position supplied through configuration
    Fixed(Coordinates),
}

impl LocationSource {
    /// Read the current position once.
    pub async fn current_position(&self) -> Result<Coordinates, LocationError> {
        match self {
            Self::Disabled => Err(LocationError::ServiceUnavailable),
            Self::Denied => Err(LocationError::PermissionDenied),
            Self::Fixed(coordinates) => Ok(*coordinates),
        }
    }
}
