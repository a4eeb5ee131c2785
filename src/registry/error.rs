//! Registry error types
//!
//! Error types for opening sessions in the source and sink registries.

use crate::media::MediaError;
use crate::session::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// A source session is already live
    SourceOccupied(ConnectionId),
    /// The media session for a new connection could not be created
    SessionSetup(MediaError),
}

impl RegistryError {
    /// Whether the connection was refused for exceeding its role's capacity
    pub fn is_capacity_violation(&self) -> bool {
        matches!(self, RegistryError::SourceOccupied(_))
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::SourceOccupied(current) => {
                write!(f, "Source already connected: {}", current)
            }
            RegistryError::SessionSetup(e) => write!(f, "Failed to create media session: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::SessionSetup(e) => Some(e),
            RegistryError::SourceOccupied(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_violation() {
        assert!(RegistryError::SourceOccupied(ConnectionId::new(1)).is_capacity_violation());
        assert!(!RegistryError::SessionSetup(MediaError::Closed).is_capacity_violation());
    }

    #[test]
    fn test_display() {
        let err = RegistryError::SourceOccupied(ConnectionId::new(4));
        assert_eq!(err.to_string(), "Source already connected: conn-4");
    }
}
