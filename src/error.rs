use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ComError {
    // Handle errors
    #[error("port handle is invalid")]
    PortInvalid,

    // Transient resource exhaustion
    #[error("transmit buffer full")]
    BufferFull,
    #[error("another task is sending on this port")]
    SenderBusy,
    #[error("send lock unavailable")]
    LockUnavailable,

    // Bounded waits
    #[error("send timed out")]
    SendTimeout,

    #[error("DMA transmit is not implemented")]
    DmaTxUnsupported,

    // Programmer errors, contained in release builds
    #[error("port has no {0} direction")]
    DirectionUnsupported(Direction),

    // Bring-up errors
    #[error("port registry full ({capacity} ports)")]
    RegistryFull { capacity: usize },
    #[error("driver lacks capability: {0}")]
    MissingCapability(&'static str),
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

impl ComError {
    /// Legacy status code for this error.
    ///
    /// Codes overlap between the non-blocking and blocking send families
    /// (`-2` is "buffer full" for one and "lock unavailable" for the other),
    /// so callers that only look at integers must know which call they made.
    pub fn status_code(&self) -> i32 {
        match self {
            ComError::PortInvalid => -1,
            ComError::BufferFull | ComError::LockUnavailable => -2,
            ComError::SenderBusy | ComError::SendTimeout => -3,
            ComError::DmaTxUnsupported => -4,
            ComError::DirectionUnsupported(_)
            | ComError::RegistryFull { .. }
            | ComError::MissingCapability(_)
            | ComError::InvalidParameter(_) => -1,
        }
    }

    /// True for errors a caller can clear by retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ComError::BufferFull | ComError::SenderBusy | ComError::LockUnavailable
        )
    }
}

pub type Result<T> = std::result::Result<T, ComError>;
