//! Port lease model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a port lease inside the allocator's reservation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// Reserved for a session, mock not yet confirmed listening
    Reserved,
    /// The mock holding this lease has been observed ready
    Bound,
    /// Returned to the allocator
    Released,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Bound => "bound",
            Self::Released => "released",
        }
    }
}

/// A ticket for one exclusive port reservation.
///
/// The lease is a plain value; its live state is owned by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLease {
    /// Unique id, distinguishes successive leases of the same port
    pub id: Uuid,
    /// Port actually reserved
    pub port: u16,
    /// Port the service spec asked for
    pub requested_port: u16,
    /// Owning session
    pub session_id: Uuid,
    /// When the reservation was made
    pub reserved_at: DateTime<Utc>,
}

impl PortLease {
    /// Whether the allocator handed out a different port than requested.
    pub fn is_substituted(&self) -> bool {
        self.port != self.requested_port
    }
}

/// Recorded when an attempt ran on a port other than the declared one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSubstitution {
    pub attempt: u32,
    pub requested: u16,
    pub actual: u16,
}
