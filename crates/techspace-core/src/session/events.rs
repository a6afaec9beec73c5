use serde::Serialize;

/// Capacity of the event channel. Subscribers that fall further behind
/// lose the oldest events rather than slowing the controller down.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Observable session transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// A credential-issuance result was accepted.
    SignedIn,
    /// The credential pair was renewed.
    Renewed,
    /// Renewal failed; the session was cleared.
    Terminated,
    /// Explicit logout.
    SignedOut,
}
