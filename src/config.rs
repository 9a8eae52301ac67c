//! Tunables for connection negotiation.

use std::time::Duration;

/// Reflection service queried for the publicly visible address.
pub const DEFAULT_REFLECTOR: &str = "stun.l.google.com:19302";

/// Local address the candidate listener binds to. Port 0 lets the OS pick.
pub const DEFAULT_BIND: &str = "0.0.0.0:0";

/// Bound on candidate gathering before the descriptor is declared final.
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on a single outbound connection attempt.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the whole establishment phase. Generous because the blobs travel
/// by human copy and paste.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(180);

/// Bound on one reflection round trip.
pub const DEFAULT_REFLECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Knobs for a [`ConnectionNegotiator`](crate::negotiator::ConnectionNegotiator).
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Address the candidate listener binds to.
    pub bind: String,
    /// Reflection service to ask for a public candidate, `None` to skip.
    pub reflector: Option<String>,
    /// How long gathering may run before the descriptor is exported anyway.
    pub gather_timeout: Duration,
    /// Per-candidate connect bound.
    pub dial_timeout: Duration,
    /// Overall bound from descriptor exchange to an open channel.
    pub open_timeout: Duration,
    /// Bound on the reflection round trip within gathering.
    pub reflection_timeout: Duration,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            reflector: Some(DEFAULT_REFLECTOR.to_string()),
            gather_timeout: DEFAULT_GATHER_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            reflection_timeout: DEFAULT_REFLECTION_TIMEOUT,
        }
    }
}

impl NegotiatorConfig {
    /// Loopback-only configuration with no reflection and tight bounds.
    /// Suited to same-host sessions and tests.
    pub fn loopback() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            reflector: None,
            gather_timeout: Duration::from_secs(1),
            dial_timeout: Duration::from_secs(1),
            open_timeout: Duration::from_secs(10),
            reflection_timeout: Duration::from_millis(200),
        }
    }
}
