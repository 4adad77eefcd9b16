use std::time::Duration;

/// Number of relays in every circuit.
pub const CIRCUIT_HOPS: usize = 3;

/// Port scheme mapping node ids to listening ports.
///
/// A node's listening port is its base port plus its id; the zero-padded
/// decimal form of that port is the hop address embedded inside decrypted
/// layers.
#[derive(Debug, Clone)]
pub struct PortScheme {
    pub registry_port: u32,
    pub relay_base_port: u32,
    pub user_base_port: u32,
}

impl PortScheme {
    /// Port layout used by the local simulation and the tests.
    pub fn local_sim() -> Self {
        Self {
            registry_port: 8080,
            relay_base_port: 4000,
            user_base_port: 5000,
        }
    }

    pub fn relay_port(&self, id: u32) -> u32 {
        self.relay_base_port + id
    }

    pub fn user_port(&self, id: u32) -> u32 {
        self.user_base_port + id
    }
}

impl Default for PortScheme {
    fn default() -> Self {
        Self::local_sim()
    }
}

/// Retry and deadline policy for the relay forward step.
///
/// Every attempt runs under `attempt_deadline`; transient failures are
/// retried up to `attempts` times with a linearly growing backoff. A hop
/// that rejected the message outright is never retried.
#[derive(Debug, Clone)]
pub struct ForwardPolicy {
    pub attempts: u32,
    pub attempt_deadline: Duration,
    pub backoff: Duration,
}

impl ForwardPolicy {
    pub fn lan_default() -> Self {
        Self {
            attempts: 3,
            attempt_deadline: Duration::from_secs(2),
            backoff: Duration::from_millis(50),
        }
    }

    /// Single attempt, no backoff, for callers that want failures
    /// surfaced immediately.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            attempt_deadline: Duration::from_secs(2),
            backoff: Duration::ZERO,
        }
    }

    /// Backoff before the given (1-based) attempt number.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        Self::lan_default()
    }
}

/// Top-level overlay configuration shared by relays and clients.
#[derive(Debug, Clone, Default)]
pub struct OverlayConfig {
    pub ports: PortScheme,
    pub forward: ForwardPolicy,
}

impl OverlayConfig {
    pub fn local_sim() -> Self {
        Self {
            ports: PortScheme::local_sim(),
            forward: ForwardPolicy::lan_default(),
        }
    }
}
