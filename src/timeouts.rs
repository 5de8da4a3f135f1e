//! Timeout configuration for client operations.

use std::time::Duration;

/// Timeouts applied to proxy calls.
///
/// `request_timeout` is the default per-call deadline; individual queries
/// may override it with `deadline(...)` on the builder.
///
/// # Examples
///
/// ```rust
/// use ops_link::OpsLinkTimeouts;
/// use std::time::Duration;
///
/// let timeouts = OpsLinkTimeouts::default();
///
/// let timeouts = OpsLinkTimeouts::builder()
///     .connect_timeout(Duration::from_secs(5))
///     .request_timeout_secs(60)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct OpsLinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Deadline for one complete proxy call (send + receive + parse).
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl Default for OpsLinkTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl OpsLinkTimeouts {
    pub fn builder() -> OpsLinkTimeoutsBuilder {
        OpsLinkTimeoutsBuilder::new()
    }

    /// Short timeouts for localhost development.
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Long timeouts for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Builder for custom [`OpsLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct OpsLinkTimeoutsBuilder {
    timeouts: OpsLinkTimeouts,
}

impl OpsLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: OpsLinkTimeouts::default(),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout_secs(self, secs: u64) -> Self {
        self.connect_timeout(Duration::from_secs(secs))
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    pub fn build(self) -> OpsLinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = OpsLinkTimeouts::default();
        assert_eq!(timeouts.connect_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let timeouts = OpsLinkTimeouts::builder()
            .connect_timeout_secs(3)
            .request_timeout(Duration::from_secs(90))
            .build();
        assert_eq!(timeouts.connect_timeout, Duration::from_secs(3));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_presets() {
        assert!(OpsLinkTimeouts::fast().request_timeout < OpsLinkTimeouts::default().request_timeout);
        assert!(OpsLinkTimeouts::relaxed().request_timeout > OpsLinkTimeouts::default().request_timeout);
    }
}
