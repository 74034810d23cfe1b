//! Timeout configuration for chain client operations.

use std::time::Duration;

/// Timeouts applied by [`RpcClient`](crate::RpcClient) and
/// [`ChainClient`](crate::ChainClient).
///
/// ```rust
/// use metacheck_link::LinkTimeouts;
/// use std::time::Duration;
///
/// let timeouts = LinkTimeouts::builder()
///     .request_timeout(Duration::from_secs(120))
///     .build();
/// assert_eq!(timeouts.follow_timeout, LinkTimeouts::default().follow_timeout);
/// ```
#[derive(Debug, Clone)]
pub struct LinkTimeouts {
    /// Waiting for the reply to one request.
    /// Default: 60 seconds
    pub request_timeout: Duration,

    /// Waiting for the first event of a follow subscription.
    /// Default: 30 seconds
    pub follow_timeout: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            follow_timeout: Duration::from_secs(30),
        }
    }
}

impl LinkTimeouts {
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Short timeouts for tests against in-memory chains.
    pub fn fast() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            follow_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`LinkTimeouts`].
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    pub fn follow_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.follow_timeout = timeout;
        self
    }

    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}
