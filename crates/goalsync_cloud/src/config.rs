//! Cloud configuration.

/// Configuration for the reference cloud.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum changes returned by one change query, whatever the client asks for.
    pub max_fetch_batch: u32,
    /// Undelivered notifications buffered per device before new ones are dropped.
    pub notification_buffer: usize,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_fetch_batch: 200,
            notification_buffer: 16,
        }
    }

    /// Sets the maximum change batch size.
    pub fn with_max_fetch_batch(mut self, size: u32) -> Self {
        self.max_fetch_batch = size.max(1);
        self
    }

    /// Sets the per-device notification buffer.
    pub fn with_notification_buffer(mut self, capacity: usize) -> Self {
        self.notification_buffer = capacity.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
