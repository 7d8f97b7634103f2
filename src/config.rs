//! Client configuration.

/// Behavioural options for a [`CtsClient`](crate::CtsClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Fail unsubscribe with `NotSubscribed` when notifications are not active.
    ///
    /// When false, such an unsubscribe succeeds without touching the peer.
    pub strict_unsubscribe: bool,

    /// Fail decoding with `MalformedResponse` when reserved adjust reason bits are set.
    ///
    /// When false, reserved bits are masked off.
    pub reject_reserved_adjust_bits: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            strict_unsubscribe: true,
            reject_reserved_adjust_bits: true,
        }
    }
}

impl ClientConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set unsubscribe strictness.
    pub fn with_strict_unsubscribe(mut self, strict: bool) -> Self {
        self.strict_unsubscribe = strict;
        self
    }

    /// Set whether reserved adjust reason bits are rejected.
    pub fn with_reject_reserved_adjust_bits(mut self, reject: bool) -> Self {
        self.reject_reserved_adjust_bits = reject;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict() {
        let config = ClientConfig::default();
        assert!(config.strict_unsubscribe);
        assert!(config.reject_reserved_adjust_bits);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_strict_unsubscribe(false)
            .with_reject_reserved_adjust_bits(false);
        assert!(!config.strict_unsubscribe);
        assert!(!config.reject_reserved_adjust_bits);
    }
}
