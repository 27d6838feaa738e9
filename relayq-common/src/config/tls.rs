//! TLS settings for the session with the configured relay host.

use serde::{Deserialize, Serialize};

/// When to upgrade the relay session with STARTTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TlsPolicy {
    /// Upgrade when the server advertises STARTTLS, stay in plaintext
    /// otherwise.
    #[default]
    Opportunistic,

    /// STARTTLS must succeed; the session is not used without it.
    Required,

    /// Never upgrade.
    Disabled,
}

/// Certificate validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsCertificatePolicy {
    /// Accept self-signed, expired or otherwise invalid certificates.
    ///
    /// **SECURITY WARNING**: only meant for talking to a test relay.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub policy: TlsPolicy,

    #[serde(default)]
    pub certificate: TlsCertificatePolicy,
}

impl TlsConfig {
    #[must_use]
    pub const fn new(policy: TlsPolicy) -> Self {
        Self {
            policy,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(TlsPolicy::Disabled)
    }

    #[must_use]
    pub const fn required() -> Self {
        Self::new(TlsPolicy::Required)
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.policy, TlsPolicy::Required)
    }

    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self.policy, TlsPolicy::Disabled)
    }

    #[must_use]
    pub const fn accepts_invalid_certs(&self) -> bool {
        self.certificate.accept_invalid_certs
    }

    /// Whether STARTTLS should be attempted given what the server advertised.
    #[must_use]
    pub const fn should_upgrade(&self, advertised: bool) -> bool {
        match self.policy {
            TlsPolicy::Opportunistic => advertised,
            TlsPolicy::Required => true,
            TlsPolicy::Disabled => false,
        }
    }
}
