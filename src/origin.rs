use std::fmt;

use serde::{Deserialize, Serialize};

/// Origin value reserved for the wallet's own UI and background services.
///
/// The scheme is not reachable from web content or WalletConnect peers, so
/// no untrusted caller can present this value. Privileged request fields are
/// honoured only after an exact match against this constant.
const INTERNAL_ORIGIN: &str = "wallet://internal";

/// Identifier of a requesting context: a web page origin, a WalletConnect
/// peer URL, or the trusted internal caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The trusted internal caller.
    pub fn internal() -> Self {
        Self(INTERNAL_ORIGIN.to_string())
    }

    pub fn is_internal(&self) -> bool {
        self.0 == INTERNAL_ORIGIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_origin_requires_exact_match() {
        assert!(Origin::internal().is_internal());
        assert!(!Origin::new("wallet://internal/extra").is_internal());
        assert!(!Origin::new("https://wallet.internal").is_internal());
        assert!(!Origin::new("WALLET://INTERNAL").is_internal());
    }
}
