//! Opaque resource tokens

/// Opaque, cheaply copyable reference to a discovered resource
///
/// Tokens are issued by [`crate::FpgaManager::enumerate`] and released with
/// [`crate::FpgaManager::destroy_token`]. Two tokens compare equal only if
/// they are the same registration; a clone is a new, independent token.
/// Registration numbers are never reused within a process, so a token is
/// only ever valid on the manager that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// The null token, never issued by discovery
    pub const INVALID: Self = Self(0);

    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw registration number
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the null token
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token#{}", self.0)
    }
}
