//! Runtime configuration
//!
//! Defaults describe real hardware. Test harnesses shorten the mailbox
//! timeout; tools point `sysfs_root` at a captured tree.

use std::path::PathBuf;
use std::time::Duration;

/// Bound on a mediated (mailbox) register access.
pub const MAILBOX_TIMEOUT: Duration = Duration::from_millis(100);

/// Delay between mailbox acknowledge polls.
pub const MAILBOX_POLL_INTERVAL: Duration = Duration::from_micros(10);

/// Bound on waiting for the port soft-reset acknowledge.
pub const RESET_ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest device feature list walked before assuming a corrupt list.
pub const MAX_FEATURES: usize = 64;

/// Access layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalConfig {
    /// Root of the sysfs tree (`/sys` on a live system)
    pub sysfs_root: PathBuf,

    /// Bound on one mediated register access
    pub mailbox_timeout: Duration,

    /// Delay between acknowledge polls
    pub mailbox_poll_interval: Duration,

    /// Bound on the port reset handshake
    pub reset_timeout: Duration,

    /// Feature list length limit
    pub max_features: usize,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            mailbox_timeout: MAILBOX_TIMEOUT,
            mailbox_poll_interval: MAILBOX_POLL_INTERVAL,
            reset_timeout: RESET_ACK_TIMEOUT,
            max_features: MAX_FEATURES,
        }
    }
}

impl HalConfig {
    /// Defaults, overridden by `FPGA_SYSFS_ROOT` and `FPGA_MAILBOX_TIMEOUT_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(root) = std::env::var_os("FPGA_SYSFS_ROOT") {
            config.sysfs_root = PathBuf::from(root);
        }

        if let Ok(ms) = std::env::var("FPGA_MAILBOX_TIMEOUT_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.mailbox_timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!("Ignoring FPGA_MAILBOX_TIMEOUT_MS={ms:?}: {e}"),
            }
        }

        config
    }

    /// Set the sysfs root
    #[must_use]
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    /// Set the mailbox timeout
    #[must_use]
    pub const fn with_mailbox_timeout(mut self, timeout: Duration) -> Self {
        self.mailbox_timeout = timeout;
        self
    }
}
