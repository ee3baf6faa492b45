//! Runtime resource discovery
//!
//! [`FpgaManager`] enumerates the platform's devices and accelerators,
//! issues [`Token`]s for the ones matching a filter, and opens tokens into
//! [`Handle`]s. Nothing is cached between calls: every enumeration rescans
//! the platform.

use crate::config::HalConfig;
use crate::error::{FpgaError, Result};
use crate::handle::{AccessMode, Handle, LeaseTable};
use crate::platform::{select_platform, Platform, PlatformSelection, Resource, SimPlatform};
use crate::properties::{Properties, ResourceProperties};
use crate::token::Token;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registration numbers are unique per process, so a token issued by one
/// manager never resolves in another.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Result of one enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matches {
    /// Issued tokens, at most `max_results`
    pub tokens: Vec<Token>,

    /// Total number of matching resources
    pub match_count: usize,
}

#[derive(Debug, Default)]
struct TokenTable {
    entries: HashMap<u64, Resource>,
}

impl TokenTable {
    fn issue(&mut self, resource: Resource) -> Token {
        let raw = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(raw, resource);
        Token::from_raw(raw)
    }
}

#[derive(Debug)]
struct ManagerInner {
    platform: Arc<dyn Platform>,
    config: HalConfig,
    tokens: Mutex<TokenTable>,
    leases: Arc<LeaseTable>,
}

/// Entry point for discovery and access
///
/// Cheap to clone; clones share the token and lease tables.
#[derive(Debug, Clone)]
pub struct FpgaManager {
    inner: Arc<ManagerInner>,
}

impl FpgaManager {
    /// Manager over an explicit platform
    pub fn new(platform: Arc<dyn Platform>, config: HalConfig) -> Self {
        tracing::debug!("FPGA manager on {} platform", platform.name());
        Self {
            inner: Arc::new(ManagerInner {
                platform,
                config,
                tokens: Mutex::new(TokenTable::default()),
                leases: Arc::new(LeaseTable::default()),
            }),
        }
    }

    /// Manager over the selected platform
    ///
    /// # Errors
    ///
    /// Propagates platform selection failures.
    pub fn with_selection(selection: PlatformSelection, config: HalConfig) -> Result<Self> {
        let platform = select_platform(selection, &config)?;
        Ok(Self::new(platform, config))
    }

    /// Manager for this machine, configured from the environment
    ///
    /// # Errors
    ///
    /// Propagates platform selection failures.
    pub fn system() -> Result<Self> {
        Self::with_selection(PlatformSelection::Auto, HalConfig::from_env())
    }

    /// Manager over one simulated card
    pub fn simulated() -> Self {
        Self::new(Arc::new(SimPlatform::single_card()), HalConfig::default())
    }

    /// Platform in use
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.inner.platform
    }

    /// Active configuration
    pub fn config(&self) -> &HalConfig {
        &self.inner.config
    }

    fn tokens(&self) -> MutexGuard<'_, TokenTable> {
        self.inner.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find resources matching any of `filters`
    ///
    /// An empty filter list matches every resource. At most `max_results`
    /// tokens are issued; `match_count` is always the full count, so
    /// `max_results == 0` only counts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a malformed filter and propagates scan
    /// failures. No match is not an error.
    pub fn enumerate(&self, filters: &[Properties], max_results: usize) -> Result<Matches> {
        for filter in filters {
            filter.validate()?;
        }

        let matched: Vec<Resource> = self
            .inner
            .platform
            .scan()?
            .into_iter()
            .filter(|r| filters.is_empty() || filters.iter().any(|f| f.matches(&r.properties)))
            .collect();

        let match_count = matched.len();
        let mut table = self.tokens();
        let tokens: Vec<Token> = matched
            .into_iter()
            .take(max_results)
            .map(|r| table.issue(r))
            .collect();

        tracing::info!(
            "Enumerated {match_count} matching resource(s), issued {} token(s)",
            tokens.len()
        );

        Ok(Matches {
            tokens,
            match_count,
        })
    }

    pub(crate) fn resource(&self, token: &Token) -> Result<Resource> {
        self.tokens()
            .entries
            .get(&token.raw())
            .cloned()
            .ok_or_else(|| FpgaError::invalid_argument(format!("Unknown or destroyed {token}")))
    }

    /// Attributes of the resource behind a token
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a null, unknown or destroyed token.
    pub fn properties(&self, token: &Token) -> Result<ResourceProperties> {
        self.resource(token).map(|r| r.properties)
    }

    /// Issue an independent token for the same resource
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a null, unknown or destroyed token.
    pub fn clone_token(&self, token: &Token) -> Result<Token> {
        let mut table = self.tokens();
        let resource = table
            .entries
            .get(&token.raw())
            .cloned()
            .ok_or_else(|| FpgaError::invalid_argument(format!("Cannot clone {token}")))?;
        Ok(table.issue(resource))
    }

    /// Release a token
    ///
    /// Handles already opened from it are unaffected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a null, unknown or already destroyed
    /// token.
    pub fn destroy_token(&self, token: &Token) -> Result<()> {
        self.tokens()
            .entries
            .remove(&token.raw())
            .map(|_| ())
            .ok_or_else(|| FpgaError::invalid_argument(format!("Cannot destroy {token}")))
    }

    /// Tokens issued and not yet destroyed
    pub fn live_tokens(&self) -> usize {
        self.tokens().entries.len()
    }

    /// Handles currently open on the resource behind `token`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a null, unknown or destroyed token.
    pub fn open_handles(&self, token: &Token) -> Result<usize> {
        let resource = self.resource(token)?;
        Ok(self.inner.leases.holders(&resource.id))
    }

    /// Open the resource behind `token`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a null, unknown or destroyed token,
    /// `ResourceBusy` if the request conflicts with open handles, and
    /// propagates window mapping failures.
    pub fn open(&self, token: &Token, mode: AccessMode) -> Result<Handle> {
        let resource = self.resource(token)?;
        self.inner.leases.acquire(&resource.id, mode)?;

        let windows: Result<Vec<_>> = (0..resource.properties.num_regions)
            .map(|index| self.inner.platform.map_region(&resource.id, index))
            .collect();

        let windows = match windows {
            Ok(windows) => windows,
            Err(e) => {
                self.inner.leases.release(&resource.id);
                return Err(e);
            }
        };

        tracing::info!(
            "Opened {} ({mode:?}, {} window(s))",
            resource.id,
            windows.len()
        );

        Ok(Handle::new(
            resource,
            mode,
            windows,
            Arc::clone(&self.inner.leases),
            self.inner.config.clone(),
        ))
    }
}
