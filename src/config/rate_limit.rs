use super::parse_bool_env;
use std::{env, fmt, str::FromStr};

/// Storefront traffic classes. Each one gets its own token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    /// Signup, login and verification; a brute-force target.
    Auth,
    /// Box and product browsing.
    Catalog,
    /// Order placement and lookups.
    Orders,
    /// Gateway hand-off: every call here reaches PayFast or Stripe.
    Payments,
    /// Authenticated account and admin writes.
    Account,
}

impl RouteGroup {
    pub const ALL: [RouteGroup; 5] = [
        RouteGroup::Auth,
        RouteGroup::Catalog,
        RouteGroup::Orders,
        RouteGroup::Payments,
        RouteGroup::Account,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            RouteGroup::Auth => "auth",
            RouteGroup::Catalog => "catalog",
            RouteGroup::Orders => "orders",
            RouteGroup::Payments => "payments",
            RouteGroup::Account => "account",
        }
    }

    fn default_rule(self) -> RateLimitRule {
        match self {
            RouteGroup::Auth => RateLimitRule::new(5, 10),
            RouteGroup::Catalog => RateLimitRule::new(1, 60),
            RouteGroup::Orders => RateLimitRule::new(2, 20),
            RouteGroup::Payments => RateLimitRule::new(6, 5),
            RouteGroup::Account => RateLimitRule::new(2, 30),
        }
    }
}

impl FromStr for RouteGroup {
    type Err = RateLimitError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auth" | "verify" => Ok(RouteGroup::Auth),
            "catalog" | "boxes" | "products" => Ok(RouteGroup::Catalog),
            "orders" | "checkout" => Ok(RouteGroup::Orders),
            "payments" | "gateway" => Ok(RouteGroup::Payments),
            "account" | "admin" => Ok(RouteGroup::Account),
            _ => Err(RateLimitError::UnknownGroup(raw.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("unknown route group '{0}'")]
    UnknownGroup(String),
    #[error("invalid rule '{0}', expected <seconds per token>:<burst>")]
    Malformed(String),
    #[error("rule '{0}' must use positive numbers")]
    Zero(String),
}

/// One token is returned every `replenish_secs`; up to `burst` requests may
/// arrive back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub replenish_secs: u64,
    pub burst: u32,
}

impl RateLimitRule {
    pub const fn new(replenish_secs: u64, burst: u32) -> Self {
        Self {
            replenish_secs,
            burst,
        }
    }
}

impl FromStr for RateLimitRule {
    type Err = RateLimitError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let malformed = || RateLimitError::Malformed(raw.to_string());

        let (secs, burst) = raw.split_once(':').ok_or_else(malformed)?;
        let replenish_secs: u64 = secs.trim().parse().map_err(|_| malformed())?;
        let burst: u32 = burst.trim().parse().map_err(|_| malformed())?;
        if replenish_secs == 0 || burst == 0 {
            return Err(RateLimitError::Zero(raw.to_string()));
        }
        Ok(Self::new(replenish_secs, burst))
    }
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.replenish_secs, self.burst)
    }
}

/// Bucket settings per [`RouteGroup`]. Gateway callbacks sit outside every
/// group and are never limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    rules: [RateLimitRule; 5],
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: RouteGroup::ALL.map(RouteGroup::default_rule),
        }
    }
}

impl RateLimitConfig {
    /// `RATE_LIMIT_CONFIG` holds one rule for every group (`3:10`) or a list
    /// (`auth=5:10,payments=10:3`). `RATE_LIMIT_<GROUP>` overrides a single
    /// group and wins over the list.
    pub fn from_env() -> Self {
        let mut cfg = Self {
            enabled: parse_bool_env("RATE_LIMIT_ENABLED", true),
            ..Self::default()
        };

        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            match parse_overrides(&raw) {
                Ok(overrides) => cfg.apply(&overrides),
                Err(e) => tracing::warn!("Ignoring RATE_LIMIT_CONFIG={raw:?}: {e}"),
            }
        }

        for group in RouteGroup::ALL {
            let key = format!("RATE_LIMIT_{}", group.name().to_ascii_uppercase());
            let Ok(raw) = env::var(&key) else { continue };
            match raw.parse() {
                Ok(rule) => cfg.set(group, rule),
                Err(e) => tracing::warn!("Ignoring {key}={raw:?}: {e}"),
            }
        }

        cfg
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn rule(&self, group: RouteGroup) -> RateLimitRule {
        self.rules[group.index()]
    }

    pub fn set(&mut self, group: RouteGroup, rule: RateLimitRule) {
        self.rules[group.index()] = rule;
    }

    /// Later entries win; an entry without a group applies to all of them.
    fn apply(&mut self, overrides: &[(Option<RouteGroup>, RateLimitRule)]) {
        for (group, rule) in overrides {
            match group {
                Some(group) => self.set(*group, *rule),
                None => self.rules = [*rule; 5],
            }
        }
    }
}

fn parse_overrides(raw: &str) -> Result<Vec<(Option<RouteGroup>, RateLimitRule)>, RateLimitError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| -> Result<_, RateLimitError> {
            match item.split_once('=') {
                Some((group, rule)) => Ok((Some(group.parse()?), rule.parse()?)),
                None => Ok((None, item.parse()?)),
            }
        })
        .collect()
}
