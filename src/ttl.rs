//! Time-to-live model shared by all backends.

use std::time::Duration;

/// Lifetime requested for a cache entry.
///
/// A TTL of zero seconds means the entry never expires. A negative TTL means
/// "expire almost immediately", never "never expire".
///
/// # Example
///
/// ```
/// use casket::Ttl;
/// use std::time::Duration;
///
/// assert_eq!(Ttl::from_secs(0), Ttl::Never);
/// assert_eq!(Ttl::from_secs(30), Ttl::After(Duration::from_secs(30)));
/// assert_eq!(Ttl::from_secs(-1), Ttl::Expired);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Ttl {
    /// Entry lives until deleted, flushed or evicted.
    #[default]
    Never,
    /// Entry expires after the given duration.
    After(Duration),
    /// Entry is written already expired.
    Expired,
}

impl Ttl {
    /// Build a TTL from signed seconds, using the cache convention for `0` and
    /// negative values.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Ttl::Never,
            s if s < 0 => Ttl::Expired,
            s => Ttl::After(Duration::from_secs(s as u64)),
        }
    }

    /// Clamp a finite TTL to `max`. `Never` and `Expired` pass through.
    pub fn clamp(self, max: Duration) -> Self {
        match self {
            Ttl::After(d) if d > max => Ttl::After(max),
            other => other,
        }
    }

    /// Duration until expiry, if the TTL is finite.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Ttl::Never => None,
            Ttl::After(d) => Some(*d),
            Ttl::Expired => Some(Duration::ZERO),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Ttl::Never
        } else {
            Ttl::After(d)
        }
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(d: Option<Duration>) -> Self {
        d.map(Ttl::from).unwrap_or(Ttl::Never)
    }
}
