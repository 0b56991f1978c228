//! Refresh policies: when a cached entry should be fetched again anyway.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::backend::Cache;
use crate::error::Result;

/// One week, the default time-to-live of [`crate::GrazeWithDataRefresh`].
pub const A_WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

type Predicate = Box<dyn Fn(&str, &str) -> Result<bool>>;

/// Decides, per lookup, whether a cache hit must be refetched.
#[derive(Default)]
pub enum Refresh {
    /// Serve hits as they are.
    #[default]
    Never,
    /// Refetch on every lookup.
    Always,
    /// Refetch when the entry is older than the given age.
    ///
    /// Entries whose write time the backend cannot report count as stale.
    MaxAge(Duration),
    /// Refetch when the predicate, called with `(key, url)`, returns `true`.
    When(Predicate),
}

impl Refresh {
    pub fn when(predicate: impl Fn(&str, &str) -> Result<bool> + 'static) -> Self {
        Refresh::When(Box::new(predicate))
    }

    /// Whether `key` (for `url`) is due for a refetch. Predicate errors propagate.
    pub fn is_due(&self, cache: &Cache, key: &str, url: &str) -> Result<bool> {
        match self {
            Refresh::Never => Ok(false),
            Refresh::Always => Ok(true),
            Refresh::MaxAge(max_age) => Ok(match cache.modified(key) {
                Some(modified) => age(modified) > *max_age,
                None => cache.contains(key),
            }),
            Refresh::When(predicate) => predicate(key, url),
        }
    }
}

impl From<bool> for Refresh {
    fn from(always: bool) -> Self {
        if always { Refresh::Always } else { Refresh::Never }
    }
}

impl From<Duration> for Refresh {
    fn from(max_age: Duration) -> Self {
        Refresh::MaxAge(max_age)
    }
}

impl fmt::Debug for Refresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refresh::Never => f.write_str("Never"),
            Refresh::Always => f.write_str("Always"),
            Refresh::MaxAge(max_age) => f.debug_tuple("MaxAge").field(max_age).finish(),
            Refresh::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Time elapsed since `modified`; zero for timestamps in the future.
pub fn age(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}

/// Parse a duration like "90", "45s", "15m", "24h", "7d" or "2w". Bare numbers
/// are seconds. `None` for malformed input and for spans too large to represent.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let unit_secs: u64 = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };
    let count: u64 = digits.parse().ok()?;
    count.checked_mul(unit_secs).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, Store};
    use crate::error::GrazeError;

    #[test]
    fn test_bool_policies() {
        let cache = Cache::mapping(MemoryStore::new());
        assert!(!Refresh::from(false).is_due(&cache, "k", "u").unwrap());
        assert!(Refresh::from(true).is_due(&cache, "k", "u").unwrap());
    }

    #[test]
    fn test_max_age_uses_write_time() {
        let mut store = MemoryStore::new();
        store.set("fresh", b"new").unwrap();
        store.set("old", b"old").unwrap();
        store.set_modified("old", SystemTime::now() - Duration::from_secs(3600));
        let cache = Cache::mapping(store);

        let policy = Refresh::MaxAge(Duration::from_secs(60));
        assert!(!policy.is_due(&cache, "fresh", "u").unwrap());
        assert!(policy.is_due(&cache, "old", "u").unwrap());
        // Nothing to refresh for a missing entry
        assert!(!policy.is_due(&cache, "missing", "u").unwrap());
    }

    #[test]
    fn test_max_age_unknown_write_time_is_stale() {
        let mut map = std::collections::HashMap::new();
        map.insert("k".to_string(), b"v".to_vec());
        let cache = Cache::mapping(map);
        assert!(
            Refresh::MaxAge(Duration::from_secs(60))
                .is_due(&cache, "k", "u")
                .unwrap()
        );
    }

    #[test]
    fn test_predicate_receives_key_and_url() {
        let cache = Cache::mapping(MemoryStore::new());
        let policy = Refresh::when(|key, url| Ok(key == "k" && url.ends_with("/latest")));
        assert!(policy.is_due(&cache, "k", "https://x/latest").unwrap());
        assert!(!policy.is_due(&cache, "k", "https://x/v1").unwrap());
    }

    #[test]
    fn test_predicate_errors_propagate() {
        let cache = Cache::mapping(MemoryStore::new());
        let policy = Refresh::when(|key, _| Err(GrazeError::NotFound(key.to_string())));
        assert!(matches!(
            policy.is_due(&cache, "k", "u"),
            Err(GrazeError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("30d"),
            Some(Duration::from_secs(30 * 24 * 60 * 60))
        );
        assert_eq!(
            parse_duration("24h"),
            Some(Duration::from_secs(24 * 60 * 60))
        );
        assert_eq!(
            parse_duration("1w"),
            Some(Duration::from_secs(7 * 24 * 60 * 60))
        );
        assert_eq!(parse_duration("60m"), Some(Duration::from_secs(60 * 60)));
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("7x"), None);
        assert_eq!(parse_duration("d"), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_rejected() {
        assert_eq!(parse_duration("99999999999999w"), None);
        assert_eq!(parse_duration("18446744073709551615d"), None);
        assert_eq!(parse_duration("99999999999999999999"), None);
        assert_eq!(
            parse_duration("18446744073709551615"),
            Some(Duration::from_secs(u64::MAX))
        );
    }
}
