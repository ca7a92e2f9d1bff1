//! Entity resolution cache - normalized names to canonical directory ids
//!
//! The cache owns an injected clock and is refreshed synchronously once
//! its TTL has elapsed. A refresh builds a new `DirectorySnapshot` and
//! swaps it in whole, so readers never observe a partial directory.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::names::{normalize, tokens};
use crate::domain::result::{Error, Result};
use crate::domain::{DealerEntry, UserEntry};
use crate::ports::{Clock, DirectorySource};

#[derive(Debug, Clone)]
struct UserKey {
    id: i64,
    normalized: String,
    tokens: Vec<String>,
}

/// Immutable lookup tables built from one directory read
#[derive(Debug, Default)]
pub struct DirectorySnapshot {
    dealers: HashMap<String, String>,
    users: Vec<UserKey>,
}

impl DirectorySnapshot {
    pub fn build(dealers: &[DealerEntry], users: &[UserEntry]) -> Self {
        let mut sorted_dealers: Vec<&DealerEntry> = dealers.iter().collect();
        sorted_dealers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut dealer_map = HashMap::new();
        for dealer in sorted_dealers {
            let keys = std::iter::once(dealer.party_name.as_str()).chain(dealer.dealer_code.as_deref());
            for key in keys.map(normalize).filter(|k| !k.is_empty()) {
                dealer_map.entry(key).or_insert_with(|| dealer.id.clone());
            }
        }

        let mut user_keys: Vec<UserKey> = users
            .iter()
            .map(|u| {
                let full = u.full_name();
                UserKey {
                    id: u.id,
                    normalized: normalize(&full),
                    tokens: tokens(&full),
                }
            })
            .filter(|u| !u.normalized.is_empty())
            .collect();
        user_keys.sort_by_key(|u| u.id);

        Self {
            dealers: dealer_map,
            users: user_keys,
        }
    }

    pub fn dealer_keys(&self) -> usize {
        self.dealers.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Exact match on normalized party name or dealer code
    pub fn resolve_dealer(&self, name: &str) -> Option<String> {
        let key = normalize(name);
        if key.is_empty() {
            return None;
        }
        self.dealers.get(&key).cloned()
    }

    /// Resolve a free-text person name through the fallback ladder.
    ///
    /// Steps run in order until one yields candidates: exact, substring
    /// either way, all directory tokens present, single-token match. Among
    /// the candidates of that step the longest normalized name wins, then
    /// the smallest id.
    pub fn resolve_user(&self, name: &str) -> Option<i64> {
        let input = normalize(name);
        if input.is_empty() {
            return None;
        }
        let input_tokens = tokens(name);

        let steps: [&dyn Fn(&UserKey) -> bool; 4] = [
            &|u: &UserKey| u.normalized == input,
            &|u: &UserKey| u.normalized.contains(&input) || input.contains(&u.normalized),
            &|u: &UserKey| !u.tokens.is_empty() && u.tokens.iter().all(|t| input_tokens.contains(t)),
            &|u: &UserKey| input_tokens.len() == 1 && u.tokens.contains(&input_tokens[0]),
        ];

        steps.iter().find_map(|step| {
            self.users
                .iter()
                .filter(|u| step(u))
                .max_by_key(|u| (u.normalized.len(), Reverse(u.id)))
                .map(|u| u.id)
        })
    }
}

struct CachedSnapshot {
    refreshed_at: DateTime<Utc>,
    snapshot: Arc<DirectorySnapshot>,
}

/// TTL-bound cache over the dealer and user directories
pub struct EntityCache {
    source: Arc<dyn DirectorySource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: RwLock<Option<CachedSnapshot>>,
}

impl EntityCache {
    pub fn new(source: Arc<dyn DirectorySource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Current snapshot, refreshing first when the TTL has elapsed
    pub fn snapshot(&self) -> Result<Arc<DirectorySnapshot>> {
        let now = self.clock.now();
        {
            let state = self
                .state
                .read()
                .map_err(|_| Error::Other("entity cache lock poisoned".into()))?;
            if let Some(cached) = state.as_ref() {
                if now - cached.refreshed_at < self.ttl {
                    return Ok(Arc::clone(&cached.snapshot));
                }
            }
        }
        self.refresh()
    }

    /// Re-read both directories and replace the snapshot
    pub fn refresh(&self) -> Result<Arc<DirectorySnapshot>> {
        let dealers = self.source.list_dealers()?;
        let users = self.source.list_users()?;
        let snapshot = Arc::new(DirectorySnapshot::build(&dealers, &users));

        debug!(
            dealers = dealers.len(),
            users = users.len(),
            "Refreshed entity resolution cache"
        );

        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Other("entity cache lock poisoned".into()))?;
        *state = Some(CachedSnapshot {
            refreshed_at: self.clock.now(),
            snapshot: Arc::clone(&snapshot),
        });
        Ok(snapshot)
    }

    /// Drop the snapshot so the next read refreshes
    pub fn invalidate(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = None;
        }
    }

    pub fn resolve_dealer(&self, name: &str) -> Result<Option<String>> {
        Ok(self.snapshot()?.resolve_dealer(name))
    }

    pub fn resolve_user(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.snapshot()?.resolve_user(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticDirectory {
        dealers: Mutex<Vec<DealerEntry>>,
        users: Vec<UserEntry>,
        reads: AtomicUsize,
        fail: bool,
    }

    impl StaticDirectory {
        fn new(dealers: Vec<DealerEntry>, users: Vec<UserEntry>) -> Self {
            Self {
                dealers: Mutex::new(dealers),
                users,
                reads: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl DirectorySource for StaticDirectory {
        fn list_dealers(&self) -> Result<Vec<DealerEntry>> {
            if self.fail {
                return Err(Error::database("directory offline"));
            }
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.dealers.lock().unwrap().clone())
        }

        fn list_users(&self) -> Result<Vec<UserEntry>> {
            Ok(self.users.clone())
        }
    }

    fn users() -> Vec<UserEntry> {
        vec![
            UserEntry::new(1, "Ravi", Some("Kumar")),
            UserEntry::new(2, "Ravi", Some("Kumar Singh")),
            UserEntry::new(3, "Anil", Some("Sharma")),
            UserEntry::new(4, "Sunil", None),
        ]
    }

    fn snapshot() -> DirectorySnapshot {
        DirectorySnapshot::build(
            &[
                DealerEntry::new("D1", "M/s. Gupta Traders").with_code("GT-01"),
                DealerEntry::new("D2", "Sharma & Co."),
            ],
            &users(),
        )
    }

    #[test]
    fn test_dealer_by_name_or_code() {
        let s = snapshot();
        assert_eq!(s.resolve_dealer("GUPTA TRADERS"), Some("D1".into()));
        assert_eq!(s.resolve_dealer("gt 01"), Some("D1".into()));
        assert_eq!(s.resolve_dealer("M/S SHARMA AND CO"), None);
        assert_eq!(s.resolve_dealer("sharma & co"), Some("D2".into()));
        assert_eq!(s.resolve_dealer("  "), None);
    }

    #[test]
    fn test_user_ladder_exact() {
        assert_eq!(snapshot().resolve_user("ravi kumar"), Some(1));
    }

    #[test]
    fn test_user_ladder_substring_prefers_longest() {
        // Both qualify on the substring step; the longer name wins
        assert_eq!(snapshot().resolve_user("Ravi Kumar S"), Some(2));
        // "RAVI" is a substring of both; the longer name wins
        assert_eq!(snapshot().resolve_user("Ravi"), Some(2));
    }

    #[test]
    fn test_user_ladder_token_steps() {
        // All tokens of "Anil Sharma" appear in the input
        assert_eq!(snapshot().resolve_user("Sharma, Anil (TSO)"), Some(3));
        assert_eq!(snapshot().resolve_user("Nobody Here"), None);
    }

    #[test]
    fn test_user_tie_break_is_smallest_id() {
        let s = DirectorySnapshot::build(
            &[],
            &[UserEntry::new(9, "Amit", Some("Roy")), UserEntry::new(5, "Amit", Some("Das"))],
        );
        assert_eq!(s.resolve_user("Amit"), Some(5));
    }

    #[test]
    fn test_cache_refreshes_only_after_ttl() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let directory = Arc::new(StaticDirectory::new(vec![DealerEntry::new("D1", "Gupta")], users()));
        let cache = EntityCache::new(directory.clone(), clock.clone(), Duration::minutes(5));

        assert_eq!(cache.resolve_dealer("gupta").unwrap(), Some("D1".into()));
        directory.dealers.lock().unwrap().push(DealerEntry::new("D2", "Verma"));

        clock.advance(Duration::minutes(4));
        assert_eq!(cache.resolve_dealer("verma").unwrap(), None);
        assert_eq!(directory.reads.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(1));
        assert_eq!(cache.resolve_dealer("verma").unwrap(), Some("D2".into()));
        assert_eq!(directory.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refresh_failure_propagates() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut directory = StaticDirectory::new(vec![], vec![]);
        directory.fail = true;
        let cache = EntityCache::new(Arc::new(directory), clock, Duration::minutes(5));
        assert!(cache.snapshot().is_err());
    }
}
