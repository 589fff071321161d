//! Cookie-like key/value jar.

use crate::{KeyValueStorage, StorageResult};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Attributes applied to every value written through [`KeyValueStorage::set`].
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Lifetime of a written value.
    pub max_age: Duration,
    pub path: String,
    /// Cookie domain; `None` scopes values to the current host.
    pub domain: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::days(365),
            path: "/".to_string(),
            domain: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CookieValue {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process cookie jar. Values expire after their max-age and read as absent.
#[derive(Debug, Default)]
pub struct CookieStorage {
    options: CookieOptions,
    jar: Mutex<HashMap<String, CookieValue>>,
}

impl CookieStorage {
    pub fn new() -> Self {
        Self::with_options(CookieOptions::default())
    }

    pub fn with_options(options: CookieOptions) -> Self {
        Self {
            options,
            jar: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Write with an explicit max-age. A non-positive max-age deletes the
    /// value, matching how browsers treat expired cookies.
    pub fn set_with_max_age(&self, key: &str, value: &str, max_age: Duration) {
        let mut jar = self.jar.lock();
        if max_age <= Duration::zero() {
            jar.remove(key);
            return;
        }
        jar.insert(
            key.to_string(),
            CookieValue {
                value: value.to_string(),
                expires_at: Utc::now() + max_age,
            },
        );
    }
}

impl KeyValueStorage for CookieStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut jar = self.jar.lock();
        let now = Utc::now();
        match jar.get(key) {
            Some(cookie) if cookie.expires_at > now => Ok(Some(cookie.value.clone())),
            Some(_) => {
                jar.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_with_max_age(key, value, self.options.max_age);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.jar.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_storage_basic() {
        let storage = CookieStorage::new();

        storage.set("foo", "bar").unwrap();
        assert_eq!(storage.get("foo").unwrap(), Some("bar".to_string()));
        assert!(storage.has("foo").unwrap());
        assert!(!storage.has("missing").unwrap());

        assert!(storage.remove("foo").unwrap());
        assert!(!storage.remove("foo").unwrap());
        assert_eq!(storage.get("foo").unwrap(), None);
    }

    #[test]
    fn test_cookie_storage_overwrite() {
        let storage = CookieStorage::new();
        storage.set("foo", "one").unwrap();
        storage.set("foo", "two").unwrap();
        assert_eq!(storage.get("foo").unwrap(), Some("two".to_string()));
    }

    #[test]
    fn test_negative_max_age_deletes() {
        let storage = CookieStorage::new();
        storage.set("plainflow_amp_id", "amp").unwrap();
        storage.set_with_max_age("plainflow_amp_id", "", Duration::seconds(-1));
        assert_eq!(storage.get("plainflow_amp_id").unwrap(), None);
    }

    #[test]
    fn test_expired_value_reads_as_absent() {
        let storage = CookieStorage::with_options(CookieOptions {
            max_age: Duration::milliseconds(20),
            ..CookieOptions::default()
        });
        storage.set("short", "lived").unwrap();
        assert!(storage.has("short").unwrap());

        std::thread::sleep(std::time::Duration::from_millis(40));
        assert_eq!(storage.get("short").unwrap(), None);
    }

    #[test]
    fn test_default_options() {
        let storage = CookieStorage::new();
        assert_eq!(storage.options().path, "/");
        assert_eq!(storage.options().max_age, Duration::days(365));
        assert!(storage.options().domain.is_none());
    }
}
