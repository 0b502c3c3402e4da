//! Shared fixtures for the integration tests
#![allow(dead_code)]

use barter_negotiation::config::{NegotiationConfig, StoreConfig};
use barter_negotiation::error::StoreError;
use barter_negotiation::store::{SledStore, TradeRequestStore, UserStore};
use barter_negotiation::trade::TradeRequest;
use barter_negotiation::user::UserAggregate;
use std::sync::{Arc, Mutex};
use tempfile::{TempDir, tempdir};

/// Open a fresh store in its own temp directory.
///
/// Sled locks its directory, so every test gets a separate database. Keep
/// the returned `TempDir` alive for as long as the store is used.
pub fn open_store(name: &str) -> anyhow::Result<(TempDir, Arc<SledStore>)> {
    let temp_dir = tempdir()?;
    let config = StoreConfig {
        path: temp_dir.path().join(name),
        flush_every_write: false,
    };
    let store = SledStore::open(&config)?;
    Ok((temp_dir, Arc::new(store)))
}

pub fn items(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

pub fn config() -> NegotiationConfig {
    NegotiationConfig::default()
}

/// Wraps a [`SledStore`] and fails user writes touching one username.
pub struct FailingStore {
    pub inner: Arc<SledStore>,
    fail_for: Mutex<Option<String>>,
}

impl FailingStore {
    pub fn new(inner: Arc<SledStore>) -> Self {
        Self {
            inner,
            fail_for: Mutex::new(None),
        }
    }

    /// Every later write of `username`'s record fails until [`FailingStore::heal`].
    pub fn fail_writes_for(&self, username: &str) {
        *self.fail_for.lock().unwrap() = Some(username.to_string());
    }

    pub fn heal(&self) {
        *self.fail_for.lock().unwrap() = None;
    }

    fn check(&self, user: &UserAggregate) -> Result<(), StoreError> {
        match self.fail_for.lock().unwrap().as_deref() {
            Some(name) if name.eq_ignore_ascii_case(&user.username) => Err(StoreError::Sled(
                sled::Error::Unsupported(format!("injected write failure for {name}")),
            )),
            _ => Ok(()),
        }
    }
}

impl UserStore for FailingStore {
    fn find_user(&self, id: &str) -> Result<Option<UserAggregate>, StoreError> {
        self.inner.find_user(id)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<UserAggregate>, StoreError> {
        self.inner.find_user_by_username(username)
    }

    fn save_user(&self, user: &UserAggregate) -> Result<UserAggregate, StoreError> {
        self.check(user)?;
        self.inner.save_user(user)
    }

    fn save_users(&self, users: &[UserAggregate]) -> Result<Vec<UserAggregate>, StoreError> {
        for user in users {
            self.check(user)?;
        }
        self.inner.save_users(users)
    }
}

impl TradeRequestStore for FailingStore {
    fn find_request(&self, id: &str) -> Result<Option<TradeRequest>, StoreError> {
        self.inner.find_request(id)
    }

    fn find_requests(&self, ids: &[String]) -> Result<Vec<TradeRequest>, StoreError> {
        self.inner.find_requests(ids)
    }

    fn save_request(&self, request: &TradeRequest) -> Result<TradeRequest, StoreError> {
        self.inner.save_request(request)
    }

    fn delete_request(&self, request: &TradeRequest) -> Result<(), StoreError> {
        self.inner.delete_request(request)
    }
}
