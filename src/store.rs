//! Persistence ports for the negotiators and their sled-backed implementation
//!
//! Every record carries a `version`. A save only lands when the stored
//! version still equals the one the caller read, and the returned copy holds
//! the bumped version. Nothing here spans more than one record except
//! [`UserStore::save_users`] and [`SledStore::register_user`], which are
//! all-or-nothing.
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::trade::TradeRequest;
use crate::user::UserAggregate;
use crate::utils;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult,
};
use sled::{Db, IVec, Transactional, Tree};
use tracing::debug;

const USER: &str = "user";
const TRADE_REQUEST: &str = "trade request";

pub trait UserStore {
    fn find_user(&self, id: &str) -> Result<Option<UserAggregate>, StoreError>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<UserAggregate>, StoreError>;
    fn save_user(&self, user: &UserAggregate) -> Result<UserAggregate, StoreError>;
    /// Saves several users as one unit; either every user is written or none is.
    fn save_users(&self, users: &[UserAggregate]) -> Result<Vec<UserAggregate>, StoreError>;
}

pub trait TradeRequestStore {
    fn find_request(&self, id: &str) -> Result<Option<TradeRequest>, StoreError>;
    /// Ids without a stored request are skipped.
    fn find_requests(&self, ids: &[String]) -> Result<Vec<TradeRequest>, StoreError>;
    /// Assigns an id to requests that have none.
    fn save_request(&self, request: &TradeRequest) -> Result<TradeRequest, StoreError>;
    fn delete_request(&self, request: &TradeRequest) -> Result<(), StoreError>;
}

pub struct SledStore {
    db: Db,
    users: Tree,
    usernames: Tree,
    trade_requests: Tree,
    flush_every_write: bool,
}

impl SledStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let db = sled::open(&config.path)?;
        Self::with_db(db, config.flush_every_write)
    }

    pub fn with_db(db: Db, flush_every_write: bool) -> Result<Self, StoreError> {
        Ok(Self {
            users: db.open_tree("users")?,
            usernames: db.open_tree("usernames")?,
            trade_requests: db.open_tree("trade_requests")?,
            db,
            flush_every_write,
        })
    }

    /// Creates a user with a fresh id. Usernames are unique ignoring ASCII case.
    pub fn register_user(
        &self,
        username: &str,
        inventory: Vec<String>,
    ) -> Result<UserAggregate, StoreError> {
        let mut user = UserAggregate::new(username, inventory);
        user.id = utils::new_uuid_to_bech32("user_").map_err(StoreError::Identifier)?;
        user.version = 1;

        let key = username.to_ascii_lowercase();
        let bytes = encode(USER, &user)?;

        // the username claim and the record land together or not at all
        let outcome = (&self.usernames, &self.users).transaction(
            |(usernames, users)| -> ConflictableTransactionResult<(), StoreError> {
                if usernames.get(key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        StoreError::DuplicateUsername(username.to_string()),
                    ));
                }
                usernames.insert(key.as_bytes(), user.id.as_bytes())?;
                users.insert(user.id.as_bytes(), bytes.clone())?;
                Ok(())
            },
        );
        settle(outcome)?;
        self.flush()?;
        debug!(user_id = %user.id, username, "registered user");

        Ok(user)
    }

    fn flush(&self) -> Result<(), StoreError> {
        if self.flush_every_write {
            self.db.flush()?;
        }
        Ok(())
    }
}

impl UserStore for SledStore {
    fn find_user(&self, id: &str) -> Result<Option<UserAggregate>, StoreError> {
        self.users
            .get(id.as_bytes())?
            .map(|bytes| decode(USER, &bytes))
            .transpose()
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<UserAggregate>, StoreError> {
        match self.usernames.get(username.to_ascii_lowercase())? {
            Some(id) => self.find_user(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn save_user(&self, user: &UserAggregate) -> Result<UserAggregate, StoreError> {
        let current = self.users.get(user.id.as_bytes())?;
        check_version(USER, &user.id, user.version, current.as_ref(), |stored| {
            decode::<UserAggregate>(USER, stored).map(|u| u.version)
        })?;

        let mut next = user.clone();
        next.version += 1;

        self.users
            .compare_and_swap(
                user.id.as_bytes(),
                current.as_deref(),
                Some(encode(USER, &next)?),
            )?
            .map_err(|_| conflict(USER, &user.id, user.version))?;
        self.flush()?;

        Ok(next)
    }

    fn save_users(&self, users: &[UserAggregate]) -> Result<Vec<UserAggregate>, StoreError> {
        let outcome = self.users.transaction(
            |tx| -> ConflictableTransactionResult<Vec<UserAggregate>, StoreError> {
                let mut saved = Vec::with_capacity(users.len());
                for user in users {
                    let current = tx.get(user.id.as_bytes())?;
                    check_version(USER, &user.id, user.version, current.as_ref(), |stored| {
                        decode::<UserAggregate>(USER, stored).map(|u| u.version)
                    })
                    .map_err(ConflictableTransactionError::Abort)?;

                    let mut next = user.clone();
                    next.version += 1;
                    let bytes =
                        encode(USER, &next).map_err(ConflictableTransactionError::Abort)?;
                    tx.insert(user.id.as_bytes(), bytes)?;
                    saved.push(next);
                }
                Ok(saved)
            },
        );

        let saved = settle(outcome)?;
        self.flush()?;

        Ok(saved)
    }
}

impl TradeRequestStore for SledStore {
    fn find_request(&self, id: &str) -> Result<Option<TradeRequest>, StoreError> {
        self.trade_requests
            .get(id.as_bytes())?
            .map(|bytes| decode(TRADE_REQUEST, &bytes))
            .transpose()
    }

    fn find_requests(&self, ids: &[String]) -> Result<Vec<TradeRequest>, StoreError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.find_request(id)? {
                found.push(request);
            }
        }
        Ok(found)
    }

    fn save_request(&self, request: &TradeRequest) -> Result<TradeRequest, StoreError> {
        let mut next = request.clone();
        if next.id.is_empty() {
            next.id = utils::new_uuid_to_bech32("trade_").map_err(StoreError::Identifier)?;
        }

        let current = self.trade_requests.get(next.id.as_bytes())?;
        check_version(
            TRADE_REQUEST,
            &next.id,
            request.version,
            current.as_ref(),
            |stored| decode::<TradeRequest>(TRADE_REQUEST, stored).map(|r| r.version),
        )?;
        next.version += 1;

        self.trade_requests
            .compare_and_swap(
                next.id.as_bytes(),
                current.as_deref(),
                Some(encode(TRADE_REQUEST, &next)?),
            )?
            .map_err(|_| conflict(TRADE_REQUEST, &next.id, request.version))?;
        self.flush()?;

        Ok(next)
    }

    fn delete_request(&self, request: &TradeRequest) -> Result<(), StoreError> {
        let current = self.trade_requests.get(request.id.as_bytes())?;
        if current.is_none() {
            return Err(StoreError::Missing {
                record: TRADE_REQUEST,
                id: request.id.clone(),
            });
        }
        check_version(
            TRADE_REQUEST,
            &request.id,
            request.version,
            current.as_ref(),
            |stored| decode::<TradeRequest>(TRADE_REQUEST, stored).map(|r| r.version),
        )?;

        self.trade_requests
            .compare_and_swap(request.id.as_bytes(), current.as_deref(), None::<IVec>)?
            .map_err(|_| conflict(TRADE_REQUEST, &request.id, request.version))?;
        self.flush()?;

        Ok(())
    }
}

// A record that is not stored yet must arrive with version 0; a stored one
// must arrive with the version currently on disk.
fn check_version(
    record: &'static str,
    id: &str,
    expected: u64,
    current: Option<&IVec>,
    stored_version: impl Fn(&[u8]) -> Result<u64, StoreError>,
) -> Result<(), StoreError> {
    match current {
        Some(bytes) if stored_version(&bytes[..])? == expected => Ok(()),
        Some(_) => Err(conflict(record, id, expected)),
        None if expected == 0 => Ok(()),
        None => Err(StoreError::Missing {
            record,
            id: id.to_string(),
        }),
    }
}

fn settle<T>(outcome: TransactionResult<T, StoreError>) -> Result<T, StoreError> {
    match outcome {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

fn conflict(record: &'static str, id: &str, expected: u64) -> StoreError {
    StoreError::VersionConflict {
        record,
        id: id.to_string(),
        expected,
    }
}

fn encode<T: minicbor::Encode<()>>(record: &'static str, value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|err| StoreError::Encode {
        record,
        reason: err.to_string(),
    })
}

fn decode<T>(record: &'static str, bytes: &[u8]) -> Result<T, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|source| StoreError::Decode { record, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::TradeMethod;
    use tempfile::tempdir;

    fn open_store(name: &str) -> anyhow::Result<(tempfile::TempDir, SledStore)> {
        let temp_dir = tempdir()?;
        let config = StoreConfig {
            path: temp_dir.path().join(name),
            flush_every_write: false,
        };
        let store = SledStore::open(&config)?;
        Ok((temp_dir, store))
    }

    #[test]
    fn usernames_are_unique_ignoring_case() -> anyhow::Result<()> {
        let (_dir, store) = open_store("usernames.db")?;

        let alice = store.register_user("alice", vec!["i1".into()])?;
        assert!(alice.id.starts_with("user_1"));
        assert!(matches!(
            store.register_user("ALICE", vec![]),
            Err(StoreError::DuplicateUsername(_))
        ));

        let found = store.find_user_by_username("Alice")?.unwrap();
        assert_eq!(found, alice);
        Ok(())
    }

    #[test]
    fn refused_registration_leaves_existing_user_intact() -> anyhow::Result<()> {
        let (_dir, store) = open_store("register.db")?;
        let erin = store.register_user("erin", vec!["e1".into()])?;

        assert!(matches!(
            store.register_user("Erin", vec!["other".into()]),
            Err(StoreError::DuplicateUsername(_))
        ));

        // index and record agree, and only the first registration exists
        let by_name = store.find_user_by_username("ERIN")?.unwrap();
        assert_eq!(by_name.id, erin.id);
        assert_eq!(store.find_user(&erin.id)?.unwrap().inventory, vec!["e1".to_string()]);
        assert_eq!(store.users.len(), 1);
        assert_eq!(store.usernames.len(), 1);
        Ok(())
    }

    #[test]
    fn stale_save_is_rejected() -> anyhow::Result<()> {
        let (_dir, store) = open_store("stale.db")?;
        let bob = store.register_user("bob", vec![])?;

        let mut first = bob.clone();
        first.inventory.push("j1".into());
        let saved = store.save_user(&first)?;
        assert_eq!(saved.version, bob.version + 1);

        // second writer still holds the old version
        let mut second = bob.clone();
        second.inventory.push("j2".into());
        assert!(matches!(
            store.save_user(&second),
            Err(StoreError::VersionConflict { .. })
        ));

        let stored = store.find_user(&bob.id)?.unwrap();
        assert_eq!(stored.inventory, vec!["j1".to_string()]);
        Ok(())
    }

    #[test]
    fn batch_save_is_all_or_nothing() -> anyhow::Result<()> {
        let (_dir, store) = open_store("batch.db")?;
        let carol = store.register_user("carol", vec![])?;
        let dave = store.register_user("dave", vec![])?;

        let mut stale_dave = dave.clone();
        stale_dave.version = 0;
        let mut carol_edit = carol.clone();
        carol_edit.attach_trade_request("trade_x");

        assert!(store.save_users(&[carol_edit.clone(), stale_dave]).is_err());
        assert!(store.find_user(&carol.id)?.unwrap().trade_requests.is_empty());

        let saved = store.save_users(&[carol_edit, dave])?;
        assert_eq!(saved.len(), 2);
        assert_eq!(
            store.find_user(&carol.id)?.unwrap().trade_requests,
            vec!["trade_x".to_string()]
        );
        Ok(())
    }

    #[test]
    fn trade_requests_get_ids_and_can_be_deleted() -> anyhow::Result<()> {
        let (_dir, store) = open_store("requests.db")?;
        let request = TradeRequest::new(
            "user_a".into(),
            "user_b".into(),
            vec!["i1".into()],
            vec![],
            TradeMethod::Contact,
            String::new(),
            false,
        );

        let saved = store.save_request(&request)?;
        assert!(saved.id.starts_with("trade_1"));
        assert_eq!(saved.version, 1);

        let found = store.find_requests(&[saved.id.clone(), "trade_missing".into()])?;
        assert_eq!(found, vec![saved.clone()]);

        store.delete_request(&saved)?;
        assert!(store.find_request(&saved.id)?.is_none());
        assert!(matches!(
            store.delete_request(&saved),
            Err(StoreError::Missing { .. })
        ));
        Ok(())
    }
}
