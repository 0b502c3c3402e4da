use crate::reconcile::Repair;
use crate::trade::TradeRequestStatus;
use crate::user::FriendRequestStatus;

pub type Result<T, E = NegotiationError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage engine failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode {record}: {reason}")]
    Encode { record: &'static str, reason: String },
    #[error("failed to decode {record}: {source}")]
    Decode {
        record: &'static str,
        #[source]
        source: minicbor::decode::Error,
    },
    #[error("{record} `{id}` was modified concurrently (expected version {expected})")]
    VersionConflict {
        record: &'static str,
        id: String,
        expected: u64,
    },
    #[error("{record} `{id}` does not exist")]
    Missing { record: &'static str, id: String },
    #[error("username `{0}` is already taken")]
    DuplicateUsername(String),
    #[error("failed to mint identifier: {0}")]
    Identifier(#[source] anyhow::Error),
}

/// How a caller should react to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input. Nothing was written.
    ClientCorrectable,
    /// The records are not in a state that allows the operation. Nothing was written.
    StateConflict,
    /// Storage failed. For `FatalInconsistency` a partial write is on disk.
    Infrastructure,
}

/// Which status an `InvalidStatus` rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMismatch {
    /// The caller asked for a status the operation cannot set.
    Requested(TradeRequestStatus),
    /// The stored request is in a status the operation cannot act on.
    Current(TradeRequestStatus),
}

/// A two-write operation committed its first write but not its second.
#[derive(Debug)]
pub struct Inconsistency {
    pub operation: &'static str,
    pub committed: String,
    pub repair: Repair,
    pub source: StoreError,
}

#[derive(thiserror::Error, Debug)]
pub enum NegotiationError {
    #[error("no user matches `{0}`")]
    NoSuchUser(String),
    #[error("a user cannot negotiate with themselves")]
    SelfTarget,
    #[error("one or more item ids are not owned by the expected user")]
    InvalidItems,
    #[error("`{0}` is not a recognised trade method")]
    InvalidMethod(String),
    #[error("status is not valid for this operation: {0:?}")]
    InvalidStatus(StatusMismatch),
    #[error("a counter offer must name at least one item")]
    NoItemsGiven,
    #[error("the friend request list has not been initialised")]
    NotInitialized,
    #[error("no matching request: {0}")]
    RequestNotFound(String),
    #[error("a friend request already exists with status {0}")]
    RequestExists(FriendRequestStatus),
    #[error("an identical pending trade request already exists: {0}")]
    DuplicateRequest(String),
    #[error("trade request is {0}, not Pending")]
    NotPending(TradeRequestStatus),
    #[error("only the target of a trade request may respond to it")]
    WrongTarget,
    #[error("caller is not permitted to act on this trade request")]
    WrongOwner,
    #[error("receipt has already been marked by this participant")]
    AlreadyMarked,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{} left records inconsistent after committing {}: {}", .0.operation, .0.committed, .0.source)]
    FatalInconsistency(Box<Inconsistency>),
}

impl NegotiationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NegotiationError::NoSuchUser(_)
            | NegotiationError::SelfTarget
            | NegotiationError::InvalidItems
            | NegotiationError::InvalidMethod(_)
            | NegotiationError::InvalidStatus(StatusMismatch::Requested(_))
            | NegotiationError::NoItemsGiven
            | NegotiationError::RequestNotFound(_) => ErrorKind::ClientCorrectable,

            NegotiationError::InvalidStatus(StatusMismatch::Current(_))
            | NegotiationError::NotInitialized
            | NegotiationError::RequestExists(_)
            | NegotiationError::DuplicateRequest(_)
            | NegotiationError::NotPending(_)
            | NegotiationError::WrongTarget
            | NegotiationError::WrongOwner
            | NegotiationError::AlreadyMarked
            | NegotiationError::Store(StoreError::VersionConflict { .. })
            | NegotiationError::Store(StoreError::Missing { .. }) => {
                ErrorKind::StateConflict
            }

            NegotiationError::Store(_) | NegotiationError::FatalInconsistency(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
    /// The repair needed to bring both sides back in step, if records diverged.
    pub fn repair(&self) -> Option<&Repair> {
        match self {
            NegotiationError::FatalInconsistency(inconsistency) => Some(&inconsistency.repair),
            _ => None,
        }
    }
}
