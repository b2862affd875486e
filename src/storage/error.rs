use thiserror::Error;

use crate::domain::{AccountId, CurrencyCode};

/// Failures of the balance store, split by what a caller can do about them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no balance row for account {account} in {currency}")]
    NotFound {
        account: AccountId,
        currency: CurrencyCode,
    },

    /// The store could not be reached or the lock could not be taken in time.
    /// Nothing was committed.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("store query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// COMMIT itself failed. The write may or may not be durable, so this is
    /// never transient: retrying could apply the same change twice.
    #[error("commit outcome unknown: {0}")]
    CommitUncertain(#[source] sqlx::Error),

    #[error("corrupt balance data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            StoreError::Unavailable(err)
        } else {
            StoreError::Query(err)
        }
    }
}

// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_IOERR: i32 = 10;
const SQLITE_CANTOPEN: i32 = 14;

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // extended codes keep the primary code in the low byte
            .map(|code| {
                matches!(
                    code & 0xff,
                    SQLITE_BUSY | SQLITE_LOCKED | SQLITE_IOERR | SQLITE_CANTOPEN
                )
            })
            .unwrap_or(false),
        _ => false,
    }
}
