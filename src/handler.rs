use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::SqliteConnection;
use log::error;

use crate::errors::DBError;

pub trait WithDB {
    fn dbpool(&self) -> &Pool<ConnectionManager<SqliteConnection>>;

    fn handle_errors(&self, e: diesel::result::Error) -> DBError {
        match e {
            diesel::result::Error::NotFound => DBError::not_found(),
            _ => {
                error!("{:?}", e);
                DBError::new()
            }
        }
    }

    fn dbconn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>, DBError> {
        self.dbpool().get().map_err(|e| {
            error!("{:?}", e);
            DBError::new()
        })
    }

    /// Runs `f` in a transaction on the request's connection; any error rolls it back.
    fn run_txn<T, F>(&self, conn: &mut SqliteConnection, f: F) -> Result<T, DBError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, anyhow::Error>,
    {
        conn.transaction::<T, anyhow::Error, _>(f).map_err(|e| {
            error!("transaction rolled back: {:?}", e);
            DBError::new()
        })
    }
}

pub struct EllaDB {
    dbpool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
}

impl EllaDB {
    pub fn new(dbpool: Arc<Pool<ConnectionManager<SqliteConnection>>>) -> Self {
        Self { dbpool }
    }
}

impl WithDB for EllaDB {
    fn dbpool(&self) -> &Pool<ConnectionManager<SqliteConnection>> {
        &self.dbpool
    }
}
