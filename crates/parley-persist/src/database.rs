use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::dbs::memory::MemoryDatabase;
#[cfg(feature = "mongodb")]
use crate::dbs::mongo::MongoDatabase;
use crate::error::PersistError;
use crate::repositories::RepositoryProvider;

/// A store that can run a unit of work atomically.
///
/// `f` receives a [`RepositoryProvider`] bound to the transaction. The
/// transaction commits when `f` returns `Ok` and rolls back on `Err`, so
/// either every write in `f` becomes visible or none does.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn execute_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<PersistError> + Send,
        F: for<'tx> FnOnce(&'tx mut dyn RepositoryProvider) -> BoxFuture<'tx, Result<T, E>> + Send;
}

/// Backend chosen at startup
pub enum DatabaseBackend {
    Memory(MemoryDatabase),
    #[cfg(feature = "mongodb")]
    Mongo(MongoDatabase),
}

impl DatabaseBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "mongodb")]
            Self::Mongo(_) => "mongodb",
        }
    }
}

#[async_trait]
impl Database for DatabaseBackend {
    async fn execute_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<PersistError> + Send,
        F: for<'tx> FnOnce(&'tx mut dyn RepositoryProvider) -> BoxFuture<'tx, Result<T, E>> + Send,
    {
        match self {
            Self::Memory(db) => db.execute_in_transaction(f).await,
            #[cfg(feature = "mongodb")]
            Self::Mongo(db) => db.execute_in_transaction(f).await,
        }
    }
}
