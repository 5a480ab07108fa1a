use std::sync::Arc;

use parking_lot::Mutex;

use gridbase_core::{Base, OwnerId, TableDetail};
use gridbase_storage::{SqliteStorage, Storage, StorageError, TableSkeleton};

use crate::gate::ResponseGate;
use crate::transport::LocalTransport;

/// A grid server living in the test process: one SQLite database shared by
/// every transport it hands out.
pub struct TestServer {
    storage: Arc<Mutex<SqliteStorage>>,
}

impl TestServer {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            storage: Arc::new(Mutex::new(SqliteStorage::open_in_memory()?)),
        })
    }

    pub fn open(path: &str) -> Result<Self, StorageError> {
        Ok(Self {
            storage: Arc::new(Mutex::new(SqliteStorage::open(path)?)),
        })
    }

    pub fn create_base(&self, owner: OwnerId, name: &str) -> Result<Base, StorageError> {
        self.storage.lock().create_base(owner, name)
    }

    pub fn create_table(
        &self,
        owner: OwnerId,
        base: &Base,
        name: &str,
        skeleton: TableSkeleton,
    ) -> Result<TableDetail, StorageError> {
        self.storage
            .lock()
            .create_table(owner, base.base_id, name, skeleton)
    }

    /// New owner with one base holding one table.
    pub fn seed_table(
        &self,
        name: &str,
        skeleton: TableSkeleton,
    ) -> Result<(OwnerId, TableDetail), StorageError> {
        let owner = OwnerId::new();
        let base = self.create_base(owner, "Workspace")?;
        let table = self.create_table(owner, &base, name, skeleton)?;
        Ok((owner, table))
    }

    pub fn transport(&self, owner: OwnerId) -> LocalTransport {
        LocalTransport::new(owner, self.storage.clone())
    }

    pub fn gated_transport(&self, owner: OwnerId, gate: Arc<ResponseGate>) -> LocalTransport {
        self.transport(owner).with_gate(gate)
    }

    /// Direct storage access for assertions on what the server holds.
    pub fn with_storage<R>(&self, f: impl FnOnce(&mut SqliteStorage) -> R) -> R {
        let mut storage = self.storage.lock();
        f(&mut *storage)
    }
}
