use crate::core::records::{FollowEdge, UserEntity};
use crate::error::{ImportError, StoreError};
use crate::store::GraphStore;
use tracing::{debug, info};

/// Applies staged rows to the store in fixed-size transactional batches.
pub struct BulkLoader<'s> {
    store: &'s mut GraphStore,
    batch_size: usize,
}

impl<'s> BulkLoader<'s> {
    pub fn new(store: &'s mut GraphStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn apply_schema(&mut self) -> Result<usize, ImportError> {
        let declared = self.store.apply_schema()?;
        info!(declared, "schema applied");
        Ok(declared)
    }

    pub fn load_users<I>(&mut self, rows: I) -> Result<usize, ImportError>
    where
        I: IntoIterator<Item = Result<UserEntity, ImportError>>,
    {
        let store = &mut *self.store;
        let loaded = load_batched(rows, self.batch_size, "users", |batch| {
            store.upsert_users(batch)
        })?;
        info!(loaded, "users loaded");
        Ok(loaded)
    }

    pub fn load_follows<I>(&mut self, rows: I) -> Result<usize, ImportError>
    where
        I: IntoIterator<Item = Result<FollowEdge, ImportError>>,
    {
        let store = &mut *self.store;
        let loaded = load_batched(rows, self.batch_size, "follows", |batch| {
            store.upsert_follows(batch)
        })?;
        info!(loaded, "follow relationships loaded");
        Ok(loaded)
    }
}

fn load_batched<T, I, F>(
    rows: I,
    batch_size: usize,
    what: &str,
    mut flush: F,
) -> Result<usize, ImportError>
where
    I: IntoIterator<Item = Result<T, ImportError>>,
    F: FnMut(&[T]) -> Result<usize, StoreError>,
{
    let mut batch = Vec::with_capacity(batch_size);
    let mut loaded = 0;
    for row in rows {
        batch.push(row?);
        if batch.len() == batch_size {
            loaded += flush(&batch)?;
            debug!(loaded, what, "batch committed");
            batch.clear();
        }
    }
    if !batch.is_empty() {
        loaded += flush(&batch)?;
        debug!(loaded, what, "batch committed");
    }
    Ok(loaded)
}
