//! Write-buffering view of the store handed to mutators.
//!
//! A [`TransactionCache`] lives for exactly one push attempt. Reads go to the
//! overlay first and fall through to the store; writes only touch the overlay
//! until [`TransactionCache::flush`] turns them into entry rows.

use futures::future::BoxFuture;
use serde_json::Value;
use stow_engine::{merge_pending_changes, Change, Checkpoint, Key, Lookup, Overlay, Version};

use crate::store::{StoreError, StoreTx};

/// Bounds for [`WriteTransaction::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Inclusive lower bound; defaults to `prefix`.
    pub start: Option<String>,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
}

impl ScanOptions {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The first key the scan may return.
    fn lower_bound(&self) -> &str {
        match &self.start {
            Some(start) if start.as_str() > self.prefix.as_str() => start,
            _ => &self.prefix,
        }
    }
}

/// What a mutator may do to a space.
pub trait WriteTransaction: Send {
    /// The client whose mutation is running.
    fn client_id(&self) -> &str;

    fn get<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>>;

    fn has<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    fn put(&mut self, key: &str, value: Value);

    /// Delete a key, returning whether it was live.
    fn del<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Live entries in key order, pending writes included.
    fn scan(&mut self, options: ScanOptions) -> BoxFuture<'_, Result<Vec<(Key, Value)>, StoreError>>;
}

/// Overlay-backed [`WriteTransaction`] over one open store transaction.
pub struct TransactionCache<'t> {
    tx: &'t mut StoreTx,
    space_id: String,
    client_id: String,
    overlay: Overlay,
}

impl<'t> TransactionCache<'t> {
    pub fn new(tx: &'t mut StoreTx, space_id: impl Into<String>) -> Self {
        Self {
            tx,
            space_id: space_id.into(),
            client_id: String::new(),
            overlay: Overlay::new(),
        }
    }

    /// Attribute subsequent mutator calls to `client_id`.
    pub fn set_client(&mut self, client_id: impl Into<String>) {
        self.client_id = client_id.into();
    }

    /// The underlying transaction, for bookkeeping outside the overlay.
    pub fn store(&mut self) -> &mut StoreTx {
        self.tx
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.overlay.checkpoint()
    }

    /// Drop every write made since `checkpoint` was taken.
    pub fn rollback_to(&mut self, checkpoint: Checkpoint) {
        self.overlay.restore(checkpoint);
    }

    pub fn pending_count(&self) -> usize {
        self.overlay.dirty_count()
    }

    async fn read(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.overlay.lookup(key) {
            Lookup::Live(value) => return Ok(Some(value.clone())),
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        let value = self.tx.get_entry(&self.space_id, key).await?;
        self.overlay.cache_clean(key, value.clone());
        Ok(value)
    }

    /// Write every pending change at `version`. Returns the number written.
    pub async fn flush(self, version: Version) -> Result<usize, StoreError> {
        let changes = self.overlay.into_changes();
        for change in &changes {
            match change {
                Change::Put { key, value } => {
                    self.tx.put_entry(&self.space_id, key, value, version).await?
                }
                Change::Delete { key } => self.tx.del_entry(&self.space_id, key, version).await?,
            }
        }

        tracing::debug!(
            space_id = %self.space_id,
            version,
            changes = changes.len(),
            "Flushed pending changes"
        );
        Ok(changes.len())
    }
}

impl WriteTransaction for TransactionCache<'_> {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn get<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        Box::pin(self.read(key))
    }

    fn has<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move { Ok(self.read(key).await?.is_some()) })
    }

    fn put(&mut self, key: &str, value: Value) {
        self.overlay.put(key, value);
    }

    fn del<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let existed = self.read(key).await?.is_some();
            self.overlay.delete(key);
            Ok(existed)
        })
    }

    fn scan(&mut self, options: ScanOptions) -> BoxFuture<'_, Result<Vec<(Key, Value)>, StoreError>> {
        Box::pin(async move {
            let start = options.lower_bound().to_string();
            let source = self
                .tx
                .get_entries(&self.space_id, &start, &options.prefix)
                .await?;

            let pending = self
                .overlay
                .pending_from(&start)
                .take_while(|(key, _)| key.starts_with(&options.prefix));
            let merged = merge_pending_changes(source, pending);

            Ok(match options.limit {
                Some(limit) => merged.take(limit).collect(),
                None => merged.collect(),
            })
        })
    }
}
