use async_stream::stream;
use cid::Cid;
use futures::StreamExt;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::block::Block;
use crate::context::OpContext;
use crate::error::{BlockError, Result};
use crate::exchange::Exchange;
use crate::store::{BlockStream, Blockstore, DeleteStream};

/// Default bound on concurrent backend calls during eager batch fan-out.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 100;

/// Routes block reads and writes to the local store or, when one is
/// installed, to the exchange.
///
/// The service is a pass-through layer, not a storage engine: it adds
/// argument validation and the existence-before-delete invariant, and
/// otherwise surfaces backend errors verbatim. Dispatch is a presence check
/// on the exchange slot — exchange present means reads and writes go to the
/// exchange (which consults the store itself), absent means they go straight
/// to the store. Deletes always target the store.
///
/// Each operation snapshots the exchange slot at entry: installing or
/// removing an exchange affects operations issued afterwards, while
/// operations already dispatched run to completion against the backend they
/// started with.
pub struct BlockService {
    store: Arc<dyn Blockstore>,
    exchange: RwLock<Option<Arc<dyn Exchange>>>,
    batch_concurrency: usize,
}

/// Snapshot of whichever backend reads go to, taken once per operation.
#[derive(Clone)]
enum ReadBackend {
    Store(Arc<dyn Blockstore>),
    Exchange(Arc<dyn Exchange>),
}

impl ReadBackend {
    async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block> {
        match self {
            ReadBackend::Store(store) => store.get(cid, ctx).await,
            ReadBackend::Exchange(exchange) => exchange.get(cid, ctx).await,
        }
    }
}

impl BlockService {
    /// Creates an offline service over the given store.
    pub fn new(store: Arc<dyn Blockstore>) -> Self {
        Self::with_batch_concurrency(store, DEFAULT_BATCH_CONCURRENCY)
    }

    /// Creates an offline service with an explicit eager-batch fan-out bound.
    pub fn with_batch_concurrency(store: Arc<dyn Blockstore>, batch_concurrency: usize) -> Self {
        BlockService {
            store,
            exchange: RwLock::new(None),
            batch_concurrency,
        }
    }

    pub fn store(&self) -> &Arc<dyn Blockstore> {
        &self.store
    }

    /// Installs an exchange, overwriting any previous one. No effect on
    /// operations already dispatched.
    pub fn set_exchange(&self, exchange: Arc<dyn Exchange>) {
        *self.exchange.write().unwrap() = Some(exchange);
    }

    /// Removes the exchange, reverting to local-only routing.
    pub fn unset_exchange(&self) {
        *self.exchange.write().unwrap() = None;
    }

    pub fn has_exchange(&self) -> bool {
        self.exchange.read().unwrap().is_some()
    }

    // Lock held only for the pointer clone, never across an await.
    fn exchange(&self) -> Option<Arc<dyn Exchange>> {
        self.exchange.read().unwrap().clone()
    }

    fn read_backend(&self) -> ReadBackend {
        match self.exchange() {
            Some(exchange) => ReadBackend::Exchange(exchange),
            None => ReadBackend::Store(Arc::clone(&self.store)),
        }
    }

    /// Stores a block via the exchange if one is installed, else the store.
    pub async fn put(&self, block: Block, ctx: &OpContext) -> Result<Block> {
        match self.exchange() {
            Some(exchange) => exchange.put(block, ctx).await,
            None => self.store.put(block, ctx).await,
        }
    }

    /// Retrieves a block via the exchange if one is installed, else the store.
    pub async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block> {
        self.read_backend().get(cid, ctx).await
    }

    /// Deletes a block from the local store. Always local, online or not.
    ///
    /// Existence is checked first: deleting an absent address fails with
    /// `BlockNotFound` without issuing a delete, so a caller deleting the
    /// wrong key finds out. Re-deleting an already-deleted address is
    /// therefore not idempotent. The check-then-delete pair is not atomic
    /// against concurrent writers; a lost race surfaces as a backend error.
    pub async fn delete(&self, cid: &Cid, ctx: &OpContext) -> Result<()> {
        if !self.store.has(cid, ctx).await? {
            return Err(BlockError::BlockNotFound(*cid));
        }
        self.store.delete(cid, ctx).await
    }

    /// Stores a batch of blocks, delegating the whole batch to the backend's
    /// batch verb. Yields one result per block.
    pub fn put_many(&self, blocks: Vec<Block>, ctx: OpContext) -> BlockStream<'static> {
        match self.exchange() {
            Some(exchange) => Box::pin(stream! {
                let mut inner = exchange.put_many(blocks, ctx);
                while let Some(item) = inner.next().await {
                    yield item;
                }
            }),
            None => {
                let store = Arc::clone(&self.store);
                Box::pin(stream! {
                    let mut inner = store.put_many(blocks, ctx);
                    while let Some(item) = inner.next().await {
                        yield item;
                    }
                })
            }
        }
    }

    /// Retrieves a batch of blocks as a lazy stream in request order.
    ///
    /// Offline, each address is resolved against the store only when the
    /// consumer pulls it, so dropping the stream early leaves the rest
    /// untouched. A `NotFound` at one position does not abort the positions
    /// after it.
    pub fn get_many(&self, cids: Vec<Cid>, ctx: OpContext) -> BlockStream<'static> {
        match self.exchange() {
            Some(exchange) => Box::pin(stream! {
                let mut inner = exchange.get_many(cids, ctx);
                while let Some(item) = inner.next().await {
                    yield item;
                }
            }),
            None => {
                let store = Arc::clone(&self.store);
                Box::pin(stream! {
                    for cid in cids {
                        yield store.get(&cid, &ctx).await;
                    }
                })
            }
        }
    }

    /// Retrieves a batch of blocks as an eager map of per-key outcomes.
    ///
    /// Every requested address appears in the map with its block or its
    /// error; duplicates collapse by overwrite. Lookups fan out concurrently,
    /// bounded by the service's batch concurrency. The whole operation fails
    /// only for cancellation or task failure, never because a key was
    /// missing.
    pub async fn get_many_map(
        &self,
        cids: Vec<Cid>,
        ctx: &OpContext,
    ) -> Result<HashMap<Cid, Result<Block>>> {
        ctx.ensure_active()?;
        let backend = self.read_backend();
        let semaphore = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut lookups = JoinSet::new();

        for cid in cids {
            let backend = backend.clone();
            let semaphore = Arc::clone(&semaphore);
            let ctx = ctx.clone();
            lookups.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let outcome = ctx.run(backend.get(&cid, &ctx)).await;
                (cid, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            let (cid, outcome) = joined.map_err(BlockError::backend)?;
            if matches!(outcome, Err(BlockError::Cancelled)) {
                // Dropping the set aborts the outstanding lookups.
                return Err(BlockError::Cancelled);
            }
            outcomes.insert(cid, outcome);
        }
        Ok(outcomes)
    }

    /// Deletes a batch of addresses, yielding one outcome per address.
    ///
    /// Strictly sequential and lazy: the existence check for address i+1
    /// happens only when the consumer pulls past item i. Each address gets
    /// the same check-then-delete discipline as [`delete`](Self::delete), so
    /// a duplicate address in the batch succeeds once and then fails with
    /// `BlockNotFound` — absent addresses are never silently skipped.
    pub fn delete_many(&self, cids: Vec<Cid>, ctx: OpContext) -> DeleteStream<'static> {
        let store = Arc::clone(&self.store);
        debug!("delete_many: {} addresses", cids.len());
        Box::pin(stream! {
            for cid in cids {
                let outcome = async {
                    if !store.has(&cid, &ctx).await? {
                        return Err(BlockError::BlockNotFound(cid));
                    }
                    store.delete(&cid, &ctx).await?;
                    Ok(cid)
                };
                yield outcome.await;
            }
        })
    }
}
