use async_stream::stream;
use async_trait::async_trait;
use cid::Cid;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::block::Block;
use crate::context::OpContext;
use crate::error::{BlockError, Result};

/// Lazy sequence of per-item block results. Each element may fail
/// independently; an error at one position does not abort the rest.
pub type BlockStream<'a> = BoxStream<'a, Result<Block>>;

/// Lazy sequence of per-item delete outcomes: the deleted address, or the
/// error for that address.
pub type DeleteStream<'a> = BoxStream<'a, Result<Cid>>;

/// The local persistent backend for blocks.
///
/// Stores operate on whole blocks keyed by content address — the router has
/// no knowledge of the on-disk encoding. Batch verbs have default sequential
/// implementations composed from the single verbs, so a backend only has to
/// supply those four. Every method takes an [`OpContext`] and must honor its
/// cancellation signal.
///
/// All methods take `&self` to support stores with internal locking.
#[async_trait]
pub trait Blockstore: Send + Sync {
    /// Stores a block, returning the stored representation.
    async fn put(&self, block: Block, ctx: &OpContext) -> Result<Block>;

    /// Retrieves the block at an address, or fails with `NotFound`.
    async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block>;

    /// Checks whether an address exists in the store.
    async fn has(&self, cid: &Cid, ctx: &OpContext) -> Result<bool>;

    /// Removes the block at an address. Absent addresses are a backend-level
    /// `NotFound`; callers going through the router never reach that case
    /// because the router checks existence first.
    async fn delete(&self, cid: &Cid, ctx: &OpContext) -> Result<()>;

    /// Batch put. The default stores one block per pull of the stream.
    fn put_many<'a>(&'a self, blocks: Vec<Block>, ctx: OpContext) -> BlockStream<'a> {
        Box::pin(stream! {
            for block in blocks {
                yield self.put(block, &ctx).await;
            }
        })
    }

    /// Batch get, preserving input order. The default resolves one address
    /// per pull, so stopping early leaves the rest unresolved.
    fn get_many<'a>(&'a self, cids: Vec<Cid>, ctx: OpContext) -> BlockStream<'a> {
        Box::pin(stream! {
            for cid in cids {
                yield self.get(&cid, &ctx).await;
            }
        })
    }

    /// Batch delete. The default deletes one address per pull.
    fn delete_many<'a>(&'a self, cids: Vec<Cid>, ctx: OpContext) -> DeleteStream<'a> {
        Box::pin(stream! {
            for cid in cids {
                yield self.delete(&cid, &ctx).await.map(|()| cid);
            }
        })
    }
}

/// An in-memory store backed by a HashMap.
///
/// Useful for testing and as a reference implementation.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    data: RwLock<HashMap<Cid, Block>>,
}

impl MemoryBlockstore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }
}

#[async_trait]
impl Blockstore for MemoryBlockstore {
    async fn put(&self, block: Block, ctx: &OpContext) -> Result<Block> {
        ctx.ensure_active()?;
        self.data.write().unwrap().insert(*block.cid(), block.clone());
        Ok(block)
    }

    async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block> {
        ctx.ensure_active()?;
        self.data
            .read()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or(BlockError::NotFound(*cid))
    }

    async fn has(&self, cid: &Cid, ctx: &OpContext) -> Result<bool> {
        ctx.ensure_active()?;
        Ok(self.data.read().unwrap().contains_key(cid))
    }

    async fn delete(&self, cid: &Cid, ctx: &OpContext) -> Result<()> {
        ctx.ensure_active()?;
        match self.data.write().unwrap().remove(cid) {
            Some(_) => Ok(()),
            None => Err(BlockError::NotFound(*cid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn memory_store_put_get() {
        let store = MemoryBlockstore::new();
        let ctx = OpContext::new();
        let block = Block::new(b"hello world".to_vec());

        let stored = store.put(block.clone(), &ctx).await.unwrap();
        assert_eq!(stored, block);

        let retrieved = store.get(block.cid(), &ctx).await.unwrap();
        assert_eq!(retrieved, block);
    }

    #[tokio::test]
    async fn memory_store_get_missing() {
        let store = MemoryBlockstore::new();
        let ctx = OpContext::new();
        let absent = Block::new(b"nonexistent".to_vec());

        let err = store.get(absent.cid(), &ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::NotFound(cid) if cid == *absent.cid()));
    }

    #[tokio::test]
    async fn memory_store_has_and_delete() {
        let store = MemoryBlockstore::new();
        let ctx = OpContext::new();
        let block = Block::new(b"test".to_vec());

        assert!(!store.has(block.cid(), &ctx).await.unwrap());
        store.put(block.clone(), &ctx).await.unwrap();
        assert!(store.has(block.cid(), &ctx).await.unwrap());

        store.delete(block.cid(), &ctx).await.unwrap();
        assert!(!store.has(block.cid(), &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_delete_missing() {
        let store = MemoryBlockstore::new();
        let ctx = OpContext::new();
        let absent = Block::new(b"never stored".to_vec());

        let err = store.delete(absent.cid(), &ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::NotFound(_)));
    }

    #[tokio::test]
    async fn default_get_many_preserves_order() {
        let store = MemoryBlockstore::new();
        let ctx = OpContext::new();
        let blocks: Vec<Block> = (0u8..3).map(|i| Block::new(vec![i])).collect();
        for block in &blocks {
            store.put(block.clone(), &ctx).await.unwrap();
        }

        let cids: Vec<Cid> = blocks.iter().map(|b| *b.cid()).collect();
        let results: Vec<_> = store.get_many(cids, ctx).collect().await;

        assert_eq!(results.len(), 3);
        for (result, block) in results.iter().zip(&blocks) {
            assert_eq!(result.as_ref().unwrap(), block);
        }
    }

    #[tokio::test]
    async fn cancelled_context_rejects_every_verb() {
        let store = MemoryBlockstore::new();
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = OpContext::with_token(token);
        let block = Block::new(b"unreachable".to_vec());

        assert!(matches!(
            store.put(block.clone(), &ctx).await.unwrap_err(),
            BlockError::Cancelled
        ));
        assert!(matches!(
            store.get(block.cid(), &ctx).await.unwrap_err(),
            BlockError::Cancelled
        ));
        assert!(matches!(
            store.has(block.cid(), &ctx).await.unwrap_err(),
            BlockError::Cancelled
        ));
        assert!(matches!(
            store.delete(block.cid(), &ctx).await.unwrap_err(),
            BlockError::Cancelled
        ));
        assert!(store.is_empty());
    }
}
