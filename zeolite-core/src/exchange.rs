use async_stream::stream;
use async_trait::async_trait;
use cid::Cid;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, warn};
use std::sync::Arc;

use crate::block::Block;
use crate::context::OpContext;
use crate::error::{BlockError, Result};
use crate::store::{BlockStream, Blockstore};

/// A network-capable collaborator that can both retrieve and propagate blocks.
///
/// An exchange is expected to consult the local store itself and fall back to
/// network retrieval on get, and to handle persistence and announcement on
/// put. Deletion is always local-only, so the exchange carries no delete
/// verbs. Every method must honor the context's cancellation signal.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn put(&self, block: Block, ctx: &OpContext) -> Result<Block>;

    async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block>;

    /// Batch put. The default stores one block per pull; exchanges with a
    /// native batching policy override this.
    fn put_many<'a>(&'a self, blocks: Vec<Block>, ctx: OpContext) -> BlockStream<'a> {
        Box::pin(stream! {
            for block in blocks {
                yield self.put(block, &ctx).await;
            }
        })
    }

    /// Batch get, streaming blocks in request order as they become available.
    fn get_many<'a>(&'a self, cids: Vec<Cid>, ctx: OpContext) -> BlockStream<'a> {
        Box::pin(stream! {
            for cid in cids {
                yield self.get(&cid, &ctx).await;
            }
        })
    }
}

/// A transport-agnostic reference exchange composed over provider stores.
///
/// Gets consult the local store first, then race the providers; the first
/// provider block that verifies against the requested address wins and is
/// written back to the local store best-effort. Puts write locally and then
/// announce to each provider best-effort. Providers are plain [`Blockstore`]
/// trait objects; a network-backed provider lives in a downstream crate.
pub struct ProviderExchange {
    local: Arc<dyn Blockstore>,
    providers: Vec<Arc<dyn Blockstore>>,
}

impl ProviderExchange {
    pub fn new(local: Arc<dyn Blockstore>, providers: Vec<Arc<dyn Blockstore>>) -> Self {
        ProviderExchange { local, providers }
    }
}

#[async_trait]
impl Exchange for ProviderExchange {
    async fn put(&self, block: Block, ctx: &OpContext) -> Result<Block> {
        ctx.ensure_active()?;
        let block = self.local.put(block, ctx).await?;
        // Announce failures are logged, not surfaced; cancellation still
        // propagates.
        for provider in &self.providers {
            match provider.put(block.clone(), ctx).await {
                Ok(_) => {}
                Err(BlockError::Cancelled) => return Err(BlockError::Cancelled),
                Err(err) => warn!("announce of {} to provider failed: {err}", block.cid()),
            }
        }
        Ok(block)
    }

    async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block> {
        ctx.ensure_active()?;
        match self.local.get(cid, ctx).await {
            Ok(block) => return Ok(block),
            Err(BlockError::NotFound(_)) => debug!("{cid} not local, trying providers"),
            Err(err) => return Err(err),
        }

        let mut fetches: FuturesUnordered<_> =
            self.providers.iter().map(|p| p.get(cid, ctx)).collect();
        let race = async {
            while let Some(fetched) = fetches.next().await {
                match fetched {
                    Ok(block) if block.cid() == cid && block.verify() => {
                        if let Err(err) = self.local.put(block.clone(), ctx).await {
                            warn!("write-back of {cid} failed: {err}");
                        }
                        return Ok(block);
                    }
                    Ok(block) => {
                        warn!("provider block failed verification for {cid} (got {})", block.cid());
                    }
                    Err(BlockError::Cancelled) => return Err(BlockError::Cancelled),
                    Err(err) => debug!("provider miss for {cid}: {err}"),
                }
            }
            Err(BlockError::NotFound(*cid))
        };
        ctx.run(race).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlockstore;

    fn exchange_with_provider() -> (Arc<MemoryBlockstore>, Arc<MemoryBlockstore>, ProviderExchange) {
        let local = Arc::new(MemoryBlockstore::new());
        let provider = Arc::new(MemoryBlockstore::new());
        let exchange = ProviderExchange::new(local.clone(), vec![provider.clone()]);
        (local, provider, exchange)
    }

    #[tokio::test]
    async fn get_prefers_local() {
        let (local, provider, exchange) = exchange_with_provider();
        let ctx = OpContext::new();
        let block = Block::new(b"local copy".to_vec());
        local.put(block.clone(), &ctx).await.unwrap();

        let fetched = exchange.get(block.cid(), &ctx).await.unwrap();
        assert_eq!(fetched, block);
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn get_fetches_from_provider_and_writes_back() {
        let (local, provider, exchange) = exchange_with_provider();
        let ctx = OpContext::new();
        let block = Block::new(b"remote only".to_vec());
        provider.put(block.clone(), &ctx).await.unwrap();

        let fetched = exchange.get(block.cid(), &ctx).await.unwrap();
        assert_eq!(fetched, block);
        // Fetched block was written back to the local store.
        assert!(local.has(block.cid(), &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn get_discards_forged_provider_block() {
        let (local, provider, exchange) = exchange_with_provider();
        let ctx = OpContext::new();
        let wanted = Block::new(b"genuine".to_vec());
        let forged = Block::from_parts_unchecked(*wanted.cid(), b"forged".to_vec());
        provider.put(forged, &ctx).await.unwrap();

        let err = exchange.get(wanted.cid(), &ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::NotFound(_)));
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn get_missing_everywhere() {
        let (_local, _provider, exchange) = exchange_with_provider();
        let ctx = OpContext::new();
        let absent = Block::new(b"nowhere".to_vec());

        let err = exchange.get(absent.cid(), &ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::NotFound(cid) if cid == *absent.cid()));
    }

    #[tokio::test]
    async fn put_persists_locally_and_announces() {
        let (local, provider, exchange) = exchange_with_provider();
        let ctx = OpContext::new();
        let block = Block::new(b"announced".to_vec());

        exchange.put(block.clone(), &ctx).await.unwrap();
        assert!(local.has(block.cid(), &ctx).await.unwrap());
        assert!(provider.has(block.cid(), &ctx).await.unwrap());
    }
}
