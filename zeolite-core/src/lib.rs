//! Zeolite is a routing layer for content-addressed block storage.
//!
//! Core concepts:
//! - **Block**: An immutable content value plus its content address (CIDv1, Blake3)
//! - **Blockstore**: The local persistent backend for blocks
//! - **Exchange**: A network-capable collaborator that retrieves and propagates blocks
//! - **BlockService**: Routes single and batch put/get/delete calls to the store
//!   or, when the node is online, to the exchange
//! - **OpContext**: Per-operation options carrying the cancellation signal
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use zeolite_core::{Block, BlockService, MemoryBlockstore, OpContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let service = BlockService::new(Arc::new(MemoryBlockstore::new()));
//! let ctx = OpContext::new();
//!
//! let block = service.put(Block::new(b"hello".to_vec()), &ctx).await.unwrap();
//! let fetched = service.get(block.cid(), &ctx).await.unwrap();
//! assert_eq!(fetched, block);
//! # }
//! ```
//!
//! # Routing
//!
//! The service is created offline: everything goes to the local store.
//! Installing an exchange with `set_exchange` routes reads and writes through
//! it instead; the exchange consults the store itself and falls back to
//! network retrieval. Deletes always target the local store and require the
//! address to exist. Batch operations are lazy streams, except
//! `get_many_map`, which fans out eagerly under a concurrency bound and
//! reports every key.

mod block;
mod context;
mod error;
mod exchange;
mod service;
mod store;

pub use block::{Block, DAG_CBOR_CODEC, RAW_CODEC, compute_cid};
pub use cid::Cid;
pub use context::OpContext;
pub use error::{BlockError, Result};
pub use exchange::{Exchange, ProviderExchange};
pub use service::{BlockService, DEFAULT_BATCH_CONCURRENCY};
pub use store::{BlockStream, Blockstore, DeleteStream, MemoryBlockstore};
