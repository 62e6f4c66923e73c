//! Fjall-backed blockstore for Zeolite.

use std::path::Path;

use async_trait::async_trait;
use cid::Cid;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use zeolite_core::{Block, BlockError, Blockstore, OpContext, Result};

pub const DEFAULT_KEYSPACE: &str = "blocks";

/// A persistent blockstore backed by Fjall.
///
/// Blocks are stored as raw bytes under their binary CID key; fjall failures
/// surface as opaque backend errors.
pub struct FjallBlockstore {
    keyspace: Keyspace,
    _database: Database, // Keep keyspace alive
}

impl FjallBlockstore {
    /// Opens a blockstore at the given path using the default keyspace.
    ///
    /// Creates the database if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_keyspace(path, DEFAULT_KEYSPACE)
    }

    /// Opens a blockstore at the given path with a specific keyspace name.
    ///
    /// Creates the database and keyspace if they don't exist.
    pub fn open_keyspace(path: impl AsRef<Path>, keyspace: &str) -> Result<Self> {
        let database = Database::builder(path).open().map_err(BlockError::backend)?;
        let keyspace = database
            .keyspace(keyspace, || KeyspaceCreateOptions::default())
            .map_err(BlockError::backend)?;
        Ok(Self {
            keyspace,
            _database: database,
        })
    }
}

#[async_trait]
impl Blockstore for FjallBlockstore {
    async fn put(&self, block: Block, ctx: &OpContext) -> Result<Block> {
        ctx.ensure_active()?;
        self.keyspace
            .insert(block.cid().to_bytes(), block.data())
            .map_err(BlockError::backend)?;
        Ok(block)
    }

    async fn get(&self, cid: &Cid, ctx: &OpContext) -> Result<Block> {
        ctx.ensure_active()?;
        match self
            .keyspace
            .get(cid.to_bytes())
            .map_err(BlockError::backend)?
        {
            // Reading back our own write under this key; no re-hash needed.
            Some(bytes) => Ok(Block::from_parts_unchecked(*cid, bytes.to_vec())),
            None => Err(BlockError::NotFound(*cid)),
        }
    }

    async fn has(&self, cid: &Cid, ctx: &OpContext) -> Result<bool> {
        ctx.ensure_active()?;
        self.keyspace
            .contains_key(cid.to_bytes())
            .map_err(BlockError::backend)
    }

    async fn delete(&self, cid: &Cid, ctx: &OpContext) -> Result<()> {
        ctx.ensure_active()?;
        if !self
            .keyspace
            .contains_key(cid.to_bytes())
            .map_err(BlockError::backend)?
        {
            return Err(BlockError::NotFound(*cid));
        }
        self.keyspace
            .remove(cid.to_bytes())
            .map_err(BlockError::backend)
    }
}
