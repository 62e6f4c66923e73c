use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

use crate::error::{BlockError, Result};

/// Raw-bytes codec code (0x55). Default for opaque block payloads.
pub const RAW_CODEC: u64 = 0x55;

/// DAG-CBOR codec code (0x71). Re-exported for structured payloads.
pub const DAG_CBOR_CODEC: u64 = 0x71;

/// Computes a CIDv1 for the given codec and data using Blake3.
pub fn compute_cid(codec: u64, data: &[u8]) -> Cid {
    let hash = Code::Blake3_256.digest(data);
    Cid::new_v1(codec, hash)
}

/// An immutable content value together with its content address.
///
/// The address is derived deterministically from the content and the declared
/// codec, so two blocks with identical content always share an address. Puts
/// are idempotent because of this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Vec<u8>,
}

impl Block {
    /// Creates a block from raw bytes, deriving its address with the raw codec.
    pub fn new(data: Vec<u8>) -> Self {
        Self::with_codec(RAW_CODEC, data)
    }

    /// Creates a block from bytes with an explicit codec tag.
    ///
    /// The tag is carried in the CID itself, as CIDv1 defines.
    pub fn with_codec(codec: u64, data: Vec<u8>) -> Self {
        let cid = compute_cid(codec, &data);
        Block { cid, data }
    }

    /// Re-assembles a block from a transmitted (cid, data) pair.
    ///
    /// Verifies that the data actually hashes to the claimed address and fails
    /// with `InvalidArgument` when it does not.
    pub fn from_parts(cid: Cid, data: Vec<u8>) -> Result<Self> {
        let block = Block { cid, data };
        if !block.verify() {
            return Err(BlockError::InvalidArgument(format!(
                "data does not hash to claimed address {cid}"
            )));
        }
        Ok(block)
    }

    /// Re-assembles a block without re-hashing.
    ///
    /// For trusted paths only, e.g. a store reading back bytes it wrote under
    /// that key.
    pub fn from_parts_unchecked(cid: Cid, data: Vec<u8>) -> Self {
        Block { cid, data }
    }

    /// Recomputes the address from the content and compares it to the stored one.
    pub fn verify(&self) -> bool {
        compute_cid(self.cid.codec(), &self.data) == self.cid
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_address() {
        let a = Block::new(b"hello".to_vec());
        let b = Block::new(b"hello".to_vec());
        assert_eq!(a.cid(), b.cid());
    }

    #[test]
    fn codec_changes_address() {
        let raw = Block::new(b"hello".to_vec());
        let cbor = Block::with_codec(DAG_CBOR_CODEC, b"hello".to_vec());
        assert_ne!(raw.cid(), cbor.cid());
        assert_eq!(cbor.cid().codec(), DAG_CBOR_CODEC);
    }

    #[test]
    fn from_parts_accepts_matching_pair() {
        let original = Block::new(b"payload".to_vec());
        let rebuilt = Block::from_parts(*original.cid(), b"payload".to_vec()).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn from_parts_rejects_mismatch() {
        let original = Block::new(b"payload".to_vec());
        let err = Block::from_parts(*original.cid(), b"tampered".to_vec()).unwrap_err();
        assert!(matches!(err, BlockError::InvalidArgument(_)));
    }

    #[test]
    fn unchecked_block_fails_verify() {
        let original = Block::new(b"payload".to_vec());
        let forged = Block::from_parts_unchecked(*original.cid(), b"tampered".to_vec());
        assert!(!forged.verify());
    }
}
