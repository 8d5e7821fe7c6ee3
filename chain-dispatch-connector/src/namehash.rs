//! EIP-137 name hashing.
//!
//! Resolver methods are keyed by the `namehash` of a human-readable name
//! rather than the name itself. The hash is built recursively from the
//! rightmost label: `node = keccak256(parent_node ++ keccak256(label))`, with
//! the empty name mapping to 32 zero bytes.

use sha3::{Digest, Keccak256};
use std::fmt;

/// The 32-byte node identifying a name in the registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Node([u8; 32]);

impl Node {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The `0x`-prefixed lowercase hex form expected by the remote method.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.to_hex())
    }
}

/// Computes the namehash of `name`.
///
/// Labels are lower-cased before hashing. Empty labels (as in a trailing dot)
/// are skipped.
///
/// No UTS-46 mapping is applied: full-width or compatibility characters are
/// hashed as given, so callers must pass names that are already normalised.
pub fn namehash(name: &str) -> Node {
    let mut node = [0u8; 32];
    let normalized = name.to_lowercase();

    for label in normalized.rsplit('.').filter(|l| !l.is_empty()) {
        let label_hash = Keccak256::digest(label.as_bytes());
        let mut hasher = Keccak256::new();
        hasher.update(node);
        hasher.update(label_hash);
        node.copy_from_slice(&hasher.finalize());
    }

    Node(node)
}
