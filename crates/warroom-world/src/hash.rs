//! SHA-256 digests truncated to the `i32` carried on the wire.

use sha2::{Digest, Sha256};

/// Incremental digest over a canonical byte stream.
///
/// Every hash the protocol compares (type identity, structure, content)
/// is one of these, so all of them share the same truncation rule: the
/// first four bytes of the SHA-256 output, read little-endian.
#[derive(Clone, Default)]
pub struct StateDigest {
    inner: Sha256,
}

impl std::fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateDigest(sha256)")
    }
}

impl StateDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.inner.update([v]);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.inner.update(v.to_le_bytes());
    }

    pub fn finish(self) -> i32 {
        let out = self.inner.finalize();
        i32::from_le_bytes([out[0], out[1], out[2], out[3]])
    }
}
