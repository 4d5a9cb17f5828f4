//! Digest algorithms used for blob integrity.
//!
//! The verification protocol compares recorded digests against digests
//! recomputed on the node that physically holds the blob. SHA-512 is the
//! algorithm every node must support.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// Errors from digest parsing.
#[derive(Debug, Clone, Error)]
pub enum DigestError {
    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DigestAlgorithm {
    /// SHA-512, the algorithm recorded on every segment write
    #[default]
    Sha512,
    /// SHA-256, accepted on the checksum RPC for callers that ask for it
    Sha256,
}

impl DigestAlgorithm {
    /// Canonical length in bytes of a digest under this algorithm.
    #[must_use]
    pub const fn digest_len(&self) -> usize {
        match self {
            Self::Sha512 => 64,
            Self::Sha256 => 32,
        }
    }

    /// Compute the digest of `data` under this algorithm.
    #[must_use]
    pub fn compute(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha512 => Sha512::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    /// Wire name of the algorithm.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sha512 => "SHA-512",
            Self::Sha256 => "SHA-256",
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA-512" | "sha-512" | "sha512" => Ok(Self::Sha512),
            "SHA-256" | "sha-256" | "sha256" => Ok(Self::Sha256),
            other => Err(DigestError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming digest calculator for blobs read in chunks.
pub struct DigestCalculator {
    inner: DigestState,
    length: u64,
}

enum DigestState {
    Sha512(Sha512),
    Sha256(Sha256),
}

impl DigestCalculator {
    /// Create a calculator for the given algorithm.
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let inner = match algorithm {
            DigestAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
            DigestAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
        };
        Self { inner, length: 0 }
    }

    /// Update the calculator with more data.
    pub fn update(&mut self, data: &[u8]) {
        self.length += data.len() as u64;
        match &mut self.inner {
            DigestState::Sha512(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
        }
    }

    /// Finalize and return `(digest, total_length)`.
    #[must_use]
    pub fn finalize(self) -> (Vec<u8>, u64) {
        let digest = match self.inner {
            DigestState::Sha512(h) => h.finalize().to_vec(),
            DigestState::Sha256(h) => h.finalize().to_vec(),
        };
        (digest, self.length)
    }
}
