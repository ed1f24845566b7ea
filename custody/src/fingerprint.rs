//! Content fingerprints and ledger commitments.
//!
//! Two digest domains are involved in custody:
//!
//! - the **fingerprint**: SHA-256 over the complete evidence bytes, and
//! - the **commitment**: Keccak-256 over the UTF-8 text of the fingerprint's
//!   lowercase hex encoding, which is the `bytes32` value anchored on the
//!   ledger.
//!
//! The commitment deliberately hashes the hex *text* rather than the raw 32
//! fingerprint bytes. Records already anchored on deployed ledgers were
//! derived this way, so any other derivation would make every historical
//! record look tampered.
//!
//! Everything here is pure and deterministic. An empty buffer is a valid
//! input with a well-known digest.

use std::io::{self, Read};

use sha2::{Digest as _, Sha256};
use sha3::Keccak256;

use crate::types::{Commitment, DIGEST_LEN, Digest256, Fingerprint};

/// Read buffer size for [`fingerprint_reader`].
const READ_CHUNK: usize = 64 * 1024;

/// Computes the SHA-256 fingerprint of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let digest: [u8; DIGEST_LEN] = Sha256::digest(bytes).into();
    Fingerprint(Digest256(digest))
}

/// Streams `reader` to EOF and returns its fingerprint and total length.
///
/// The whole input is consumed; an I/O error part-way through is returned
/// as an error rather than yielding a digest of a truncated read.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<(Fingerprint, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    let digest: [u8; DIGEST_LEN] = hasher.finalize().into();
    Ok((Fingerprint(Digest256(digest)), total))
}

/// Derives the ledger commitment from a fingerprint's hex text.
///
/// The text is hashed exactly as given, so callers must pass the canonical
/// lowercase encoding (see [`commitment_for`]) to reproduce anchored values.
pub fn commitment_of(fingerprint_hex: &str) -> Commitment {
    Commitment(Digest256(keccak256(fingerprint_hex.as_bytes())))
}

/// Derives the ledger commitment for `fp` from its canonical hex encoding.
pub fn commitment_for(fp: &Fingerprint) -> Commitment {
    commitment_of(&fp.to_hex())
}

/// Keccak-256 (the pre-standard SHA-3 padding used by EVM ledgers).
pub fn keccak256(data: &[u8]) -> [u8; DIGEST_LEN] {
    Keccak256::digest(data).into()
}
