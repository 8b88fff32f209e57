use sha3::{Digest, Keccak256};

/// Keccak256 of raw bytes
pub fn keccak256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Keccak256 as 0x-prefixed hex
pub fn keccak256_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(data)))
}

/// Short fingerprint of a signature for logs, never the signature itself.
pub fn signature_fingerprint(signature: &str) -> String {
    let digest = keccak256_hex(signature.trim().to_ascii_lowercase().as_bytes());
    digest[..12].to_string()
}
