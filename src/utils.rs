//! Utility functions for identifiers and hashing

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique invocation id then encode using bech32. hosts only, never
// called while an invocation executes.
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// derive a stable identifier from a seed. the same seed always yields the same
// id, so replicas agree on it.
pub fn derive_bech32_id(hrp: &str, seed: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let digest = hex::decode(sha256::digest(seed))?;
    let encode = bech32::encode::<Bech32m>(hrp, &digest[..16])?;
    Ok(encode)
}

/// Encodes a record into CBOR and returns it alongside its sha256 digest.
pub fn digest_cbor<T: minicbor::Encode<()>>(value: &T) -> anyhow::Result<(String, Vec<u8>)> {
    let cbor = minicbor::to_vec(value)?;
    let hash = sha256::digest(&cbor);

    Ok((hash, cbor))
}
