//! SCALE shapes exchanged with runtime calls, on top of `parity-scale-codec`.

use crate::error::{LinkError, Result};

pub use parity_scale_codec::{Compact, Decode, Encode};

/// Transaction source byte for `TaggedTransactionQueue_validate_transaction`.
pub const TRANSACTION_SOURCE_EXTERNAL: u8 = 0x02;

/// Decode a `T` from the front of `bytes`.
pub fn decode<T: Decode>(bytes: &[u8], what: &str) -> Result<T> {
    T::decode(&mut &bytes[..]).map_err(|e| LinkError::Decode(format!("{}: {}", what, e)))
}

/// Length-prefixed byte vector.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    data.encode()
}

pub fn decode_vec_u32(bytes: &[u8]) -> Result<Vec<u32>> {
    decode(bytes, "Vec<u32>")
}

/// `Option<Vec<u8>>`, as returned by `Metadata_metadata_at_version`.
pub fn decode_option_bytes(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    decode(bytes, "Option<Vec<u8>>")
}

/// Account nonces are `u32` on most chains and `u64` on some.
pub fn decode_nonce(bytes: &[u8]) -> Result<u64> {
    match bytes.len() {
        4 => decode::<u32>(bytes, "nonce").map(u64::from),
        8 => decode::<u64>(bytes, "nonce"),
        n => Err(LinkError::Decode(format!("unexpected nonce width {}", n))),
    }
}

pub fn decode_u128(bytes: &[u8]) -> Result<u128> {
    decode(bytes, "u128")
}

/// `TransactionValidity` result: leading `0x00` is `Ok`.
pub fn is_valid_transaction(result: &[u8]) -> Result<bool> {
    match decode::<u8>(result, "TransactionValidity")? {
        0x00 => Ok(true),
        0x01 => Ok(false),
        other => Err(LinkError::Decode(format!("invalid Result tag {:#04x}", other))),
    }
}

/// Arguments for `TaggedTransactionQueue_validate_transaction`. The extrinsic
/// is already encoded, so it is appended as is.
pub fn validate_transaction_args(extrinsic: &[u8], block_hash: &[u8]) -> Vec<u8> {
    let mut args = TRANSACTION_SOURCE_EXTERNAL.encode();
    args.extend_from_slice(extrinsic);
    args.extend_from_slice(block_hash);
    args
}
