//! Identifier and codec helpers

use crate::error::LeaveError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique, time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, LeaveError> {
    let hrp = bech32::Hrp::parse(hrp)
        .map_err(|e| LeaveError::Validation(format!("invalid id prefix {hrp:?}: {e}")))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| LeaveError::Codec(e.to_string()))?;
    Ok(encode)
}

pub(crate) fn to_cbor<T>(value: &T) -> Result<Vec<u8>, LeaveError>
where
    T: minicbor::Encode<()>,
{
    minicbor::to_vec(value).map_err(|e| LeaveError::Codec(e.to_string()))
}

pub(crate) fn from_cbor<'b, T>(bytes: &'b [u8]) -> Result<T, LeaveError>
where
    T: minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| LeaveError::Codec(e.to_string()))
}
