//! Msgpack encode/decode for the backend/tokenizer/frontend message
//! families, with auto-detection between the typed envelope (carrying
//! `__schema__`) and the legacy untyped `#[serde(tag = "kind")]` path.

use rmpv::Value;
use sched_common::error::SchedError;
use sched_common::Result;

use crate::message::{BackendMsg, FrontendMsg, TokenizerMsg};

fn is_typed(value: &Value) -> bool {
    value.as_map().map(|m| m.iter().any(|(k, _)| k.as_str() == Some("__schema__"))).unwrap_or(false)
}

/// Encodes via the typed envelope. This is the default on-wire form; the
/// legacy form only ever appears when decoding bytes from an older peer.
pub fn encode_backend(msg: &BackendMsg) -> Result<Vec<u8>> {
    rmp_serde::to_vec(&msg.encode_typed()).map_err(|e| SchedError::protocol(format!("backend encode failed: {e}")))
}

pub fn encode_tokenizer(msg: &TokenizerMsg) -> Result<Vec<u8>> {
    rmp_serde::to_vec(&msg.encode_typed()).map_err(|e| SchedError::protocol(format!("tokenizer encode failed: {e}")))
}

pub fn encode_frontend(msg: &FrontendMsg) -> Result<Vec<u8>> {
    rmp_serde::to_vec(&msg.encode_typed()).map_err(|e| SchedError::protocol(format!("frontend encode failed: {e}")))
}

fn decode_value(bytes: &[u8]) -> Result<Value> {
    rmpv::decode::read_value(&mut &bytes[..]).map_err(|e| SchedError::protocol(format!("malformed msgpack: {e}")))
}

pub fn decode_backend(bytes: &[u8]) -> Result<BackendMsg> {
    let value = decode_value(bytes)?;
    if is_typed(&value) {
        BackendMsg::decode_typed(&value)
    } else {
        rmp_serde::from_slice(bytes).map_err(|e| SchedError::protocol(format!("legacy backend decode failed: {e}")))
    }
}

pub fn decode_tokenizer(bytes: &[u8]) -> Result<TokenizerMsg> {
    let value = decode_value(bytes)?;
    if is_typed(&value) {
        TokenizerMsg::decode_typed(&value)
    } else {
        rmp_serde::from_slice(bytes).map_err(|e| SchedError::protocol(format!("legacy tokenizer decode failed: {e}")))
    }
}

pub fn decode_frontend(bytes: &[u8]) -> Result<FrontendMsg> {
    let value = decode_value(bytes)?;
    if is_typed(&value) {
        FrontendMsg::decode_typed(&value)
    } else {
        rmp_serde::from_slice(bytes).map_err(|e| SchedError::protocol(format!("legacy frontend decode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::SamplingParams;

    #[test]
    fn backend_round_trips_through_wire_bytes() {
        let msg = BackendMsg::User {
            uid: 3,
            input_ids: vec![1, 2, 3],
            sampling_params: SamplingParams::default(),
        };
        let bytes = encode_backend(&msg).unwrap();
        assert_eq!(decode_backend(&bytes).unwrap(), msg);
    }

    #[test]
    fn legacy_untyped_backend_bytes_still_decode() {
        let msg = BackendMsg::Exit;
        let bytes = rmp_serde::to_vec(&msg).unwrap();
        assert_eq!(decode_backend(&bytes).unwrap(), msg);
    }

    #[test]
    fn frontend_round_trips_through_wire_bytes() {
        let msg = FrontendMsg::Reply { uid: 1, incremental_output: "hi".into(), finished: true };
        let bytes = encode_frontend(&msg).unwrap();
        assert_eq!(decode_frontend(&bytes).unwrap(), msg);
    }

    #[test]
    fn garbage_bytes_are_a_protocol_error_not_a_panic() {
        let err = decode_backend(&[0xc1]).unwrap_err();
        assert!(matches!(err, SchedError::ProtocolError(_)));
    }
}
