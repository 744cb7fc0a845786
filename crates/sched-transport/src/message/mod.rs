//! Typed transport schema (C5): three tagged-union message families
//! (backend, tokenizer, frontend), each self-describing via a `__schema__`
//! version tag and an `f` family tag, plus a legacy untyped path decoders
//! must also accept.

mod backend;
mod frontend;
mod tokenizer;

pub use backend::BackendMsg;
pub use frontend::FrontendMsg;
pub use tokenizer::{ChatMessage, TokenizeText, TokenizerMsg};

use rmpv::Value;
use sched_common::error::SchedError;
use sched_common::Result;
use sched_core::SamplingParams;

pub const SCHEMA_VERSION: u32 = 1;

pub(crate) fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_map()?.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
}

/// `SamplingParams` always travels as the 5-tuple
/// `(temperature, top_k, top_p, ignore_eos, max_tokens)`.
pub(crate) fn encode_sampling_params(params: &SamplingParams) -> Value {
    Value::Array(vec![
        Value::from(params.temperature),
        Value::from(params.top_k),
        Value::from(params.top_p),
        Value::from(params.ignore_eos),
        Value::from(params.max_tokens),
    ])
}

pub(crate) fn decode_sampling_params(value: &Value) -> Result<SamplingParams> {
    let items = value.as_array().ok_or_else(|| SchedError::protocol("invalid sampling params payload"))?;
    if items.len() != 5 {
        return Err(SchedError::protocol("invalid sampling params payload"));
    }
    let temperature = items[0].as_f64().ok_or_else(|| SchedError::protocol("sampling params: bad temperature"))? as f32;
    let top_k = items[1].as_i64().ok_or_else(|| SchedError::protocol("sampling params: bad top_k"))? as i32;
    let top_p = items[2].as_f64().ok_or_else(|| SchedError::protocol("sampling params: bad top_p"))? as f32;
    let ignore_eos = items[3].as_bool().ok_or_else(|| SchedError::protocol("sampling params: bad ignore_eos"))?;
    let max_tokens = items[4].as_i64().ok_or_else(|| SchedError::protocol("sampling params: bad max_tokens"))? as i32;
    Ok(SamplingParams::new(temperature, top_k, top_p, ignore_eos, max_tokens))
}

/// Packs token ids as a little-endian `i32` buffer, keeping frame size
/// linear in token count with no per-token container overhead.
pub(crate) fn pack_tokens(ids: &[i32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    bytes
}

pub(crate) fn unpack_tokens(bytes: &[u8]) -> Result<Vec<i32>> {
    if bytes.len() % 4 != 0 {
        return Err(SchedError::protocol("token buffer length is not a multiple of 4"));
    }
    Ok(bytes.chunks_exact(4).map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_buffer_round_trips_length_and_values() {
        let ids = vec![-3, 0, 1, 2147483647, -2147483648];
        let packed = pack_tokens(&ids);
        assert_eq!(packed.len(), ids.len() * 4);
        assert_eq!(unpack_tokens(&packed).unwrap(), ids);
    }

    #[test]
    fn sampling_params_round_trip_through_five_tuple() {
        let params = SamplingParams::new(0.5, 20, 0.8, true, 64);
        let decoded = decode_sampling_params(&encode_sampling_params(&params)).unwrap();
        assert_eq!(params, decoded);
    }
}
