//! Backend message family: scheduler -> accelerator worker.

use rmpv::Value;
use sched_common::error::SchedError;
use sched_common::Result;
use sched_core::SamplingParams;

use super::{decode_sampling_params, encode_sampling_params, map_get, pack_tokens, unpack_tokens};

const FAMILY: &str = "backend";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum BackendMsg {
    #[serde(rename = "batch")]
    Batch { items: Vec<BackendMsg> },
    #[serde(rename = "exit")]
    Exit,
    #[serde(rename = "user")]
    User { uid: u64, input_ids: Vec<i32>, sampling_params: SamplingParams },
}

impl BackendMsg {
    pub fn encode_typed(&self) -> Value {
        match self {
            BackendMsg::Batch { items } => Value::Map(vec![
                (Value::from("__schema__"), Value::from(super::SCHEMA_VERSION)),
                (Value::from("f"), Value::from(FAMILY)),
                (Value::from("k"), Value::from("batch")),
                (Value::from("items"), Value::Array(items.iter().map(BackendMsg::encode_typed).collect())),
            ]),
            BackendMsg::Exit => Value::Map(vec![
                (Value::from("__schema__"), Value::from(super::SCHEMA_VERSION)),
                (Value::from("f"), Value::from(FAMILY)),
                (Value::from("k"), Value::from("exit")),
            ]),
            BackendMsg::User { uid, input_ids, sampling_params } => Value::Map(vec![
                (Value::from("__schema__"), Value::from(super::SCHEMA_VERSION)),
                (Value::from("f"), Value::from(FAMILY)),
                (Value::from("k"), Value::from("user")),
                (Value::from("u"), Value::from(*uid)),
                (Value::from("ib"), Value::Binary(pack_tokens(input_ids))),
                (Value::from("sp"), encode_sampling_params(sampling_params)),
            ]),
        }
    }

    pub fn decode_typed(value: &Value) -> Result<Self> {
        let schema = map_get(value, "__schema__")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SchedError::protocol("backend message missing __schema__"))?;
        if schema as u32 != super::SCHEMA_VERSION {
            return Err(SchedError::protocol(format!("unsupported backend schema version {schema}")));
        }
        if map_get(value, "f").and_then(|v| v.as_str()) != Some(FAMILY) {
            return Err(SchedError::protocol("typed payload family mismatch for backend"));
        }
        let kind = map_get(value, "k")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchedError::protocol("backend message missing kind"))?;
        match kind {
            "batch" => {
                let items = map_get(value, "items")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| SchedError::protocol("backend batch missing items"))?;
                let decoded = items.iter().map(BackendMsg::decode_typed).collect::<Result<Vec<_>>>()?;
                Ok(BackendMsg::Batch { items: decoded })
            }
            "exit" => Ok(BackendMsg::Exit),
            "user" => {
                let uid = map_get(value, "u")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| SchedError::protocol("backend user msg missing uid"))?;
                let ib = map_get(value, "ib")
                    .and_then(|v| v.as_slice())
                    .ok_or_else(|| SchedError::protocol("backend user msg missing input_ids"))?;
                let sp = map_get(value, "sp").ok_or_else(|| SchedError::protocol("backend user msg missing sampling_params"))?;
                Ok(BackendMsg::User {
                    uid,
                    input_ids: unpack_tokens(ib)?,
                    sampling_params: decode_sampling_params(sp)?,
                })
            }
            other => Err(SchedError::protocol(format!("unsupported backend kind {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_msg_round_trips_through_typed_encoding() {
        let msg = BackendMsg::User {
            uid: 42,
            input_ids: vec![10, 11, 12, 13],
            sampling_params: SamplingParams::new(0.7, 40, 0.9, false, 16),
        };
        let decoded = BackendMsg::decode_typed(&msg.encode_typed()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn batch_of_exit_and_user_round_trips() {
        let msg = BackendMsg::Batch {
            items: vec![
                BackendMsg::Exit,
                BackendMsg::User { uid: 1, input_ids: vec![], sampling_params: SamplingParams::default() },
            ],
        };
        let decoded = BackendMsg::decode_typed(&msg.encode_typed()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn unknown_schema_version_is_a_protocol_error() {
        let mut value = BackendMsg::Exit.encode_typed();
        if let Value::Map(ref mut entries) = value {
            for (k, v) in entries.iter_mut() {
                if k.as_str() == Some("__schema__") {
                    *v = Value::from(99u32);
                }
            }
        }
        let err = BackendMsg::decode_typed(&value).unwrap_err();
        assert!(matches!(err, SchedError::ProtocolError(_)));
    }
}
