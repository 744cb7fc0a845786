//! Frontend message family: backend/tokenizer -> user-facing frontend worker.

use rmpv::Value;
use sched_common::error::SchedError;
use sched_common::Result;

use super::map_get;

const FAMILY: &str = "frontend";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum FrontendMsg {
    #[serde(rename = "batch")]
    Batch { items: Vec<FrontendMsg> },
    #[serde(rename = "reply")]
    Reply { uid: u64, incremental_output: String, finished: bool },
}

impl FrontendMsg {
    pub fn encode_typed(&self) -> Value {
        match self {
            FrontendMsg::Batch { items } => Value::Map(vec![
                (Value::from("__schema__"), Value::from(super::SCHEMA_VERSION)),
                (Value::from("f"), Value::from(FAMILY)),
                (Value::from("k"), Value::from("batch")),
                (Value::from("items"), Value::Array(items.iter().map(FrontendMsg::encode_typed).collect())),
            ]),
            FrontendMsg::Reply { uid, incremental_output, finished } => Value::Map(vec![
                (Value::from("__schema__"), Value::from(super::SCHEMA_VERSION)),
                (Value::from("f"), Value::from(FAMILY)),
                (Value::from("k"), Value::from("reply")),
                (Value::from("u"), Value::from(*uid)),
                (Value::from("o"), Value::from(incremental_output.as_str())),
                (Value::from("fin"), Value::from(*finished)),
            ]),
        }
    }

    pub fn decode_typed(value: &Value) -> Result<Self> {
        let schema = map_get(value, "__schema__")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SchedError::protocol("frontend message missing __schema__"))?;
        if schema as u32 != super::SCHEMA_VERSION {
            return Err(SchedError::protocol(format!("unsupported frontend schema version {schema}")));
        }
        if map_get(value, "f").and_then(|v| v.as_str()) != Some(FAMILY) {
            return Err(SchedError::protocol("typed payload family mismatch for frontend"));
        }
        let kind = map_get(value, "k")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchedError::protocol("frontend message missing kind"))?;
        match kind {
            "batch" => {
                let items = map_get(value, "items")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| SchedError::protocol("frontend batch missing items"))?;
                let decoded = items.iter().map(FrontendMsg::decode_typed).collect::<Result<Vec<_>>>()?;
                Ok(FrontendMsg::Batch { items: decoded })
            }
            "reply" => Ok(FrontendMsg::Reply {
                uid: map_get(value, "u")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| SchedError::protocol("frontend reply missing uid"))?,
                incremental_output: map_get(value, "o")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| SchedError::protocol("frontend reply missing incremental_output"))?
                    .to_string(),
                finished: map_get(value, "fin")
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| SchedError::protocol("frontend reply missing finished"))?,
            }),
            other => Err(SchedError::protocol(format!("unsupported frontend kind {other:?}"))),
        }
    }
}
