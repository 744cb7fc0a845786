//! Tokenizer message family: frontend -> tokenizer worker -> backend.

use rmpv::Value;
use sched_common::error::SchedError;
use sched_common::Result;
use sched_core::SamplingParams;

use super::{decode_sampling_params, encode_sampling_params, map_get};

const FAMILY: &str = "tokenizer";

/// `text` may be a raw prompt string or a list of chat-style `{role,
/// content}` records; both encode the same way under msgpack.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TokenizeText {
    Prompt(String),
    Chat(Vec<ChatMessage>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum TokenizerMsg {
    #[serde(rename = "batch")]
    Batch { items: Vec<TokenizerMsg> },
    #[serde(rename = "tok")]
    Tokenize { uid: u64, text: TokenizeText, sampling_params: SamplingParams },
    #[serde(rename = "detok")]
    Detokenize { uid: u64, next_token: i32, finished: bool },
    #[serde(rename = "abort")]
    Abort { uid: u64 },
}

fn encode_text(text: &TokenizeText) -> Value {
    match text {
        TokenizeText::Prompt(s) => Value::from(s.as_str()),
        TokenizeText::Chat(messages) => Value::Array(
            messages
                .iter()
                .map(|m| {
                    Value::Map(vec![
                        (Value::from("role"), Value::from(m.role.as_str())),
                        (Value::from("content"), Value::from(m.content.as_str())),
                    ])
                })
                .collect(),
        ),
    }
}

fn decode_text(value: &Value) -> Result<TokenizeText> {
    if let Some(s) = value.as_str() {
        return Ok(TokenizeText::Prompt(s.to_string()));
    }
    if let Some(items) = value.as_array() {
        let messages = items
            .iter()
            .map(|item| {
                let role = map_get(item, "role")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| SchedError::protocol("chat message missing role"))?;
                let content = map_get(item, "content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| SchedError::protocol("chat message missing content"))?;
                Ok(ChatMessage { role: role.to_string(), content: content.to_string() })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(TokenizeText::Chat(messages));
    }
    Err(SchedError::protocol("tokenizer tok payload has invalid text type"))
}

impl TokenizerMsg {
    pub fn encode_typed(&self) -> Value {
        let mut entries = vec![
            (Value::from("__schema__"), Value::from(super::SCHEMA_VERSION)),
            (Value::from("f"), Value::from(FAMILY)),
        ];
        match self {
            TokenizerMsg::Batch { items } => {
                entries.push((Value::from("k"), Value::from("batch")));
                entries.push((
                    Value::from("items"),
                    Value::Array(items.iter().map(TokenizerMsg::encode_typed).collect()),
                ));
            }
            TokenizerMsg::Tokenize { uid, text, sampling_params } => {
                entries.push((Value::from("k"), Value::from("tok")));
                entries.push((Value::from("u"), Value::from(*uid)));
                entries.push((Value::from("t"), encode_text(text)));
                entries.push((Value::from("sp"), encode_sampling_params(sampling_params)));
            }
            TokenizerMsg::Detokenize { uid, next_token, finished } => {
                entries.push((Value::from("k"), Value::from("detok")));
                entries.push((Value::from("u"), Value::from(*uid)));
                entries.push((Value::from("n"), Value::from(*next_token)));
                entries.push((Value::from("fin"), Value::from(*finished)));
            }
            TokenizerMsg::Abort { uid } => {
                entries.push((Value::from("k"), Value::from("abort")));
                entries.push((Value::from("u"), Value::from(*uid)));
            }
        }
        Value::Map(entries)
    }

    pub fn decode_typed(value: &Value) -> Result<Self> {
        let schema = map_get(value, "__schema__")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SchedError::protocol("tokenizer message missing __schema__"))?;
        if schema as u32 != super::SCHEMA_VERSION {
            return Err(SchedError::protocol(format!("unsupported tokenizer schema version {schema}")));
        }
        if map_get(value, "f").and_then(|v| v.as_str()) != Some(FAMILY) {
            return Err(SchedError::protocol("typed payload family mismatch for tokenizer"));
        }
        let kind = map_get(value, "k")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchedError::protocol("tokenizer message missing kind"))?;
        let uid_of = |v: &Value| {
            map_get(v, "u").and_then(|v| v.as_u64()).ok_or_else(|| SchedError::protocol("tokenizer msg missing uid"))
        };
        match kind {
            "batch" => {
                let items = map_get(value, "items")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| SchedError::protocol("tokenizer batch missing items"))?;
                let decoded = items.iter().map(TokenizerMsg::decode_typed).collect::<Result<Vec<_>>>()?;
                Ok(TokenizerMsg::Batch { items: decoded })
            }
            "tok" => {
                let uid = uid_of(value)?;
                let text = map_get(value, "t")
                    .ok_or_else(|| SchedError::protocol("tokenizer tok msg missing text"))
                    .and_then(decode_text)?;
                let sp = map_get(value, "sp").ok_or_else(|| SchedError::protocol("tokenizer tok msg missing sampling_params"))?;
                Ok(TokenizerMsg::Tokenize { uid, text, sampling_params: decode_sampling_params(sp)? })
            }
            "detok" => Ok(TokenizerMsg::Detokenize {
                uid: uid_of(value)?,
                next_token: map_get(value, "n")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| SchedError::protocol("tokenizer detok msg missing next_token"))?
                    as i32,
                finished: map_get(value, "fin")
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| SchedError::protocol("tokenizer detok msg missing finished"))?,
            }),
            "abort" => Ok(TokenizerMsg::Abort { uid: uid_of(value)? }),
            other => Err(SchedError::protocol(format!("unsupported tokenizer kind {other:?}"))),
        }
    }
}
