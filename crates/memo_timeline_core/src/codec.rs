//! Memo log field codec.
//!
//! # Responsibility
//! - Decode a record's raw memo field into a typed `RecordMemoLog`.
//! - Encode a log back into the stored JSON array text.
//!
//! # Invariants
//! - Blank field text is an empty log, never an error.
//! - `decode` never panics; only a non-JSON or non-array document yields
//!   `ParseError`. A bad element never hides its sibling memos.
//! - `encode` is deterministic and `decode(encode(x)) == x`.
//! - Keys this crate does not interpret are carried through untouched.
//!
//! # Stored format
//! A JSON array of objects with `ts` (integer epoch seconds) and `text`, plus
//! optional `id`, `author`, `tags`. Arrays are written with two-space
//! indentation; an empty log is written as the empty string.

use crate::model::memo::{MemoId, MemoRecord, RecordMemoLog};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

const KEY_ID: &str = "id";
const KEY_TS: &str = "ts";
const KEY_TEXT: &str = "text";
const KEY_AUTHOR: &str = "author";
const KEY_TAGS: &str = "tags";

/// Malformed memo field content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Field text exactly as read from the store.
    pub raw: String,
    /// Human-readable reason, free of memo content.
    pub reason: String,
}

impl ParseError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed memo log ({} bytes): {}",
            self.raw.len(),
            self.reason
        )
    }
}

impl Error for ParseError {}

/// Serializer failure while encoding a memo log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeError(pub String);

impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to encode memo log: {}", self.0)
    }
}

impl Error for EncodeError {}

/// Decodes raw field text into a memo log.
///
/// Elements without an integer `ts` or a non-blank string `text` are kept as
/// unreadable elements of the log. Memos whose `id` is missing, not a
/// non-blank string, or already used earlier in the array receive
/// `MemoId::legacy(ts, n)` with the first ordinal not taken in the log; a
/// stored `id` value that was not adopted stays in `extra`.
///
/// # Errors
/// - Non-JSON text or a document that is not an array.
pub fn decode(raw: &str) -> Result<RecordMemoLog, ParseError> {
    if raw.trim().is_empty() {
        return Ok(RecordMemoLog::new());
    }

    let document: Value = serde_json::from_str(raw)
        .map_err(|err| ParseError::new(raw, format!("invalid JSON: {err}")))?;
    let Value::Array(items) = document else {
        return Err(ParseError::new(raw, "expected a JSON array"));
    };

    let mut taken: HashSet<MemoId> = HashSet::new();
    let mut pending = Vec::with_capacity(items.len());
    let mut unreadable = Vec::new();

    for item in items {
        match item {
            Value::Object(object) if has_memo_core(&object) => {
                pending.push(decode_memo(object, &mut taken));
            }
            other => unreadable.push(other),
        }
    }

    // Explicit ids are all claimed before any legacy id is handed out.
    let memos = pending
        .into_iter()
        .map(|(id, mut memo)| {
            memo.id = id.unwrap_or_else(|| next_legacy_id(memo.timestamp, &mut taken));
            memo
        })
        .collect();

    Ok(RecordMemoLog::from_memos(memos).with_unreadable(unreadable))
}

fn has_memo_core(object: &Map<String, Value>) -> bool {
    let has_ts = object.get(KEY_TS).is_some_and(Value::is_i64);
    let has_text = object
        .get(KEY_TEXT)
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty());
    has_ts && has_text
}

/// Splits a memo object into its typed fields; the id is `None` when the
/// stored one was not adopted.
fn decode_memo(
    mut object: Map<String, Value>,
    taken: &mut HashSet<MemoId>,
) -> (Option<MemoId>, MemoRecord) {
    let timestamp = object
        .remove(KEY_TS)
        .and_then(|value| value.as_i64())
        .unwrap_or_default();
    let text = match object.remove(KEY_TEXT) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };

    let id = match object.remove(KEY_ID) {
        Some(Value::String(id))
            if !id.trim().is_empty() && taken.insert(MemoId::from(id.as_str())) =>
        {
            Some(MemoId::from(id))
        }
        Some(other) => {
            object.insert(KEY_ID.to_string(), other);
            None
        }
        None => None,
    };

    // Only well-typed optional keys are interpreted; anything else stays opaque.
    let author = match object.remove(KEY_AUTHOR) {
        Some(Value::String(author)) => Some(author),
        Some(other) => {
            object.insert(KEY_AUTHOR.to_string(), other);
            None
        }
        None => None,
    };
    let tags = match object.remove(KEY_TAGS) {
        Some(value) => match string_array(&value) {
            Some(tags) => Some(tags),
            None => {
                object.insert(KEY_TAGS.to_string(), value);
                None
            }
        },
        None => None,
    };

    let extra: BTreeMap<String, Value> = object.into_iter().collect();
    let memo = MemoRecord {
        // Replaced by `decode` once every explicit id is known.
        id: MemoId::legacy(timestamp, 0),
        timestamp,
        text,
        author,
        tags,
        extra,
    };
    (id, memo)
}

fn next_legacy_id(timestamp: i64, taken: &mut HashSet<MemoId>) -> MemoId {
    let mut ordinal = 0;
    loop {
        let candidate = MemoId::legacy(timestamp, ordinal);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        ordinal += 1;
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Encodes a memo log into stored field text.
///
/// # Errors
/// - Only when the JSON serializer itself fails.
pub fn encode(log: &RecordMemoLog) -> Result<String, EncodeError> {
    if log.is_empty() && log.unreadable().is_empty() {
        return Ok(String::new());
    }

    let items: Vec<Value> = log
        .memos()
        .iter()
        .map(memo_to_value)
        .chain(log.unreadable().iter().cloned())
        .collect();
    serde_json::to_string_pretty(&Value::Array(items)).map_err(|err| EncodeError(err.to_string()))
}

fn memo_to_value(memo: &MemoRecord) -> Value {
    let mut object = Map::new();
    for (key, value) in &memo.extra {
        object.insert(key.clone(), value.clone());
    }
    // A stored `id` kept in `extra` wins over the synthetic one.
    object
        .entry(KEY_ID)
        .or_insert_with(|| Value::String(memo.id.to_string()));
    object.insert(KEY_TS.to_string(), Value::from(memo.timestamp));
    object.insert(KEY_TEXT.to_string(), Value::String(memo.text.clone()));
    if let Some(author) = memo.author.as_ref() {
        object.insert(KEY_AUTHOR.to_string(), Value::String(author.clone()));
    }
    if let Some(tags) = memo.tags.as_ref() {
        let tags = tags.iter().cloned().map(Value::String).collect();
        object.insert(KEY_TAGS.to_string(), Value::Array(tags));
    }
    Value::Object(object)
}
