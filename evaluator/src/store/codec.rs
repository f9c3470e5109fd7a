//! Type preserving conversion between [`Serializable`] objects and JSON trees.
//!
//! Nested objects are stored under `name@<type tag>` keys. List items can not carry a tag in
//! their key, so objects and maps inside lists are wrapped in `{"type": <tag>, "value": ...}`
//! envelopes, `"dict"` marking a plain map.

use super::{
    datum::{Datum, Serializable},
    registry, SerializationError,
};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;

const TAG_SEPARATOR: char = '@';
const ENVELOPE_TYPE: &str = "type";
const ENVELOPE_VALUE: &str = "value";
const PLAIN_MAP: &str = "dict";

/// Serialize the attributes of `object` into a JSON object
pub fn serialize(object: &dyn Serializable) -> Result<JsonValue, SerializationError> {
    serialize_at(object, "")
}

fn serialize_at(object: &dyn Serializable, path: &str) -> Result<JsonValue, SerializationError> {
    encode_map(&object.attributes(), path).map(JsonValue::Object)
}

fn encode_map(
    map: &BTreeMap<String, Datum>,
    path: &str,
) -> Result<Map<String, JsonValue>, SerializationError> {
    let mut encoded = Map::new();

    for (name, value) in map {
        let item_path = if path.is_empty() {
            name.clone()
        } else {
            format!("{path}.{name}")
        };

        match value {
            Datum::Object(object) => {
                encoded.insert(
                    format!("{name}{TAG_SEPARATOR}{}", object.type_tag()),
                    serialize_at(&**object, &item_path)?,
                );
            }
            other => {
                encoded.insert(name.clone(), encode(other, &item_path)?);
            }
        }
    }

    Ok(encoded)
}

fn encode(value: &Datum, path: &str) -> Result<JsonValue, SerializationError> {
    Ok(match value {
        Datum::Null => JsonValue::Null,
        Datum::Bool(value) => JsonValue::Bool(*value),
        Datum::Integer(value) => JsonValue::from(*value),
        Datum::Float(value) => Number::from_f64(*value)
            .map(JsonValue::Number)
            .ok_or_else(|| SerializationError::Unserializable {
                path: path.to_string(),
                reason: format!("{value} is not a finite number"),
            })?,
        Datum::String(value) => JsonValue::String(value.clone()),
        Datum::List(items) => JsonValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| encode_list_item(item, &format!("{path}[{index}]")))
                .collect::<Result<_, _>>()?,
        ),
        Datum::Map(map) => JsonValue::Object(encode_map(map, path)?),
        Datum::Object(object) => serialize_at(&**object, path)?,
    })
}

fn encode_list_item(value: &Datum, path: &str) -> Result<JsonValue, SerializationError> {
    let tag = match value {
        Datum::Object(object) => object.type_tag(),
        Datum::Map(_) => PLAIN_MAP,
        other => return encode(other, path),
    };

    let mut envelope = Map::new();
    envelope.insert(ENVELOPE_TYPE.to_string(), JsonValue::from(tag));
    envelope.insert(ENVELOPE_VALUE.to_string(), encode(value, path)?);

    Ok(JsonValue::Object(envelope))
}

/// Restore the attributes of `object` from a JSON object.
///
/// The current attributes of `object` define the expected shape: incoming keys without a
/// matching attribute are skipped, and an incoming value whose type differs from a non-null
/// current value is an error.
pub fn deserialize(object: &mut dyn Serializable, tree: &JsonValue) -> Result<(), SerializationError> {
    let JsonValue::Object(entries) = tree else {
        return Err(SerializationError::UnexpectedValue {
            expected: "object",
            given: json_type(tree).to_string(),
        });
    };

    let current = object.attributes();

    for (key, value) in entries {
        let (name, value) = decode_entry(key, value)?;

        let Some(existing) = current.get(name) else {
            // a tagged attribute whose type was never registered
            if let Some((base, tag)) = key.rsplit_once(TAG_SEPARATOR) {
                if current.contains_key(base) {
                    return Err(SerializationError::UnknownType(tag.to_string()));
                }
            }
            continue;
        };
        if !existing.is_null() && existing.type_name() != value.type_name() {
            return Err(SerializationError::TypeMismatch {
                name: name.to_string(),
                expected: existing.type_name().to_string(),
                given: value.type_name().to_string(),
            });
        }

        object.set_attribute(name, value)?;
    }

    object.deserialized();

    Ok(())
}

/// Decode one map entry. The key may end with the type tag of its value, a suffix that is not a
/// registered tag is part of the plain key (names may contain the separator themselves).
fn decode_entry<'k>(key: &'k str, value: &JsonValue) -> Result<(&'k str, Datum), SerializationError> {
    match key.rsplit_once(TAG_SEPARATOR) {
        Some((name, tag)) if registry::is_registered(tag) => {
            Ok((name, Datum::Object(construct(tag, value)?)))
        }
        _ => Ok((key, decode(value)?)),
    }
}

fn decode(value: &JsonValue) -> Result<Datum, SerializationError> {
    Ok(match value {
        JsonValue::Null => Datum::Null,
        JsonValue::Bool(value) => Datum::Bool(*value),
        JsonValue::Number(number) => match number.as_i64() {
            Some(integer) => Datum::Integer(integer),
            None => Datum::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(value) => Datum::String(value.clone()),
        JsonValue::Array(items) => {
            Datum::List(items.iter().map(decode_list_item).collect::<Result<_, _>>()?)
        }
        JsonValue::Object(entries) => Datum::Map(
            entries
                .iter()
                .map(|(key, value)| {
                    decode_entry(key, value).map(|(name, value)| (name.to_string(), value))
                })
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn decode_list_item(value: &JsonValue) -> Result<Datum, SerializationError> {
    if let JsonValue::Object(envelope) = value {
        if envelope.len() == 2 {
            if let (Some(JsonValue::String(tag)), Some(inner)) =
                (envelope.get(ENVELOPE_TYPE), envelope.get(ENVELOPE_VALUE))
            {
                return if tag == PLAIN_MAP {
                    decode(inner)
                } else {
                    construct(tag, inner).map(Datum::Object)
                };
            }
        }
    }

    decode(value)
}

fn construct(tag: &str, value: &JsonValue) -> Result<Box<dyn Serializable>, SerializationError> {
    let mut instance = registry::create(tag)?;
    deserialize(&mut *instance, value)?;

    Ok(instance)
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
