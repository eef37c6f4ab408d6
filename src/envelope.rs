//! Response shapes of REST collection endpoints
use anyhow::anyhow;
use jsonptr::{Pointer, PointerBuf};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::Error;
use crate::item::{Item, ItemId};

/// How a collection endpoint wraps its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// The body is the payload: an array for the collection, an object for an
    /// item
    #[default]
    Plain,
    /// The payload lives under a `data` field, failures are reported with an
    /// `error` field
    Data,
    /// HATEOAS style, the collection lives under `_embedded.<resource>` and
    /// every item carries a `_links.self.href`
    Hal,
}

impl Envelope {
    /// Extract the list of raw items from a collection response
    pub(crate) fn collection(&self, body: Value, resource: &str) -> Result<Vec<Value>, Error> {
        let payload = match self {
            Envelope::Plain => body,
            Envelope::Data => unwrap_data(body)?,
            Envelope::Hal => {
                let mut body = body;
                let embedded = PointerBuf::from_tokens(["_embedded", resource]);
                match embedded.resolve_mut(&mut body) {
                    Ok(value) => value.take(),
                    // Spring Data REST omits `_embedded` for empty collections
                    Err(_) => Value::Null,
                }
            }
        };

        match payload {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::envelope(anyhow!(
                "expected an array of items, found {}",
                type_name(&other)
            ))),
        }
    }

    /// Extract a single raw item from a create or update response
    ///
    /// Returns `None` if the response carries no item.
    pub(crate) fn single(&self, body: Value) -> Result<Option<Value>, Error> {
        let payload = match self {
            Envelope::Plain | Envelope::Hal => body,
            Envelope::Data => unwrap_data(body)?,
        };

        match payload {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            value @ Value::Object(_) => Ok(Some(value)),
            other => Err(Error::envelope(anyhow!(
                "expected an item object, found {}",
                type_name(&other)
            ))),
        }
    }
}

fn unwrap_data(body: Value) -> Result<Value, Error> {
    match body {
        Value::Object(mut map) => {
            let data = map.remove("data").unwrap_or(Value::Null);
            if !data.is_null() {
                return Ok(data);
            }
            // wrappers serialize both fields, a failure has a null `data`
            match map.remove("error") {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(Value::String(msg)) => Err(Error::envelope(anyhow!("{msg}"))),
                Some(other) => Err(Error::envelope(anyhow!("{other}"))),
            }
        }
        Value::Null => Ok(Value::Null),
        other => Err(Error::envelope(anyhow!(
            "expected a data wrapper, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode a raw item into its identity and fields
pub(crate) fn decode<T: DeserializeOwned>(value: Value, id_field: &str) -> Result<Item<T>, Error> {
    let Value::Object(mut map) = value else {
        return Err(Error::envelope(anyhow!(
            "expected an item object, found {}",
            type_name(&value)
        )));
    };

    let link = match map.remove("_links") {
        Some(links) => self_link(&links)?,
        None => None,
    };

    let id = match map.remove(id_field) {
        Some(Value::Null) | None => None,
        Some(raw) => Some(serde_json::from_value::<ItemId>(raw)?),
    };

    // HATEOAS resources do not expose their key, but the self link ends with it
    let id = id.or_else(|| {
        link.as_ref()
            .and_then(|url| url.path_segments())
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(ItemId::from)
    });

    let fields = serde_json::from_value(Value::Object(map))?;
    Ok(Item::from_server(id, link, fields))
}

fn self_link(links: &Value) -> Result<Option<Url>, Error> {
    let href = Pointer::from_static("/self/href");
    match href.resolve(links) {
        Ok(Value::String(href)) => Url::parse(href)
            .map(Some)
            .map_err(|e| Error::envelope(anyhow!("invalid self link {href}: {e}"))),
        _ => Ok(None),
    }
}

/// Encode the fields of an item as a request body
pub(crate) fn encode<T: Serialize>(
    fields: &T,
    id: Option<&ItemId>,
    id_field: &str,
) -> Result<Value, Error> {
    let mut value = serde_json::to_value(fields)?;
    if let (Some(id), Value::Object(map)) = (id, &mut value) {
        if !map.contains_key(id_field) {
            map.insert(id_field.to_string(), serde_json::to_value(id)?);
        }
    }
    Ok(value)
}
