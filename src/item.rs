use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// Server assigned identifier of a collection item
///
/// Identifiers are opaque to the client. They are accepted both as JSON
/// strings and JSON integers, as most backends use numeric keys, and are
/// written back the way the server sent them. Two identifiers are equal if
/// they read the same, so the `7` in a body matches the `7` at the end of a
/// self link.
#[derive(Debug, Clone)]
pub struct ItemId {
    value: String,
    numeric: bool,
}

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Whether the server sent the identifier as a JSON number
    pub fn is_numeric(&self) -> bool {
        self.numeric
    }
}

impl PartialEq for ItemId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ItemId {}

impl Hash for ItemId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::from(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId {
            value,
            numeric: false,
        }
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        ItemId {
            value: id.to_string(),
            numeric: true,
        }
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.numeric {
            if let Ok(n) = self.value.parse::<u64>() {
                return serializer.serialize_u64(n);
            }
            if let Ok(n) = self.value.parse::<i64>() {
                return serializer.serialize_i64(n);
            }
        }
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => ItemId::from(s),
            Raw::Signed(n) => ItemId {
                value: n.to_string(),
                numeric: true,
            },
            Raw::Unsigned(n) => ItemId::from(n),
        })
    }
}

/// Address of an item for update and delete requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// The item is addressed as `<collection>/<id>`
    Id(ItemId),
    /// The item is addressed by its self link
    Link(Url),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "{id}"),
            Locator::Link(url) => write!(f, "{url}"),
        }
    }
}

/// One record of a remote collection
///
/// The identifier and self link are only ever set from a server response,
/// there is no way to change them after the fact. Replacing the fields of an
/// item keeps its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<T> {
    id: Option<ItemId>,
    link: Option<Url>,
    fields: T,
}

impl<T> Item<T> {
    /// Create an item that does not exist on the server yet
    pub fn new(fields: T) -> Self {
        Item {
            id: None,
            link: None,
            fields,
        }
    }

    pub(crate) fn from_server(id: Option<ItemId>, link: Option<Url>, fields: T) -> Self {
        Item { id, link, fields }
    }

    pub fn id(&self) -> Option<&ItemId> {
        self.id.as_ref()
    }

    pub fn link(&self) -> Option<&Url> {
        self.link.as_ref()
    }

    pub fn fields(&self) -> &T {
        &self.fields
    }

    pub fn into_fields(self) -> T {
        self.fields
    }

    /// Returns true if the server assigned an identity to the item
    pub fn is_persisted(&self) -> bool {
        self.id.is_some() || self.link.is_some()
    }

    /// Where to send update and delete requests for this item.
    ///
    /// The self link is preferred over the identifier.
    pub fn locator(&self) -> Option<Locator> {
        if let Some(link) = &self.link {
            return Some(Locator::Link(link.clone()));
        }
        self.id.clone().map(Locator::Id)
    }

    /// Return a copy of the item with new fields and the same identity
    pub fn with_fields(&self, fields: T) -> Self {
        Item {
            id: self.id.clone(),
            link: self.link.clone(),
            fields,
        }
    }

    /// Take the fields of a server echo into this item.
    ///
    /// The identity only fills in what is missing, an assigned identifier is
    /// never replaced.
    pub(crate) fn absorb(&mut self, echo: Item<T>) {
        let Item { id, link, fields } = echo;
        if let (Some(cur), Some(new)) = (&self.id, &id) {
            if cur != new {
                tracing::warn!(current = %cur, echoed = %new, "server echoed a different id, keeping the current one");
            }
        }
        if self.id.is_none() {
            self.id = id;
        }
        if self.link.is_none() {
            self.link = link;
        }
        self.fields = fields;
    }

    /// Swap the fields, returning the old ones
    pub(crate) fn replace_fields(&mut self, fields: T) -> T {
        std::mem::replace(&mut self.fields, fields)
    }
}
