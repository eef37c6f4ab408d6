//! Local mirror of a remote collection
use std::fmt;

use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::item::{Item, ItemId};

/// Local handle of an entry in the list
///
/// Keys are assigned when an entry is added to the list and never change,
/// so they can address items the server has not assigned an identifier to
/// yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Key(u64);

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A mutation waiting for the server to confirm it
#[derive(Debug, Clone, PartialEq)]
pub enum Pending<T> {
    /// The entry was created locally and does not exist on the server yet
    Create,
    /// The entry shows new fields, `previous` is what the server last confirmed
    Update { previous: T },
    /// The entry is about to be removed. `previous` holds the last confirmed
    /// fields when the entry was also waiting for an update
    Delete { previous: Option<T> },
}

/// Whether the entry reflects confirmed server state
#[derive(Debug, Clone, PartialEq)]
pub enum Phase<T> {
    Committed,
    Pending(Pending<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    key: Key,
    item: Item<T>,
    phase: Phase<T>,
}

impl<T> Entry<T> {
    pub fn key(&self) -> Key {
        self.key
    }

    pub fn item(&self) -> &Item<T> {
        &self.item
    }

    pub fn phase(&self) -> &Phase<T> {
        &self.phase
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending(_))
    }
}

impl<T: Serialize> Serialize for Entry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = serde_json::to_value(self.item.fields()).map_err(serde::ser::Error::custom)?;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("key", &self.key)?;
        if let Some(id) = self.item.id() {
            map.serialize_entry("id", id)?;
        }
        if let Some(link) = self.item.link() {
            map.serialize_entry("link", link.as_str())?;
        }
        let pending = match &self.phase {
            Phase::Committed => None,
            Phase::Pending(Pending::Create) => Some("create"),
            Phase::Pending(Pending::Update { .. }) => Some("update"),
            Phase::Pending(Pending::Delete { .. }) => Some("delete"),
        };
        if let Some(op) = pending {
            map.serialize_entry("pending", op)?;
        }
        match fields {
            Value::Object(fields) => {
                for (k, v) in fields.iter() {
                    map.serialize_entry(k, v)?;
                }
            }
            other => map.serialize_entry("fields", &other)?,
        }
        map.end()
    }
}

/// The ordered list of entries mirroring the last known server state
///
/// Every mutation goes through two phases. A `begin_*` call marks the entry
/// as pending, and later either a `commit_*` call makes it part of the
/// confirmed state or [`ListState::rollback`] undoes the change. The
/// confirmed view ([`ListState::committed`]) never includes unconfirmed
/// changes.
#[derive(Debug, Clone)]
pub struct ListState<T> {
    entries: Vec<Entry<T>>,
    next_key: u64,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        ListState {
            entries: Vec::new(),
            next_key: 0,
        }
    }
}

impl<T: Serialize> Serialize for ListState<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<T> ListState<T> {
    pub fn new() -> Self {
        ListState::default()
    }

    fn next_key(&mut self) -> Key {
        let key = Key(self.next_key);
        self.next_key += 1;
        key
    }

    fn position(&self, key: Key) -> Result<usize, Error> {
        self.entries
            .iter()
            .position(|e| e.key == key)
            .ok_or(Error::from(ErrorKind::NotFound))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in order, including pending ones
    pub fn entries(&self) -> &[Entry<T>] {
        &self.entries
    }

    pub fn get(&self, key: Key) -> Option<&Entry<T>> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Find the key of the entry with the given server identifier
    pub fn key_of(&self, id: &ItemId) -> Option<Key> {
        self.entries
            .iter()
            .find(|e| e.item.id() == Some(id))
            .map(|e| e.key)
    }

    /// Replace the whole list with a fresh read of the collection
    ///
    /// Entries keep their key if an item with the same identifier is in the
    /// new list. Pending changes are dropped.
    pub fn replace(&mut self, items: Vec<Item<T>>) {
        let previous = std::mem::take(&mut self.entries);
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let key = item
                .id()
                .and_then(|id| {
                    previous
                        .iter()
                        .find(|e| e.item.id() == Some(id))
                        .map(|e| e.key)
                })
                .unwrap_or_else(|| self.next_key());
            entries.push(Entry {
                key,
                item,
                phase: Phase::Committed,
            });
        }
        self.entries = entries;
    }

    /// Append a locally created entry waiting for the server to accept it
    pub fn begin_create(&mut self, fields: T) -> Key {
        let key = self.next_key();
        self.entries.push(Entry {
            key,
            item: Item::new(fields),
            phase: Phase::Pending(Pending::Create),
        });
        key
    }

    /// Show new fields for an entry while the update is in flight
    pub fn begin_update(&mut self, key: Key, fields: T) -> Result<(), Error> {
        let pos = self.position(key)?;
        let entry = &mut self.entries[pos];
        match entry.phase {
            Phase::Pending(Pending::Create) => return Err(ErrorKind::NotPersisted.into()),
            Phase::Pending(Pending::Delete { .. }) => return Err(ErrorKind::NotFound.into()),
            _ => {}
        }
        let previous = entry.item.replace_fields(fields);
        // an update already in flight keeps the last confirmed fields
        if matches!(entry.phase, Phase::Committed) {
            entry.phase = Phase::Pending(Pending::Update { previous });
        }
        Ok(())
    }

    /// Mark an entry for removal
    pub fn begin_delete(&mut self, key: Key) -> Result<(), Error> {
        let pos = self.position(key)?;
        let entry = &mut self.entries[pos];
        let previous = match std::mem::replace(&mut entry.phase, Phase::Committed) {
            Phase::Committed => None,
            Phase::Pending(Pending::Update { previous }) => Some(previous),
            Phase::Pending(Pending::Delete { previous }) => previous,
            Phase::Pending(Pending::Create) => {
                entry.phase = Phase::Pending(Pending::Create);
                return Err(ErrorKind::NotPersisted.into());
            }
        };
        entry.phase = Phase::Pending(Pending::Delete { previous });
        Ok(())
    }

    /// Confirm a pending create, taking the identity from the item echoed by
    /// the server
    pub fn commit_create(&mut self, key: Key, echo: Option<Item<T>>) -> Result<(), Error> {
        let pos = self.position(key)?;
        let entry = &mut self.entries[pos];
        if let Some(echo) = echo {
            entry.item.absorb(echo);
        }
        entry.phase = Phase::Committed;
        Ok(())
    }

    /// Confirm a pending update, optionally with the item echoed by the server
    ///
    /// A delete issued while the update was in flight stays pending.
    pub fn commit_update(&mut self, key: Key, echo: Option<Item<T>>) -> Result<(), Error> {
        let pos = self.position(key)?;
        let entry = &mut self.entries[pos];
        if let Some(echo) = echo {
            entry.item.absorb(echo);
        }
        entry.phase = match entry.phase {
            Phase::Pending(Pending::Delete { .. }) => {
                Phase::Pending(Pending::Delete { previous: None })
            }
            _ => Phase::Committed,
        };
        Ok(())
    }

    /// Confirm a pending delete, removing the entry
    pub fn commit_delete(&mut self, key: Key) -> Result<Item<T>, Error> {
        let pos = self.position(key)?;
        Ok(self.entries.remove(pos).item)
    }

    /// Undo a pending change
    ///
    /// Pending creates are removed, pending updates get their previous fields
    /// back and pending deletes are kept. A delete issued while an update was
    /// in flight goes back to waiting for that update. Committed entries are
    /// left as is.
    pub fn rollback(&mut self, key: Key) -> Result<(), Error> {
        let pos = self.position(key)?;
        let entry = &mut self.entries[pos];
        match std::mem::replace(&mut entry.phase, Phase::Committed) {
            Phase::Committed => {}
            Phase::Pending(Pending::Create) => {
                self.entries.remove(pos);
            }
            Phase::Pending(Pending::Update { previous }) => {
                entry.item.replace_fields(previous);
            }
            Phase::Pending(Pending::Delete { previous: None }) => {}
            Phase::Pending(Pending::Delete {
                previous: Some(previous),
            }) => {
                entry.phase = Phase::Pending(Pending::Update { previous });
            }
        }
        Ok(())
    }
}

impl<T: Clone> ListState<T> {
    /// The confirmed server state, without any pending change
    pub fn committed(&self) -> Vec<Item<T>> {
        self.entries
            .iter()
            .filter_map(|e| match &e.phase {
                Phase::Committed | Phase::Pending(Pending::Delete { previous: None }) => {
                    Some(e.item.clone())
                }
                Phase::Pending(Pending::Update { previous })
                | Phase::Pending(Pending::Delete {
                    previous: Some(previous),
                }) => Some(e.item.with_fields(previous.clone())),
                Phase::Pending(Pending::Create) => None,
            })
            .collect()
    }

    /// What a UI should show: every entry with its latest local fields,
    /// except the ones being deleted
    pub fn visible(&self) -> Vec<Item<T>> {
        self.entries
            .iter()
            .filter(|e| !matches!(e.phase, Phase::Pending(Pending::Delete { .. })))
            .map(|e| e.item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn todo(id: u64, title: &str) -> Item<String> {
        Item::from_server(Some(ItemId::from(id)), None, title.to_string())
    }

    fn titles(items: Vec<Item<String>>) -> Vec<String> {
        items.into_iter().map(Item::into_fields).collect()
    }

    #[test]
    fn it_keeps_keys_across_refetches() {
        let mut list = ListState::new();
        list.replace(vec![todo(1, "a"), todo(2, "b")]);
        let key = list.key_of(&ItemId::from(2)).unwrap();

        list.replace(vec![todo(2, "b2"), todo(3, "c")]);
        assert_eq!(list.key_of(&ItemId::from(2)), Some(key));
        assert_eq!(list.len(), 2);
        assert_eq!(titles(list.committed()), vec!["b2", "c"]);
    }

    #[test]
    fn it_hides_pending_creates_from_the_committed_view() {
        let mut list = ListState::new();
        let key = list.begin_create("milk".to_string());
        assert!(list.get(key).unwrap().is_pending());
        assert!(list.committed().is_empty());
        assert_eq!(titles(list.visible()), vec!["milk"]);

        list.commit_create(key, Some(todo(1, "milk"))).unwrap();
        assert_eq!(list.committed(), vec![todo(1, "milk")]);
    }

    #[test]
    fn it_rolls_back_a_failed_create() {
        let mut list = ListState::new();
        list.replace(vec![todo(1, "a")]);
        let key = list.begin_create("b".to_string());
        list.rollback(key).unwrap();
        assert_eq!(list.committed(), vec![todo(1, "a")]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn it_restores_the_confirmed_fields_on_a_failed_update() {
        let mut list = ListState::new();
        list.replace(vec![todo(1, "a")]);
        let key = list.key_of(&ItemId::from(1)).unwrap();

        list.begin_update(key, "x".to_string()).unwrap();
        list.begin_update(key, "y".to_string()).unwrap();
        assert_eq!(titles(list.visible()), vec!["y"]);
        assert_eq!(titles(list.committed()), vec!["a"]);

        list.rollback(key).unwrap();
        assert_eq!(list.visible(), vec![todo(1, "a")]);
    }

    #[test]
    fn it_removes_entries_only_when_the_delete_is_confirmed() {
        let mut list = ListState::new();
        list.replace(vec![todo(1, "a"), todo(2, "b")]);
        let key = list.key_of(&ItemId::from(1)).unwrap();

        list.begin_delete(key).unwrap();
        assert_eq!(list.visible(), vec![todo(2, "b")]);
        assert_eq!(list.committed().len(), 2);

        list.rollback(key).unwrap();
        assert_eq!(list.visible().len(), 2);

        list.begin_delete(key).unwrap();
        list.commit_delete(key).unwrap();
        assert_eq!(list.committed(), vec![todo(2, "b")]);
    }

    #[test]
    fn it_keeps_the_confirmed_fields_while_deleting_an_updated_entry() {
        let mut list = ListState::new();
        list.replace(vec![todo(1, "a")]);
        let key = list.key_of(&ItemId::from(1)).unwrap();

        list.begin_update(key, "x".to_string()).unwrap();
        list.begin_delete(key).unwrap();
        assert_eq!(titles(list.committed()), vec!["a"]);
        assert!(list.visible().is_empty());

        // the delete fails first, the update is still in flight
        list.rollback(key).unwrap();
        assert_eq!(titles(list.visible()), vec!["x"]);
        assert_eq!(titles(list.committed()), vec!["a"]);

        list.rollback(key).unwrap();
        assert_eq!(list.committed(), vec![todo(1, "a")]);
        assert_eq!(list.visible(), vec![todo(1, "a")]);
        assert!(!list.get(key).unwrap().is_pending());
    }

    #[test]
    fn it_keeps_a_delete_pending_when_an_earlier_update_is_confirmed() {
        let mut list = ListState::new();
        list.replace(vec![todo(1, "a")]);
        let key = list.key_of(&ItemId::from(1)).unwrap();

        list.begin_update(key, "x".to_string()).unwrap();
        list.begin_delete(key).unwrap();
        list.commit_update(key, None).unwrap();
        assert!(list.get(key).unwrap().is_pending());
        assert_eq!(titles(list.committed()), vec!["x"]);

        list.rollback(key).unwrap();
        assert_eq!(list.committed(), vec![todo(1, "x")]);
    }

    #[test]
    fn it_refuses_to_address_unsaved_entries() {
        let mut list = ListState::new();
        let key = list.begin_create("a".to_string());
        assert_eq!(
            list.begin_update(key, "b".to_string()).unwrap_err().kind(),
            ErrorKind::NotPersisted
        );
        assert_eq!(
            list.begin_delete(key).unwrap_err().kind(),
            ErrorKind::NotPersisted
        );
        assert_eq!(
            list.rollback(Key(99)).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn it_serializes_entries_with_their_phase() {
        #[derive(Clone, Serialize)]
        struct Todo {
            title: &'static str,
            done: bool,
        }

        let mut list = ListState::new();
        list.replace(vec![Item::from_server(
            Some(ItemId::from(1)),
            None,
            Todo {
                title: "a",
                done: true,
            },
        )]);
        list.begin_create(Todo {
            title: "b",
            done: false,
        });

        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!([
                {"key": 0, "id": 1, "title": "a", "done": true},
                {"key": 1, "pending": "create", "title": "b", "done": false},
            ])
        );
    }
}
