use crate::store::{Datum, FromDatum, Serializable, SerializationError};
use std::collections::BTreeMap;

/// A persisted record with a primary and an optional external identifier
pub trait Record: Serializable + FromDatum + Clone + PartialEq + Default {
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn external_id(&self) -> Option<&str>;
}

/// Records keyed by ID with an index of external IDs.
///
/// IDs that are not given explicitly are generated as the lowest free number not below any
/// numeric ID seen so far. Only the records are persisted, the index and the ID counter are
/// rebuilt from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Records<T> {
    records: BTreeMap<String, T>,
    // external ID -> ID
    external_index: BTreeMap<String, String>,
    next_id: u64,
}

impl<T> Default for Records<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            external_index: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<T: Record> Records<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Option<&T> {
        self.external_index
            .get(external_id)
            .and_then(|id| self.records.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    /// ID of a stored record sharing the ID or the external ID of `record`
    pub fn existing(&self, record: &T) -> Option<String> {
        if let Some(id) = record.id().filter(|id| self.records.contains_key(*id)) {
            return Some(id.to_string());
        }

        record
            .external_id()
            .and_then(|external_id| self.external_index.get(external_id))
            .cloned()
    }

    /// Store a new record, generating its ID if it has none. Returns the ID.
    pub fn insert(&mut self, mut record: T) -> String {
        let id = match record.id() {
            Some(id) => id.to_string(),
            None => {
                while self.records.contains_key(&self.next_id.to_string()) {
                    self.next_id += 1;
                }
                let id = self.next_id.to_string();
                record.set_id(id.clone());
                id
            }
        };

        Self::index(&mut self.external_index, &mut self.next_id, &record);
        self.records.insert(id.clone(), record);
        id
    }

    /// Apply `change` to a stored record, `false` if there is no record with `id`
    pub fn modify(&mut self, id: &str, change: impl FnOnce(&mut T)) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };

        if let Some(external_id) = record.external_id() {
            self.external_index.remove(external_id);
        }
        change(record);

        // the ID stays fixed
        record.set_id(id.to_string());
        Self::index(&mut self.external_index, &mut self.next_id, record);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let record = self.records.remove(id)?;

        if let Some(external_id) = record.external_id() {
            self.external_index.remove(external_id);
        }
        Some(record)
    }

    pub fn to_datum(&self) -> Datum {
        Datum::Map(
            self.records
                .iter()
                .map(|(id, record)| (id.clone(), Datum::object(record.clone())))
                .collect(),
        )
    }

    /// Replace all records with deserialized ones and rebuild the index
    pub fn restore(&mut self, datum: Datum) -> Result<(), SerializationError> {
        self.records = BTreeMap::from_datum(datum)?;
        self.reindex();
        Ok(())
    }

    fn reindex(&mut self) {
        self.external_index.clear();
        self.next_id = 0;

        for record in self.records.values() {
            Self::index(&mut self.external_index, &mut self.next_id, record);
        }
    }

    fn index(external_index: &mut BTreeMap<String, String>, next_id: &mut u64, record: &T) {
        let Some(id) = record.id() else {
            return;
        };

        if let Some(external_id) = record.external_id() {
            external_index.insert(external_id.to_string(), id.to_string());
        }
        if let Ok(numeric) = id.parse::<u64>() {
            *next_id = (*next_id).max(numeric);
        }
    }
}
