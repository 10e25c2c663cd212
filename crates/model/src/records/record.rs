use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A single document: field name to JSON value.
///
/// Delimited-text input only ever produces `Value::String` entries; JSON
/// input keeps whatever types the file carried.
pub type Record = Map<String, Value>;

/// Serialized size of a record, as used for batch byte accounting.
pub fn encoded_len(record: &Record) -> Result<usize, serde_json::Error> {
    serde_json::to_vec(record).map(|bytes| bytes.len())
}

/// Looks up the primary key value of a record, if present.
pub fn primary_key<'a>(record: &'a Record, key: &str) -> Option<&'a Value> {
    record.get(key)
}

/// Restricts records to a fixed set of field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    fields: HashSet<String>,
}

impl FieldFilter {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a comma separated list such as `id,name,hashtag`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|f| !f.is_empty()))
    }

    pub fn allows(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Drops every field not in the allowlist, in place.
    pub fn apply(&self, record: &mut Record) {
        record.retain(|key, _| self.fields.contains(key));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn filter_keeps_only_allowed_fields() {
        let filter = FieldFilter::parse("id, name");
        let mut rec = record(json!({"id": 1, "name": "a", "hashtag": "#x"}));
        filter.apply(&mut rec);
        assert_eq!(rec, record(json!({"id": 1, "name": "a"})));
        assert!(filter.allows("id"));
        assert!(!filter.allows("hashtag"));
    }

    #[test]
    fn encoded_len_matches_serialized_form() {
        let rec = record(json!({"id": 1}));
        assert_eq!(encoded_len(&rec).unwrap(), br#"{"id":1}"#.len());
    }
}
