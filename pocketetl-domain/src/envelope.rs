//! # Record Envelope
//!
//! The envelope is the typed key/value carrier that flows on the wire
//! between stages. It decouples adjacent stages' static types so a
//! transformer can add or remove attributes without breaking the
//! *attribute tunnelling* guarantee: anything a stage doesn't read or
//! overwrite keeps flowing downstream untouched.
//!
//! There is no runtime reflection in Rust, so "enumerate a user object's
//! readable attributes" and "populate a view type's matching
//! attributes, defaulting the rest" are realized through `serde`: every
//! stage's declared view type must implement
//! `Serialize + DeserializeOwned + Default`, standing in for a
//! hand-written-or-generated `fromMap`/`toMap` pair.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::EtlError;

/// Attribute storage backing an envelope. `BTreeMap` keeps attribute
/// iteration order stable, which makes envelope contents reproducible
/// in tests and log output.
pub type AttributeMap = std::collections::BTreeMap<String, Value>;

/// A dynamically typed, name-keyed record flowing between stages.
///
/// Immutable once constructed: a transformer that wants to change a
/// record produces a *new* envelope (via [`Envelope::merge_object`])
/// rather than mutating this one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    attributes: AttributeMap,
}

impl Envelope {
    /// An envelope with no attributes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Constructs an envelope from a user object by enumerating its
    /// serializable attributes into the internal mapping.
    ///
    /// This is how a producer turns an `Extractor<T>`'s yielded `T`
    /// into the envelope handed to `consume`.
    pub fn from_object<T: Serialize>(value: &T) -> Result<Self, EtlError> {
        let attributes = Self::to_attribute_map(value)?;
        Ok(Self { attributes })
    }

    /// Projects this envelope into a stage's declared view type.
    ///
    /// Matching attribute names (case-sensitive, exact match on the
    /// serialized field name) are copied in; attributes the view type
    /// declares but the envelope doesn't carry are left at `V`'s
    /// default. Attributes the envelope carries but `V` doesn't declare
    /// are simply not copied — they remain in the envelope for
    /// downstream stages (attribute tunnelling), this method never
    /// mutates `self`.
    pub fn project<V>(&self) -> Result<V, EtlError>
    where
        V: DeserializeOwned + Default + Serialize,
    {
        let defaults = Self::to_attribute_map(&V::default())?;
        let mut merged = defaults;
        for (key, value) in &self.attributes {
            if merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(Value::Object(merged)).map_err(EtlError::from)
    }

    /// Produces a new envelope by overlaying a freshly serialized
    /// object's attributes on top of this one.
    ///
    /// Used when a transformer emits an output object: the output's
    /// fields overwrite the corresponding attributes, and every
    /// attribute this envelope carried that the output didn't touch
    /// tunnels through unchanged.
    pub fn merge_object<T: Serialize>(&self, value: &T) -> Result<Self, EtlError> {
        let overlay = Self::to_attribute_map(value)?;
        let mut merged = self.attributes.clone();
        merged.extend(overlay);
        Ok(Self { attributes: merged })
    }

    /// Read-only view of the raw attribute map, mostly useful for
    /// logging and test assertions.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn to_attribute_map<T: Serialize>(value: &T) -> Result<AttributeMap, EtlError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self::json_map_to_attribute_map(map)),
            other => Err(EtlError::recoverable(format!(
                "stage object did not serialize to a record (got {other})"
            ))),
        }
    }

    fn json_map_to_attribute_map(map: Map<String, Value>) -> AttributeMap {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct Upper {
        v: String,
    }

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct Lower {
        v: String,
    }

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct WithExtra {
        v: String,
        extra: i64,
    }

    #[test]
    fn round_trips_identical_shapes() {
        let input = Upper { v: "ONE".into() };
        let envelope = Envelope::from_object(&input).unwrap();
        let out: Lower = envelope.project().unwrap();
        assert_eq!(out.v, "ONE");
    }

    #[test]
    fn missing_attributes_default() {
        let input = Lower { v: "x".into() };
        let envelope = Envelope::from_object(&input).unwrap();
        let out: WithExtra = envelope.project().unwrap();
        assert_eq!(out.v, "x");
        assert_eq!(out.extra, 0);
    }

    #[test]
    fn tunnels_unread_attributes_through_merge() {
        let input = WithExtra { v: "a".into(), extra: 7 };
        let envelope = Envelope::from_object(&input).unwrap();

        // A transformer only reads/writes `v`.
        let projected: Lower = envelope.project().unwrap();
        let transformed = Lower { v: projected.v.to_uppercase() };
        let merged = envelope.merge_object(&transformed).unwrap();

        let out: WithExtra = merged.project().unwrap();
        assert_eq!(out.v, "A");
        assert_eq!(out.extra, 7, "extra must tunnel through untouched");
    }

    #[test]
    fn rejects_non_object_payloads() {
        let err = Envelope::from_object(&42i64).unwrap_err();
        assert!(err.is_recoverable());
    }

    proptest::proptest! {
        /// Property 7: a record round-tripped through an envelope with no
        /// transform in between preserves every attribute the view types
        /// share, for any string value.
        #[test]
        fn round_trip_preserves_shared_attributes(v in ".*", extra in any::<i64>()) {
            let input = WithExtra { v: v.clone(), extra };
            let envelope = Envelope::from_object(&input).unwrap();
            let out: WithExtra = envelope.project().unwrap();
            prop_assert_eq!(out, input);
        }
    }
}
