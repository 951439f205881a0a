//! Typed parameter records for recognition, action and execution-control data.
//!
//! A node's `recognition` and `action` are tagged unions keyed by algorithm
//! type. Every variant carries a record whose known keys are typed and whose
//! unknown keys are kept verbatim in an ordered passthrough map, so a document
//! written by a newer runtime survives an import/export cycle untouched.
//!
//! Two construction paths exist:
//! - **lenient** ([`ParamRecord::from_map_lenient`]): used on import. A key
//!   whose value does not fit its typed slot is moved to the passthrough map
//!   instead of failing the whole node.
//! - **strict** ([`ParamRecord::from_map_strict`]): used by field edits. A
//!   type mismatch is rejected and the record is left unchanged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowsmith_types::{FlowError, Result};

/// Declare a parameter record: every listed key becomes an optional typed
/// field, and everything else lands in `unknown`.
macro_rules! param_record {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
            /// Keys this record does not model, in document order.
            #[serde(flatten)]
            pub unknown: serde_json::Map<String, serde_json::Value>,
            #[serde(skip)]
            pub key_order: $crate::params::KeyOrder,
        }

        impl $crate::params::ParamRecord for $name {
            const KEYS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn unknown_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
                &mut self.unknown
            }

            fn key_order(&self) -> &$crate::params::KeyOrder {
                &self.key_order
            }

            fn key_order_mut(&mut self) -> &mut $crate::params::KeyOrder {
                &mut self.key_order
            }
        }
    };
}

/// Declare a tagged union of parameter records together with its kind enum.
///
/// Each arm is `Variant(Record) = "WireName" [required defaults]`.
macro_rules! algorithm_union {
    (
        section = $section:literal;
        $(#[$meta:meta])*
        pub enum $union:ident / $kind:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident($param:ident) = $wire:literal [ $( $rkey:literal => $rval:expr ),* $(,)? ]
            ),* $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $kind {
            $( $(#[$vmeta])* $variant ),*
        }

        impl $kind {
            pub const ALL: &'static [$kind] = &[$($kind::$variant),*];

            /// Name used in documents.
            pub fn name(self) -> &'static str {
                match self {
                    $( $kind::$variant => $wire ),*
                }
            }

            /// Resolve a type name, ignoring ASCII case.
            pub fn parse(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|k| k.name().eq_ignore_ascii_case(name))
            }

            /// Like [`Self::parse`] but reports unknown names.
            pub fn parse_or_err(name: &str) -> flowsmith_types::Result<Self> {
                Self::parse(name).ok_or_else(|| flowsmith_types::FlowError::UnknownType {
                    section: $section.into(),
                    name: name.into(),
                })
            }

            /// Parameter keys modelled by this kind.
            pub fn keys(self) -> &'static [&'static str] {
                match self {
                    $( $kind::$variant => <$param as $crate::params::ParamRecord>::KEYS ),*
                }
            }

            /// Keys that must be present, with the value filled in when missing.
            pub fn required(self) -> Vec<(&'static str, serde_json::Value)> {
                match self {
                    $( $kind::$variant => vec![$(($rkey, $rval)),*] ),*
                }
            }

            /// Every key modelled by any kind of this union.
            pub fn all_keys() -> Vec<&'static str> {
                let mut keys: Vec<&'static str> = Vec::new();
                for kind in Self::ALL {
                    for key in kind.keys() {
                        if !keys.contains(key) {
                            keys.push(key);
                        }
                    }
                }
                keys
            }
        }

        impl std::fmt::Display for $kind {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "crate::params::TypedParam", into = "crate::params::TypedParam")]
        pub enum $union {
            $( $(#[$vmeta])* $variant($param) ),*
        }

        impl Default for $union {
            fn default() -> Self {
                Self::with_defaults($kind::ALL[0])
            }
        }

        impl $union {
            pub fn kind(&self) -> $kind {
                match self {
                    $( $union::$variant(_) => $kind::$variant ),*
                }
            }

            /// Parameters as a JSON map in the order they were read or set.
            pub fn param(&self) -> serde_json::Map<String, serde_json::Value> {
                use $crate::params::ParamRecord;
                match self {
                    $( $union::$variant(p) => p.to_map() ),*
                }
            }

            /// Build from a kind and a parameter map, keeping misfit values
            /// as passthrough keys.
            pub fn from_parts(kind: $kind, param: serde_json::Map<String, serde_json::Value>) -> Self {
                use $crate::params::ParamRecord;
                match kind {
                    $( $kind::$variant => $union::$variant($param::from_map_lenient(param)) ),*
                }
            }

            fn from_parts_strict(
                kind: $kind,
                param: serde_json::Map<String, serde_json::Value>,
            ) -> std::result::Result<Self, serde_json::Error> {
                use $crate::params::ParamRecord;
                Ok(match kind {
                    $( $kind::$variant => $union::$variant($param::from_map_strict(param)?) ),*
                })
            }

            /// A fresh value of `kind` with its required keys filled in.
            pub fn with_defaults(kind: $kind) -> Self {
                let mut value = Self::from_parts(kind, serde_json::Map::new());
                value.fill_required();
                value
            }

            /// Set or delete one parameter key. A value that does not fit the
            /// key's type is rejected and `self` is left unchanged.
            pub fn set_field(&mut self, key: &str, value: $crate::params::FieldValue) -> flowsmith_types::Result<()> {
                let mut map = self.param();
                match value {
                    $crate::params::FieldValue::Set(v) => {
                        map.insert(key.to_string(), v);
                    }
                    $crate::params::FieldValue::Delete => {
                        map.shift_remove(key);
                    }
                }
                let updated = Self::from_parts_strict(self.kind(), map).map_err(|e| {
                    flowsmith_types::FlowError::InvalidField {
                        section: $section.into(),
                        key: key.into(),
                        message: e.to_string(),
                    }
                })?;
                *self = updated;
                Ok(())
            }

            /// Convert to another kind. Keys the new kind does not model are
            /// dropped, values that no longer fit are dropped, and newly
            /// required keys get their defaults.
            pub fn convert_to(&self, kind: $kind) -> Self {
                if kind == self.kind() {
                    return self.clone();
                }
                let mut next = Self::from_parts(kind, serde_json::Map::new());
                for (key, value) in self.param() {
                    if !kind.keys().contains(&key.as_str()) {
                        continue;
                    }
                    if let Err(e) = next.set_field(&key, $crate::params::FieldValue::Set(value)) {
                        tracing::debug!(key = %key, to = %kind, error = %e, "Dropped parameter on type change");
                    }
                }
                next.fill_required();
                next
            }

            fn fill_required(&mut self) {
                let present = self.param();
                for (key, value) in self.kind().required() {
                    if !present.contains_key(key) {
                        let _ = self.set_field(key, $crate::params::FieldValue::Set(value));
                    }
                }
            }
        }

        impl TryFrom<crate::params::TypedParam> for $union {
            type Error = flowsmith_types::FlowError;

            fn try_from(raw: crate::params::TypedParam) -> flowsmith_types::Result<Self> {
                let kind = $kind::parse_or_err(&raw.kind)?;
                Ok(Self::from_parts(kind, raw.param))
            }
        }

        impl From<$union> for crate::params::TypedParam {
            fn from(value: $union) -> Self {
                crate::params::TypedParam {
                    kind: value.kind().name().to_string(),
                    param: value.param(),
                }
            }
        }
    };
}

pub mod action;
pub mod others;
pub mod recognition;

pub use action::{Action, ActionKind};
pub use others::{Others, WaitFreezes};
pub use recognition::{Recognition, RecognitionKind};

/// Wire form of a tagged union: `{"type": "...", "param": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedParam {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub param: Map<String, Value>,
}

/// Value of a single field edit.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Set(Value),
    /// Remove the key, falling back to the runtime's implicit default.
    Delete,
}

/// String a host may send in place of a value to request deletion.
pub const DELETE_SENTINEL: &str = "__mpe_delete";

impl FieldValue {
    /// Interpret a value received from a host, mapping [`DELETE_SENTINEL`]
    /// to [`FieldValue::Delete`].
    pub fn from_wire(value: Value) -> Self {
        match value {
            Value::String(s) if s == DELETE_SENTINEL => FieldValue::Delete,
            other => FieldValue::Set(other),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Set(value)
    }
}

// ---------------------------------------------------------------------------
// Shared value shapes
// ---------------------------------------------------------------------------

/// Where an action or ROI points: the current hit (`true`), another node's
/// hit (by name) or explicit coordinates `[x, y, w, h]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Flag(bool),
    Name(String),
    Coords(Vec<i64>),
}

/// A parameter that accepts a single value or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(vs) => vs.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ParamRecord
// ---------------------------------------------------------------------------

/// Order in which a record's keys were read, so writing it back keeps the
/// author's layout. Two records with the same values are equal whatever
/// their key order.
#[derive(Debug, Clone, Default)]
pub struct KeyOrder(Vec<String>);

impl KeyOrder {
    fn of(map: &Map<String, Value>) -> Self {
        Self(map.keys().cloned().collect())
    }

    /// Put known keys back in their recorded order; keys added since go last.
    fn arrange(&self, mut map: Map<String, Value>) -> Map<String, Value> {
        if self.0.is_empty() {
            return map;
        }
        let mut out = Map::new();
        for key in &self.0 {
            if let Some(value) = map.shift_remove(key) {
                out.insert(key.clone(), value);
            }
        }
        out.extend(map);
        out
    }
}

impl PartialEq for KeyOrder {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// Behaviour shared by every generated parameter record.
pub trait ParamRecord: Serialize + DeserializeOwned + Default + Clone {
    /// Keys with a typed slot.
    const KEYS: &'static [&'static str];

    fn unknown_mut(&mut self) -> &mut Map<String, Value>;

    fn key_order(&self) -> &KeyOrder;

    fn key_order_mut(&mut self) -> &mut KeyOrder;

    fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => self.key_order().arrange(map),
            _ => Map::new(),
        }
    }

    /// Typed parse of `map`. An explicit `null` on a modelled key is kept
    /// as passthrough so it is written back as `null`.
    fn from_map_strict(map: Map<String, Value>) -> std::result::Result<Self, serde_json::Error> {
        let order = KeyOrder::of(&map);
        let (nulls, rest): (Map<String, Value>, Map<String, Value>) = map
            .into_iter()
            .partition(|(key, value)| value.is_null() && Self::KEYS.contains(&key.as_str()));
        let mut record: Self = serde_json::from_value(Value::Object(rest))?;
        record.unknown_mut().extend(nulls);
        *record.key_order_mut() = order;
        Ok(record)
    }

    fn from_map_lenient(map: Map<String, Value>) -> Self {
        if let Ok(record) = Self::from_map_strict(map.clone()) {
            return record;
        }
        let order = KeyOrder::of(&map);
        let mut accepted = Map::new();
        let mut rejected = Map::new();
        for (key, value) in map {
            let mut single = Map::new();
            single.insert(key.clone(), value.clone());
            if Self::from_map_strict(single).is_ok() {
                accepted.insert(key, value);
            } else {
                tracing::debug!(key = %key, "Parameter kept as passthrough: value does not fit");
                rejected.insert(key, value);
            }
        }
        let mut record = Self::from_map_strict(accepted).unwrap_or_default();
        record.unknown_mut().extend(rejected);
        *record.key_order_mut() = order;
        record
    }

    /// Strict single-key edit on a copy of the record.
    fn with_field(&self, section: &str, key: &str, value: FieldValue) -> Result<Self> {
        let mut map = self.to_map();
        match value {
            FieldValue::Set(v) => {
                map.insert(key.to_string(), v);
            }
            FieldValue::Delete => {
                map.shift_remove(key);
            }
        }
        Self::from_map_strict(map).map_err(|e| FlowError::InvalidField {
            section: section.into(),
            key: key.into(),
            message: e.to_string(),
        })
    }
}
