//! Conversion between property maps and the wire representation
//!
//! Properties travel as `google.protobuf.Struct` documents. How resource
//! references and unknown values are encoded depends on the phase of the call,
//! which callers describe with [`MarshalOptions`].
//!
//! A reference that travels unresolved is a struct carrying
//! [`REFERENCE_SIGNATURE_KEY`] next to its URN, so a string that merely looks
//! like a URN is never mistaken for one.

use crate::error::{LumiplugError, Result};
use crate::property::{Id, PropertyKey, PropertyMap, PropertyValue};
use crate::tokens::Urn;
use prost_types::{value::Kind, ListValue, Struct, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

/// Wire encoding of an unknown value
///
/// The string is a fixed UUID so it cannot collide with ordinary values.
pub const UNKNOWN_SENTINEL: &str = "04da6b54-80e4-46f7-96ec-b56ff0331ba9";

/// Field that marks a struct as an unresolved resource reference
pub const REFERENCE_SIGNATURE_KEY: &str = "4dabf18193072939515e22adb298388d";
/// Value stored under [`REFERENCE_SIGNATURE_KEY`]
pub const REFERENCE_SIGNATURE: &str = "5cf8f73096256a8f31e491e813e4eb8e";
const REFERENCE_URN_KEY: &str = "urn";

/// Phase-dependent marshaling policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarshalOptions {
    /// References that cannot be resolved yet may be sent as URNs
    pub allow_old_references: bool,
    /// References are always sent as URNs, never resolved
    pub raw_references: bool,
}

impl MarshalOptions {
    /// Pre-create calls: nothing needs to resolve yet
    pub fn preview() -> Self {
        Self {
            allow_old_references: true,
            raw_references: true,
        }
    }

    /// Diff calls: references stay as URNs on both sides so they compare equal
    pub fn raw() -> Self {
        Self {
            allow_old_references: false,
            raw_references: true,
        }
    }

    /// Prior state that may predate resolution of its references
    pub fn old_state() -> Self {
        Self {
            allow_old_references: true,
            raw_references: false,
        }
    }
}

/// Maps resource references to the IDs their resources were given
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, urn: &Urn) -> Option<Id>;
}

/// Resolver for callers that never use references
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceResolver for NoReferences {
    fn resolve(&self, _urn: &Urn) -> Option<Id> {
        None
    }
}

/// In-memory reference table filled in as resources are created
#[derive(Debug, Default)]
pub struct ReferenceTable {
    ids: RwLock<HashMap<Urn, Id>>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    // The map stays consistent across a panicking writer, so poisoning is ignored.
    pub fn record(&self, urn: Urn, id: Id) {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(urn, id);
    }

    pub fn forget(&self, urn: &Urn) {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(urn);
    }
}

impl ReferenceResolver for ReferenceTable {
    fn resolve(&self, urn: &Urn) -> Option<Id> {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(urn)
            .cloned()
    }
}

/// Marshals a property map; unknowns are encoded with [`UNKNOWN_SENTINEL`]
pub fn marshal_properties(
    props: &PropertyMap,
    opts: MarshalOptions,
    resolver: &dyn ReferenceResolver,
) -> Result<Struct> {
    let mut fields = BTreeMap::new();
    for (key, value) in props {
        fields.insert(key.clone(), marshal_value(key, value, opts, resolver)?);
    }
    Ok(Struct { fields })
}

/// Marshals a property map and reports which top-level keys hold unknowns
pub fn marshal_properties_with_unknowns(
    props: &PropertyMap,
    opts: MarshalOptions,
    resolver: &dyn ReferenceResolver,
) -> Result<(Struct, Vec<PropertyKey>)> {
    let wire = marshal_properties(props, opts, resolver)?;
    Ok((wire, props.unknown_keys()))
}

fn marshal_value(
    key: &str,
    value: &PropertyValue,
    opts: MarshalOptions,
    resolver: &dyn ReferenceResolver,
) -> Result<Value> {
    let kind = match value {
        PropertyValue::Null => Kind::NullValue(0),
        PropertyValue::Bool(b) => Kind::BoolValue(*b),
        PropertyValue::Number(n) => Kind::NumberValue(*n),
        PropertyValue::String(s) => Kind::StringValue(s.clone()),
        PropertyValue::Array(items) => Kind::ListValue(ListValue {
            values: items
                .iter()
                .map(|item| marshal_value(key, item, opts, resolver))
                .collect::<Result<Vec<_>>>()?,
        }),
        PropertyValue::Object(map) => Kind::StructValue(marshal_properties(map, opts, resolver)?),
        PropertyValue::Resource(urn) => marshal_reference(key, urn, opts, resolver)?,
        PropertyValue::Unknown => Kind::StringValue(UNKNOWN_SENTINEL.to_string()),
    };
    Ok(Value { kind: Some(kind) })
}

fn marshal_reference(
    key: &str,
    urn: &Urn,
    opts: MarshalOptions,
    resolver: &dyn ReferenceResolver,
) -> Result<Kind> {
    if opts.raw_references {
        return Ok(reference_struct(urn));
    }
    match resolver.resolve(urn) {
        Some(id) => Ok(Kind::StringValue(id.to_string())),
        None if opts.allow_old_references => Ok(reference_struct(urn)),
        None => Err(LumiplugError::Marshal {
            key: key.to_string(),
            message: format!("reference to {} has no ID yet", urn),
        }),
    }
}

fn reference_struct(urn: &Urn) -> Kind {
    let string = |s: String| Value {
        kind: Some(Kind::StringValue(s)),
    };
    let mut fields = BTreeMap::new();
    fields.insert(
        REFERENCE_SIGNATURE_KEY.to_string(),
        string(REFERENCE_SIGNATURE.to_string()),
    );
    fields.insert(REFERENCE_URN_KEY.to_string(), string(urn.to_string()));
    Kind::StructValue(Struct { fields })
}

/// The URN of a tagged reference struct, if `wire` is one
fn reference_urn(wire: &Struct) -> Option<Urn> {
    let signed = matches!(
        wire.fields.get(REFERENCE_SIGNATURE_KEY).and_then(|v| v.kind.as_ref()),
        Some(Kind::StringValue(sig)) if sig == REFERENCE_SIGNATURE
    );
    if !signed || wire.fields.len() != 2 {
        return None;
    }
    match wire.fields.get(REFERENCE_URN_KEY).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(urn)) => Urn::new(urn.clone()).ok(),
        _ => None,
    }
}

/// Unmarshals a wire struct into a new property map
///
/// Tagged references come back as [`PropertyValue::Resource`] whatever the
/// options; the options only mirror the ones the document was marshaled with.
pub fn unmarshal_properties(wire: &Struct, _opts: MarshalOptions) -> PropertyMap {
    unmarshal_struct(wire)
}

fn unmarshal_struct(wire: &Struct) -> PropertyMap {
    wire.fields
        .iter()
        .map(|(key, value)| (key.clone(), unmarshal_value(value)))
        .collect()
}

/// Unmarshals a wire struct into an existing map, overwriting reported keys only
pub fn unmarshal_properties_into(wire: &Struct, props: &mut PropertyMap, opts: MarshalOptions) {
    props.merge(unmarshal_properties(wire, opts));
}

fn unmarshal_value(value: &Value) -> PropertyValue {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => PropertyValue::Null,
        Some(Kind::BoolValue(b)) => PropertyValue::Bool(*b),
        Some(Kind::NumberValue(n)) => PropertyValue::Number(*n),
        Some(Kind::StringValue(s)) if s == UNKNOWN_SENTINEL => PropertyValue::Unknown,
        Some(Kind::StringValue(s)) => PropertyValue::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            PropertyValue::Array(list.values.iter().map(unmarshal_value).collect())
        }
        Some(Kind::StructValue(s)) => match reference_urn(s) {
            Some(urn) => PropertyValue::Resource(urn),
            None => PropertyValue::Object(unmarshal_struct(s)),
        },
    }
}
