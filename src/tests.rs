//! Shared `proptest` strategies used across unit tests.
use proptest::prelude::*;

use crate::types::field_type::{FieldType, PrimitiveType};

/// An arbitrary JVM binary class name, e.g. `java/lang/Object`.
pub(crate) fn arb_class_name() -> impl Strategy<Value = String> {
    arb_identifier()
}

/// An arbitrary identifier-like string, reused for class, field and method names.
pub(crate) fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,15}(/[a-zA-Z][a-zA-Z0-9_]{0,15}){0,3}"
}

/// An arbitrary single-character primitive type descriptor.
pub(crate) fn arb_primitive_type_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Z".to_owned()),
        Just("C".to_owned()),
        Just("F".to_owned()),
        Just("D".to_owned()),
        Just("B".to_owned()),
        Just("S".to_owned()),
        Just("I".to_owned()),
        Just("J".to_owned()),
    ]
}

/// An arbitrary non-array [`FieldType`].
pub(crate) fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        any::<PrimitiveType>().prop_map(FieldType::Base),
        arb_class_name().prop_map(|name| FieldType::Object(crate::jvm::references::ClassRef::new(name))),
    ]
}
