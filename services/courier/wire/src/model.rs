//! Payload model trait.
//!
//! Anything carried in an envelope implements [`EnvelopeModel`]. The bound is
//! what makes a typed decode legal: model types, and vectors or string-keyed
//! maps of model types.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A type that can travel as an envelope payload
pub trait EnvelopeModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Endpoint this type is sent to, when it has a fixed one
    fn endpoint() -> Option<&'static str> {
        None
    }

    /// Rule name used in schema output
    fn schema_name() -> String {
        let (_, name) = split_type_path(std::any::type_name::<Self>());
        name.to_string()
    }

    /// Dotted package derived from the module path
    fn schema_package() -> String {
        let (module, _) = split_type_path(std::any::type_name::<Self>());
        module.replace("::", ".")
    }

    /// CDDL body describing the encoded shape
    fn cddl() -> String {
        "any".to_string()
    }
}

/// Split a Rust type path into its module path and bare type name.
///
/// Generic arguments are ignored.
pub fn split_type_path(path: &str) -> (&str, &str) {
    let base = path.split('<').next().unwrap_or(path);
    match base.rfind("::") {
        Some(idx) => (&base[..idx], &base[idx + 2..]),
        None => ("", base),
    }
}

impl<T: EnvelopeModel> EnvelopeModel for Vec<T> {
    fn schema_name() -> String {
        format!("{}List", T::schema_name())
    }

    fn schema_package() -> String {
        T::schema_package()
    }

    fn cddl() -> String {
        format!("[* {}]", T::cddl())
    }
}

impl<T: EnvelopeModel> EnvelopeModel for BTreeMap<String, T> {
    fn schema_name() -> String {
        format!("{}Map", T::schema_name())
    }

    fn schema_package() -> String {
        T::schema_package()
    }

    fn cddl() -> String {
        format!("{{* tstr => {}}}", T::cddl())
    }
}

impl<T: EnvelopeModel> EnvelopeModel for HashMap<String, T> {
    fn schema_name() -> String {
        format!("{}Map", T::schema_name())
    }

    fn schema_package() -> String {
        T::schema_package()
    }

    fn cddl() -> String {
        format!("{{* tstr => {}}}", T::cddl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Sample {
        id: u32,
    }

    impl EnvelopeModel for Sample {
        fn endpoint() -> Option<&'static str> {
            Some("Sample")
        }

        fn cddl() -> String {
            "{ id: uint }".to_string()
        }
    }

    #[test]
    fn test_split_type_path() {
        assert_eq!(split_type_path("a::b::C"), ("a::b", "C"));
        assert_eq!(split_type_path("C"), ("", "C"));
        assert_eq!(split_type_path("a::Wrap<x::Y>"), ("a", "Wrap"));
    }

    #[test]
    fn test_schema_names() {
        assert_eq!(Sample::schema_name(), "Sample");
        assert_eq!(Sample::schema_package(), "courier_wire.model.tests");
        assert_eq!(<Vec<Sample>>::schema_name(), "SampleList");
        assert_eq!(<Vec<Sample>>::schema_package(), "courier_wire.model.tests");
        assert_eq!(<Vec<Sample>>::cddl(), "[* { id: uint }]");
        assert_eq!(<BTreeMap<String, Sample>>::cddl(), "{* tstr => { id: uint }}");
    }

    #[test]
    fn test_collections_have_no_endpoint() {
        assert_eq!(Sample::endpoint(), Some("Sample"));
        assert_eq!(<Vec<Sample>>::endpoint(), None);
        assert_eq!(<HashMap<String, Sample>>::endpoint(), None);
    }
}
