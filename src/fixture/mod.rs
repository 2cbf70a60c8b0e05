//! The fixture model under test.
//!
//! A single entity with one string-valued field, plus the static type
//! descriptor both engine strategies consume. The adversarial payload mixes
//! characters that require XML escaping (`"`, `&`, `<`, `>`) with characters
//! that require multi-byte UTF-8 encoding (`©`, `®`, `é`), so a single run
//! exercises both the escaping and the encoding path of every sink.

/// The adversarial payload: every reserved XML character plus three
/// multi-byte code points.
pub const ADVERSARIAL_VALUE: &str = "\" & < > \u{00A9} \u{00AE} \u{00E9}";

/// Namespace-declaration attributes emitted on the root element, matching
/// what the serialization engine declares for every serialized model.
pub const ROOT_NAMESPACES: &[(&str, &str)] = &[
    ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
    ("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"),
];

/// The single data shape under test: one string-valued field.
///
/// Immutable once constructed; the field is private so a fixture cannot be
/// mutated between produce and verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    value: String,
}

impl Fixture {
    /// Builds the standard adversarial fixture.
    ///
    /// The value contains at least one character requiring XML escaping and
    /// at least one character requiring multi-byte encoding.
    #[must_use]
    pub fn adversarial() -> Self {
        Self {
            value: ADVERSARIAL_VALUE.to_string(),
        }
    }

    /// Builds a fixture with an arbitrary value.
    ///
    /// Used for the boundary (plain ASCII, no reserved characters) and
    /// negative (raw control character) scenarios.
    #[must_use]
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The field value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The static reflection descriptor for this shape.
    ///
    /// The interpreted engine strategy walks this per call; the compiled
    /// strategy compiles an emit program from it once at construction.
    #[must_use]
    pub fn descriptor() -> &'static TypeDescriptor {
        &DESCRIPTOR
    }
}

/// Describes how a fixture maps to markup: root element name, namespace
/// declarations, and one entry per serialized field.
#[derive(Debug)]
pub struct TypeDescriptor {
    /// The root element name.
    pub type_name: &'static str,
    /// Namespace-declaration attributes on the root element.
    pub namespaces: &'static [(&'static str, &'static str)],
    /// The serialized fields, in emission order.
    pub fields: &'static [FieldDescriptor],
}

/// One serialized field: its element name and an accessor.
pub struct FieldDescriptor {
    /// The element name the field value is wrapped in.
    pub element_name: &'static str,
    /// Accessor returning the field value from a fixture.
    pub get: fn(&Fixture) -> &str,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("element_name", &self.element_name)
            .finish_non_exhaustive()
    }
}

static DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    type_name: "Fixture",
    namespaces: ROOT_NAMESPACES,
    fields: &[FieldDescriptor {
        element_name: "Value",
        get: Fixture::value,
    }],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adversarial_contains_escape_requiring_chars() {
        let fixture = Fixture::adversarial();
        for ch in ['"', '&', '<', '>'] {
            assert!(fixture.value().contains(ch), "missing {ch:?}");
        }
    }

    #[test]
    fn test_adversarial_contains_multibyte_chars() {
        let fixture = Fixture::adversarial();
        assert!(fixture.value().chars().any(|c| c.len_utf8() > 1));
        assert!(fixture.value().contains('\u{00A9}'));
        assert!(fixture.value().contains('\u{00AE}'));
        assert!(fixture.value().contains('\u{00E9}'));
    }

    #[test]
    fn test_descriptor_shape() {
        let desc = Fixture::descriptor();
        assert_eq!(desc.type_name, "Fixture");
        assert_eq!(desc.fields.len(), 1);
        assert_eq!(desc.fields[0].element_name, "Value");
        assert_eq!(desc.namespaces.len(), 2);
    }

    #[test]
    fn test_field_accessor() {
        let fixture = Fixture::with_value("hello");
        let desc = Fixture::descriptor();
        assert_eq!((desc.fields[0].get)(&fixture), "hello");
    }
}
