//! Scalar types of entity fields and the lookup operators they support.

use std::collections::BTreeSet;
use std::fmt;

use enum_iterator::Sequence;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The scalar types a field can be stored as.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Sequence, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Boolean,
    Integer,
    Float,
    Text,
    Uuid,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Json,
}

impl ScalarType {
    const LOOKUPS_SUPPORTED_BY_ALL_TYPES: &'static [Lookup] =
        &[Lookup::Exact, Lookup::In, Lookup::IsNull];

    const ORDERING_LOOKUPS: &'static [Lookup] = &[
        Lookup::LessThan,
        Lookup::LessThanOrEqualTo,
        Lookup::GreaterThan,
        Lookup::GreaterThanOrEqualTo,
        Lookup::Range,
    ];

    const STRING_LOOKUPS: &'static [Lookup] = &[
        Lookup::CaseInsensitiveExact,
        Lookup::Contains,
        Lookup::CaseInsensitiveContains,
        Lookup::StartsWith,
        Lookup::CaseInsensitiveStartsWith,
        Lookup::EndsWith,
        Lookup::CaseInsensitiveEndsWith,
        Lookup::Regex,
        Lookup::CaseInsensitiveRegex,
    ];

    /// Returns the complete set of lookups for the given type.
    pub fn lookups(self) -> BTreeSet<Lookup> {
        let mut lookups = BTreeSet::from_iter(Self::LOOKUPS_SUPPORTED_BY_ALL_TYPES.iter().copied());
        match self {
            ScalarType::Text => {
                lookups.extend(Self::ORDERING_LOOKUPS.iter().copied());
                lookups.extend(Self::STRING_LOOKUPS.iter().copied());
            }
            ScalarType::Integer
            | ScalarType::Float
            | ScalarType::Uuid
            | ScalarType::Date
            | ScalarType::DateTime => lookups.extend(Self::ORDERING_LOOKUPS.iter().copied()),
            ScalarType::Boolean => {}
            // json documents only support equality and null checks.
            ScalarType::Json => {
                lookups.remove(&Lookup::In);
            }
        }
        lookups
    }

    /// Does this type support the given lookup?
    pub fn supports(self, lookup: Lookup) -> bool {
        self.lookups().contains(&lookup)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Boolean => "boolean",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Text => "text",
            ScalarType::Uuid => "uuid",
            ScalarType::Date => "date",
            ScalarType::DateTime => "datetime",
            ScalarType::Json => "json",
        };
        write!(f, "{name}")
    }
}

/// The complete list of lookups a comparison can use.
/// Not all of these are supported for every type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Sequence,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum Lookup {
    Exact,
    CaseInsensitiveExact,
    Contains,
    CaseInsensitiveContains,
    StartsWith,
    CaseInsensitiveStartsWith,
    EndsWith,
    CaseInsensitiveEndsWith,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    In,
    Range,
    IsNull,
    Regex,
    CaseInsensitiveRegex,
}

/// The shape of the value a lookup compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A single value of the field's type.
    Single,
    /// A list of values of the field's type.
    List,
    /// A pair of values of the field's type, lower and upper bound.
    Pair,
    /// A boolean, regardless of the field's type.
    Flag,
    /// A pattern string, regardless of the field's type.
    Pattern,
}

impl Lookup {
    /// The name of the lookup as it appears in field paths, e.g. `title__icontains`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::CaseInsensitiveExact => "iexact",
            Self::Contains => "contains",
            Self::CaseInsensitiveContains => "icontains",
            Self::StartsWith => "startswith",
            Self::CaseInsensitiveStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::CaseInsensitiveEndsWith => "iendswith",
            Self::LessThan => "lt",
            Self::LessThanOrEqualTo => "lte",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqualTo => "gte",
            Self::In => "in",
            Self::Range => "range",
            Self::IsNull => "isnull",
            Self::Regex => "regex",
            Self::CaseInsensitiveRegex => "iregex",
        }
    }

    /// Parse a lookup name. `eq` is accepted as an alias of `exact`.
    pub fn from_name(name: &str) -> Option<Lookup> {
        if name == "eq" {
            return Some(Lookup::Exact);
        }
        enum_iterator::all::<Lookup>().find(|lookup| lookup.name() == name)
    }

    /// What kind of value does this lookup expect?
    pub fn value_shape(self) -> ValueShape {
        match self {
            Self::In => ValueShape::List,
            Self::Range => ValueShape::Pair,
            Self::IsNull => ValueShape::Flag,
            Self::Regex | Self::CaseInsensitiveRegex => ValueShape::Pattern,
            _ => ValueShape::Single,
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_all_lookups_are_used() {
        let exposed_lookups = enum_iterator::all::<ScalarType>()
            .flat_map(ScalarType::lookups)
            .collect::<BTreeSet<Lookup>>();

        for lookup in enum_iterator::all::<Lookup>() {
            assert!(
                exposed_lookups.contains(&lookup),
                "The lookup {lookup:?} is not supported by any type."
            );
        }
    }

    #[test]
    fn test_lookup_names_round_trip() {
        for lookup in enum_iterator::all::<Lookup>() {
            assert_eq!(Lookup::from_name(lookup.name()), Some(lookup));
        }
        assert_eq!(Lookup::from_name("eq"), Some(Lookup::Exact));
        assert_eq!(Lookup::from_name("year"), None);
    }

    #[test]
    fn test_booleans_only_support_equality() {
        assert_eq!(
            ScalarType::Boolean.lookups(),
            BTreeSet::from([Lookup::Exact, Lookup::In, Lookup::IsNull])
        );
        assert!(!ScalarType::Integer.supports(Lookup::CaseInsensitiveContains));
        assert!(ScalarType::Text.supports(Lookup::Regex));
    }
}
