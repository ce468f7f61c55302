//! Union field intersection: a union's entry gets
//! only the fields shared, by name and structurally equal output type,
//! across every member. Implemented as a small pure predicate over
//! already-built entries rather than re-walking the schema.

use std::collections::HashMap;

use super::types::FieldDescriptor;
use super::types::TypeWeightEntry;

/// The output-type shape of a field, ignoring everything about *how* its
/// weight is computed. Two fields of type `[Character]` are the same shape
/// whether one slices with `first` and the other with `last`, or their
/// schema defaults differ — those are cost-evaluation details, not part of
/// the GraphQL output type, and Testable Property 6 excludes them from
/// union field-sharing equality.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldShape {
    Scalar,
    Object(String),
    List(String),
}

fn shape_of(descriptor: &FieldDescriptor) -> FieldShape {
    match descriptor {
        FieldDescriptor::Scalar { .. } => FieldShape::Scalar,
        FieldDescriptor::Object { resolves_to } => FieldShape::Object(resolves_to.clone()),
        FieldDescriptor::List { resolves_to, .. } => FieldShape::List(resolves_to.clone()),
    }
}

/// Computes the field intersection across `member_names` (already-lowercased
/// keys into `entries`). A field is shared if every member has a field of
/// the same name whose [`FieldShape`] matches — same named type, same
/// scalar/object/list wrapper — regardless of slicing-argument name, schema
/// default, or any other multiplier detail. The surviving descriptor kept
/// for each shared field is whichever member happens to be first; its
/// weight-evaluation details are equivalent to every other member's by
/// construction of the shape check.
pub fn reduce_union(
    member_names: &[String],
    entries: &HashMap<String, TypeWeightEntry>,
) -> HashMap<String, FieldDescriptor> {
    let mut members = member_names.iter().filter_map(|name| entries.get(name));

    let Some(first) = members.next() else {
        return HashMap::new();
    };

    let mut shared: HashMap<String, FieldDescriptor> = first.fields.clone();

    for member in members {
        shared.retain(|field_name, descriptor| {
            member
                .fields
                .get(field_name)
                .is_some_and(|other| shape_of(other) == shape_of(descriptor))
        });
    }

    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn entry(fields: &[(&str, FieldDescriptor)]) -> TypeWeightEntry {
        TypeWeightEntry {
            base_weight: 1,
            fields: fields.iter().cloned().map(|(n, d)| (n.to_string(), d)).collect(),
        }
    }

    #[test]
    fn shared_field_with_identical_type_survives() {
        let mut entries = HashMap::new();
        entries.insert(
            "human".to_string(),
            entry(&[("name", FieldDescriptor::Scalar { weight: 0 })]),
        );
        entries.insert(
            "droid".to_string(),
            entry(&[("name", FieldDescriptor::Scalar { weight: 0 })]),
        );
        let reduced = reduce_union(&["human".to_string(), "droid".to_string()], &entries);
        assert_eq!(reduced.get("name"), Some(&FieldDescriptor::Scalar { weight: 0 }));
    }

    #[test]
    fn field_with_mismatched_type_is_dropped() {
        let mut entries = HashMap::new();
        entries.insert(
            "human".to_string(),
            entry(&[("home", FieldDescriptor::Scalar { weight: 0 })]),
        );
        entries.insert(
            "droid".to_string(),
            entry(&[("home", FieldDescriptor::Object { resolves_to: "planet".into() })]),
        );
        let reduced = reduce_union(&["human".to_string(), "droid".to_string()], &entries);
        assert!(!reduced.contains_key("home"));
    }

    #[test]
    fn shared_list_field_with_different_slicing_arg_still_survives() {
        use super::super::types::ListWeight;
        use super::super::types::MultiplierSpec;

        let mut entries = HashMap::new();
        entries.insert(
            "human".to_string(),
            entry(&[(
                "friends",
                FieldDescriptor::List {
                    resolves_to: "character".into(),
                    weight: ListWeight::Multiplier(MultiplierSpec {
                        slicing_arg: "first",
                        schema_default: Some(3),
                        element_base_weight: 1,
                    }),
                },
            )]),
        );
        entries.insert(
            "droid".to_string(),
            entry(&[(
                "friends",
                FieldDescriptor::List {
                    resolves_to: "character".into(),
                    weight: ListWeight::Multiplier(MultiplierSpec {
                        slicing_arg: "last",
                        schema_default: None,
                        element_base_weight: 1,
                    }),
                },
            )]),
        );
        let reduced = reduce_union(&["human".to_string(), "droid".to_string()], &entries);
        assert!(
            reduced.contains_key("friends"),
            "fields with the same name and output type must be shared regardless of slicing-argument name or default"
        );
    }

    #[test]
    fn field_only_on_one_member_is_dropped() {
        let mut entries = HashMap::new();
        entries.insert(
            "human".to_string(),
            entry(&[
                ("name", FieldDescriptor::Scalar { weight: 0 }),
                ("homePlanet", FieldDescriptor::Scalar { weight: 0 }),
            ]),
        );
        entries.insert("droid".to_string(), entry(&[("name", FieldDescriptor::Scalar { weight: 0 })]));
        let reduced = reduce_union(&["human".to_string(), "droid".to_string()], &entries);
        assert!(reduced.contains_key("name"));
        assert!(!reduced.contains_key("homePlanet"));
    }

    #[test]
    fn reduced_field_set_matches_expected_keys() {
        let mut entries = HashMap::new();
        entries.insert(
            "human".to_string(),
            entry(&[
                ("name", FieldDescriptor::Scalar { weight: 0 }),
                ("homePlanet", FieldDescriptor::Scalar { weight: 0 }),
            ]),
        );
        entries.insert(
            "droid".to_string(),
            entry(&[
                ("name", FieldDescriptor::Scalar { weight: 0 }),
                ("primaryFunction", FieldDescriptor::Scalar { weight: 0 }),
            ]),
        );
        let mut keys: Vec<&str> = reduce_union(&["human".to_string(), "droid".to_string()], &entries)
            .keys()
            .map(|s| s.as_str())
            .collect();
        keys.sort();
        insta::assert_snapshot!(keys.join(","), @"name");
    }
}
