//! The Schema Cost Builder (C2): a pure function from a parsed schema and
//! weight configuration to a [`TypeWeightTable`]. Traverses the schema
//! exactly once; the resulting table is then shared read-only for the
//! lifetime of the gateway.

use std::collections::HashMap;

use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::Schema;

use crate::config::WeightConfig;
use crate::error::SchemaError;

use super::types::lower;
use super::types::FieldDescriptor;
use super::types::ListWeight;
use super::types::MultiplierSpec;
use super::types::TypeWeightEntry;
use super::types::TypeWeightTable;
use super::union_reduction::reduce_union;

const SLICING_ARGS: [&str; 3] = ["first", "last", "limit"];

/// Build-time switches that aren't part of the five weight knobs but still
/// shape the table (`enforceBoundedLists`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub strict_unbounded_lists: bool,
}

/// Builds the immutable type-weight table from `schema` and `config`.
///
/// Fails with [`SchemaError::Config`] if any weight is negative,
/// [`SchemaError::UnsupportedType`] if a named type is not one of object,
/// interface, enum, union, scalar, or input object, and
/// [`SchemaError::UnboundedList`] (only in strict mode) if a list field has
/// neither a slicing argument nor a `@listCost` directive.
pub fn build(
    schema: &Schema,
    config: &WeightConfig,
    options: BuildOptions,
) -> Result<TypeWeightTable, SchemaError> {
    config.validate()?;

    // Pass 0: every object/interface/enum's base_weight, computed up front
    // so list multiplier specs can capture a composite element's
    // base_weight even when that element type is visited later in
    // iteration order (schema.types has no topological guarantee).
    let mut base_weights: HashMap<String, u64> = HashMap::new();
    for (name, extended_type) in schema.types.iter() {
        if name.as_str().starts_with("__") {
            continue;
        }
        match extended_type {
            ExtendedType::Object(_) | ExtendedType::Interface(_) => {
                base_weights.insert(lower(name.as_str()), root_base_weight(name.as_str(), config));
            }
            ExtendedType::Enum(_) => {
                base_weights.insert(lower(name.as_str()), config.scalar.max(0) as u64);
            }
            ExtendedType::Union(_) => {
                base_weights.insert(lower(name.as_str()), config.object.max(0) as u64);
            }
            ExtendedType::Scalar(_) | ExtendedType::InputObject(_) => {}
        }
    }

    let mut entries: HashMap<String, TypeWeightEntry> = HashMap::new();

    // Pass 1: objects, interfaces, enums get an entry. Unions are deferred
    // until every member's fields exist.
    for (name, extended_type) in schema.types.iter() {
        if name.as_str().starts_with("__") {
            continue;
        }
        match extended_type {
            ExtendedType::Object(object_type) => {
                let base_weight = base_weights[&lower(name.as_str())];
                let fields = build_fields(schema, &object_type.fields, config, options)?;
                entries.insert(lower(name.as_str()), TypeWeightEntry { base_weight, fields });
            }
            ExtendedType::Interface(interface_type) => {
                let base_weight = base_weights[&lower(name.as_str())];
                let fields = build_fields(schema, &interface_type.fields, config, options)?;
                entries.insert(lower(name.as_str()), TypeWeightEntry { base_weight, fields });
            }
            ExtendedType::Enum(_) => {
                entries.insert(
                    lower(name.as_str()),
                    TypeWeightEntry {
                        base_weight: base_weights[&lower(name.as_str())],
                        fields: HashMap::new(),
                    },
                );
            }
            ExtendedType::Union(_) => {
                // handled in pass 2, once every member has an entry.
            }
            ExtendedType::Scalar(_) | ExtendedType::InputObject(_) => {
                // Never present as entries: scalars contribute via field
                // weights, input objects never appear in selections.
            }
        }
    }

    // Pass 2: unions.
    for (name, extended_type) in schema.types.iter() {
        if name.as_str().starts_with("__") {
            continue;
        }
        if let ExtendedType::Union(union_type) = extended_type {
            let member_names: Vec<String> = union_type
                .members
                .iter()
                .map(|m| lower(m.as_str()))
                .collect();
            let fields = reduce_union(&member_names, &entries);
            entries.insert(
                lower(name.as_str()),
                TypeWeightEntry {
                    base_weight: base_weights[&lower(name.as_str())],
                    fields,
                },
            );
        }
    }

    // Every resolvesTo target must exist as a key in the table; check that
    // invariant now that every entry exists.
    for entry in entries.values() {
        for descriptor in entry.fields.values() {
            let resolves_to = match descriptor {
                FieldDescriptor::Object { resolves_to } => Some(resolves_to),
                FieldDescriptor::List { resolves_to, .. } => Some(resolves_to),
                FieldDescriptor::Scalar { .. } => None,
            };
            if let Some(target) = resolves_to {
                if !entries.contains_key(target) {
                    return Err(SchemaError::DanglingResolvesTo(target.clone()));
                }
            }
        }
    }

    Ok(TypeWeightTable::new(entries))
}

fn root_base_weight(type_name: &str, config: &WeightConfig) -> u64 {
    match type_name {
        "Query" => config.query.max(0) as u64,
        "Mutation" => config.mutation.max(0) as u64,
        _ => config.object.max(0) as u64,
    }
}

fn build_fields(
    schema: &Schema,
    fields: &apollo_compiler::collections::IndexMap<ast::Name, apollo_compiler::Node<FieldDefinition>>,
    config: &WeightConfig,
    options: BuildOptions,
) -> Result<HashMap<String, FieldDescriptor>, SchemaError> {
    let mut out = HashMap::new();
    for (field_name, field_def) in fields.iter() {
        let descriptor = classify_field(schema, field_def, config, options)?;
        out.insert(field_name.to_string(), descriptor);
    }
    Ok(out)
}

/// True if `type_name` names a scalar or enum in `schema` — the "free
/// element" case where a list of them shouldn't compound a weight.
fn is_scalar_or_enum(schema: &Schema, type_name: &str) -> bool {
    matches!(
        schema.types.get(type_name),
        Some(ExtendedType::Scalar(_)) | Some(ExtendedType::Enum(_))
    )
}

fn is_composite(schema: &Schema, type_name: &str) -> bool {
    matches!(
        schema.types.get(type_name),
        Some(ExtendedType::Object(_)) | Some(ExtendedType::Interface(_)) | Some(ExtendedType::Union(_))
    )
}

fn classify_field(
    schema: &Schema,
    field_def: &FieldDefinition,
    config: &WeightConfig,
    options: BuildOptions,
) -> Result<FieldDescriptor, SchemaError> {
    let ty = strip_one_non_null(&field_def.ty);

    if ty.is_list() {
        return classify_list_field(schema, field_def, &ty, config, options);
    }

    let target = ty.inner_named_type().as_str();
    if is_composite(schema, target) {
        return Ok(FieldDescriptor::Object { resolves_to: lower(target) });
    }
    if schema.types.contains_key(target) {
        return Ok(FieldDescriptor::Scalar { weight: config.scalar.max(0) as u64 });
    }
    Err(SchemaError::UnsupportedType(target.to_string()))
}

/// Strips a single non-null wrapper from `ty`: *at most one* layer is
/// removed before classification, regardless of how deeply nested the
/// non-null wrappers are underneath.
fn strip_one_non_null(ty: &ast::Type) -> ast::Type {
    match ty {
        ast::Type::NonNullNamed(name) => ast::Type::Named(name.clone()),
        ast::Type::NonNullList(inner) => ast::Type::List(inner.clone()),
        other => other.clone(),
    }
}

fn classify_list_field(
    schema: &Schema,
    field_def: &FieldDefinition,
    list_ty: &ast::Type,
    config: &WeightConfig,
    options: BuildOptions,
) -> Result<FieldDescriptor, SchemaError> {
    let element_name = list_ty.inner_named_type().as_str();
    let is_scalar_element = is_scalar_or_enum(schema, element_name);
    // A list of scalars/enums is priced per the `scalar` knob; a list of
    // objects/interfaces/unions — a connection over composite elements — is
    // priced per the `connection` knob rather than the singular `object`
    // weight those same types get when selected outside a list.
    let element_base_weight = if is_scalar_element {
        config.scalar.max(0) as u64
    } else {
        config.connection.max(0) as u64
    };

    if is_scalar_element && config.scalar == 0 {
        // Lists over free elements do not compound.
        return Ok(FieldDescriptor::List {
            resolves_to: lower(element_name),
            weight: ListWeight::Constant(0),
        });
    }

    if let Some(cost) = list_cost_directive(field_def) {
        return Ok(FieldDescriptor::List {
            resolves_to: lower(element_name),
            weight: ListWeight::Constant(cost),
        });
    }

    if let Some(arg_name) = SLICING_ARGS
        .iter()
        .find(|name| field_def.arguments.iter().any(|a| a.name.as_str() == **name))
    {
        let schema_default = field_def
            .arguments
            .iter()
            .find(|a| a.name.as_str() == *arg_name)
            .and_then(|a| a.default_value.as_ref())
            .and_then(|v| match v.as_ref() {
                ast::Value::Int(i) => i.try_to_i32().ok().map(i64::from),
                // An argument default that is itself a variable is ignored
                // at build time.
                _ => None,
            });
        return Ok(FieldDescriptor::List {
            resolves_to: lower(element_name),
            weight: ListWeight::Multiplier(MultiplierSpec {
                slicing_arg: arg_name,
                schema_default,
                element_base_weight,
            }),
        });
    }

    if options.strict_unbounded_lists {
        return Err(SchemaError::UnboundedList {
            type_name: field_def.name.to_string(),
            field_name: field_def.name.to_string(),
        });
    }

    // Non-strict mode: treat multiplier as 1 at analysis time. A
    // `MultiplierSpec` whose slicing argument never appears in any
    // operation always falls through `resolve_multiplier` to
    // `schema_default.unwrap_or(1)`, i.e. exactly 1.
    Ok(FieldDescriptor::List {
        resolves_to: lower(element_name),
        weight: ListWeight::Multiplier(MultiplierSpec {
            slicing_arg: "__unbounded__",
            schema_default: None,
            element_base_weight,
        }),
    })
}

fn list_cost_directive(field_def: &FieldDefinition) -> Option<u64> {
    let directive = field_def.directives.get("listCost")?;
    let cost = directive.specified_argument_by_name("cost")?;
    match cost.as_ref() {
        ast::Value::Int(i) => i.try_to_i32().ok().filter(|n| *n >= 0).map(|n| n as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::Schema;
    use pretty_assertions::assert_eq;

    fn table(schema_str: &str, config: WeightConfig, options: BuildOptions) -> TypeWeightTable {
        let schema = Schema::parse_and_validate(schema_str, "schema.graphqls").unwrap();
        build(&schema, &config, options).unwrap()
    }

    #[test]
    fn negative_config_is_rejected() {
        let schema = Schema::parse_and_validate("type Query { x: Int }", "s.graphqls").unwrap();
        let mut config = WeightConfig::default();
        config.object = -1;
        assert!(build(&schema, &config, BuildOptions::default()).is_err());
    }

    #[test]
    fn query_and_mutation_get_configured_weights() {
        let t = table(
            "type Query { scalars: Scalars } type Mutation { doThing: Int } type Scalars { num: Int }",
            WeightConfig::default(),
            BuildOptions::default(),
        );
        assert_eq!(t.get("query").unwrap().base_weight, 1);
        assert_eq!(t.get("mutation").unwrap().base_weight, 10);
        assert_eq!(t.get("scalars").unwrap().base_weight, 1);
    }

    #[test]
    fn introspection_types_are_skipped() {
        let t = table("type Query { x: Int }", WeightConfig::default(), BuildOptions::default());
        assert!(!t.contains("__Schema"));
    }

    #[test]
    fn connection_knob_sets_composite_list_element_base_weight() {
        let t = table(
            "type Query { items(first: Int = 2): [Item] } type Item { x: Int }",
            WeightConfig::default(),
            BuildOptions::default(),
        );
        let items = t.get("query").unwrap().fields.get("items").unwrap();
        match items {
            FieldDescriptor::List {
                weight: ListWeight::Multiplier(spec),
                ..
            } => assert_eq!(spec.element_base_weight, 2),
            other => panic!("expected a multiplier-weighted list field, got {other:?}"),
        }
    }

    #[test]
    fn connection_knob_does_not_affect_scalar_list_elements() {
        let mut config = WeightConfig::default();
        config.scalar = 1;
        let t = table(
            "type Query { names(first: Int = 2): [String] }",
            config,
            BuildOptions::default(),
        );
        let names = t.get("query").unwrap().fields.get("names").unwrap();
        match names {
            FieldDescriptor::List {
                weight: ListWeight::Multiplier(spec),
                ..
            } => assert_eq!(spec.element_base_weight, 1),
            other => panic!("expected a multiplier-weighted list field, got {other:?}"),
        }
    }
}
