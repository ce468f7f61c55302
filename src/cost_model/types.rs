//! The immutable in-memory cost model (C1): a type-weight table keyed by
//! lowercased type name, and the descriptors each field in that table
//! carries. Built once by [`super::builder::build`] and never mutated
//! afterwards — analyzers only ever read it.

use std::collections::HashMap;

use apollo_compiler::ast;
use apollo_compiler::Node;

/// How a list field's weight is computed: a plain tagged variant rather
/// than a boxed closure, so `evaluate` stays a pure function of the
/// operation's arguments and variables.
#[derive(Debug, Clone, PartialEq)]
pub enum ListWeight {
    /// A constant weight, from a `@listCost(cost: N)` directive.
    Constant(u64),
    /// A bounded multiplier resolved from a slicing argument at analysis time.
    Multiplier(MultiplierSpec),
}

/// Captures everything needed to evaluate a list field's multiplier at
/// analysis time without re-walking the schema: which argument is the
/// slicing bound, its schema-declared default, and the per-element base
/// weight to add atop the inner selection cost.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplierSpec {
    pub slicing_arg: &'static str,
    pub schema_default: Option<i64>,
    pub element_base_weight: u64,
}

/// The three shapes a field can take.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDescriptor {
    /// A scalar, enum, or otherwise leaf field with a constant weight.
    Scalar { weight: u64 },
    /// A single (non-list) object/interface/enum/union field.
    Object { resolves_to: String },
    /// A list field; `weight` is either a constant `@listCost` or a
    /// multiplier resolved from a slicing argument.
    List { resolves_to: String, weight: ListWeight },
}

impl MultiplierSpec {
    /// Resolves the multiplier for this list field given the operation's
    /// arguments and variables, in priority order:
    /// literal argument value, then its variable binding, then the schema
    /// default, then 1.
    pub fn resolve_multiplier(
        &self,
        args: &[Node<ast::Argument>],
        variables: &HashMap<String, serde_json::Value>,
    ) -> i64 {
        let Some(arg) = args.iter().find(|a| a.name.as_str() == self.slicing_arg) else {
            return self.schema_default.unwrap_or(1);
        };
        if let Some(n) = int_literal(&arg.value) {
            return n;
        }
        if let ast::Value::Variable(name) = arg.value.as_ref() {
            if let Some(n) = variables.get(name.as_str()).and_then(json_as_i64) {
                return n;
            }
        }
        self.schema_default.unwrap_or(1)
    }

    /// Evaluates `multiplier * (innerCost + perElementBaseWeight)`.
    pub fn evaluate(
        &self,
        args: &[Node<ast::Argument>],
        variables: &HashMap<String, serde_json::Value>,
        inner_cost: u64,
    ) -> u64 {
        let multiplier = self.resolve_multiplier(args, variables).max(0) as u64;
        multiplier.saturating_mul(inner_cost.saturating_add(self.element_base_weight))
    }
}

impl ListWeight {
    pub fn evaluate(
        &self,
        args: &[Node<ast::Argument>],
        variables: &HashMap<String, serde_json::Value>,
        inner_cost: u64,
    ) -> u64 {
        match self {
            ListWeight::Constant(n) => n.saturating_add(inner_cost),
            ListWeight::Multiplier(spec) => spec.evaluate(args, variables, inner_cost),
        }
    }
}

fn int_literal(value: &ast::Value) -> Option<i64> {
    match value {
        ast::Value::Int(i) => i.try_to_i32().ok().map(i64::from),
        _ => None,
    }
}

fn json_as_i64(value: &serde_json::Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// One entry in the [`TypeWeightTable`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeWeightEntry {
    pub base_weight: u64,
    pub fields: HashMap<String, FieldDescriptor>,
}

/// The immutable cost model produced by the schema cost builder (C2) and
/// consumed by the operation analyzer (C3). Keys are lowercased type names.
#[derive(Debug, Clone, Default)]
pub struct TypeWeightTable {
    entries: HashMap<String, TypeWeightEntry>,
}

impl TypeWeightTable {
    pub(crate) fn new(entries: HashMap<String, TypeWeightEntry>) -> Self {
        TypeWeightTable { entries }
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeWeightEntry> {
        self.entries.get(&type_name.to_ascii_lowercase())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(&type_name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn lower(name: &str) -> String {
    name.to_ascii_lowercase()
}
