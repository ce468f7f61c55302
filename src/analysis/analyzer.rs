//! The operation analyzer (C3): walks a parsed, schema-validated operation
//! against a [`TypeWeightTable`] and returns its complexity and max depth,
//! following a `score_field`/`score_selection_set` dispatch pattern driven
//! entirely off the table rather than the live schema.

use std::collections::HashMap;

use apollo_compiler::ast;
use apollo_compiler::executable::ExecutableDocument;
use apollo_compiler::executable::Fragment;
use apollo_compiler::executable::FragmentSpread;
use apollo_compiler::executable::InlineFragment;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::Node;

use super::directives::is_pruned;
use super::types::AnalysisOutcome;
use super::types::FragmentCost;
use crate::cost_model::FieldDescriptor;
use crate::cost_model::ListWeight;
use crate::cost_model::TypeWeightTable;
use crate::error::AnalysisError;

/// Entry point for C3. `operation_name` selects which operation in the
/// document to analyze (`None` picks the anonymous operation, or the sole
/// named one if there's exactly one).
pub fn analyze(
    document: &ExecutableDocument,
    operation_name: Option<&str>,
    variables: &HashMap<String, serde_json::Value>,
    table: &TypeWeightTable,
) -> Result<AnalysisOutcome, AnalysisError> {
    let operation = document
        .operations
        .get(operation_name)
        .map_err(|_| AnalysisError::UnknownOperation(operation_name.unwrap_or("<anonymous>").to_string()))?;

    let mut analyzer = Analyzer {
        document,
        variables,
        table,
        fragment_cache: HashMap::new(),
        current_depth: 0,
        max_depth: 0,
    };
    analyzer.analyze_operation(operation)
}

struct Analyzer<'a> {
    document: &'a ExecutableDocument,
    variables: &'a HashMap<String, serde_json::Value>,
    table: &'a TypeWeightTable,
    fragment_cache: HashMap<String, FragmentCost>,
    current_depth: u32,
    max_depth: u32,
}

fn operation_kind_name(operation: &Operation) -> &'static str {
    match operation.operation_type {
        ast::OperationType::Query => "query",
        ast::OperationType::Mutation => "mutation",
        ast::OperationType::Subscription => "subscription",
    }
}

impl<'a> Analyzer<'a> {
    fn analyze_operation(&mut self, operation: &Node<Operation>) -> Result<AnalysisOutcome, AnalysisError> {
        let root_type = operation_kind_name(operation);
        let Some(entry) = self.table.get(root_type) else {
            return Ok(AnalysisOutcome::default());
        };

        self.current_depth = 1;
        self.max_depth = 1;
        let selection_cost = self.score_selection_set(&operation.selection_set, root_type)?;

        Ok(AnalysisOutcome {
            complexity: entry.base_weight.saturating_add(selection_cost),
            max_depth: self.max_depth,
        })
    }

    /// Analyzes a fragment definition on first spread and caches the result,
    /// achieving the same effect as sorting fragment definitions ahead of
    /// operations without needing to reorder anything.
    fn fragment_cost(&mut self, name: &str) -> Result<FragmentCost, AnalysisError> {
        if let Some(cached) = self.fragment_cache.get(name) {
            return Ok(*cached);
        }
        let fragment: Node<Fragment> = self
            .document
            .fragments
            .get(name)
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownFragment(name.to_string()))?;

        // Measure the fragment's selection set as though it were its own
        // root, then offset by one so a spread site doesn't double-count
        // the nesting level it already contributes.
        let saved_depth = self.current_depth;
        let saved_max = self.max_depth;
        self.current_depth = 1;
        self.max_depth = 1;

        let type_condition = fragment.type_condition().as_str().to_string();
        let complexity = self.score_selection_set(&fragment.selection_set, &type_condition)?;
        let local_max_depth = self.max_depth;

        self.current_depth = saved_depth;
        self.max_depth = saved_max;

        let cost = FragmentCost {
            complexity,
            depth_contribution: local_max_depth.saturating_sub(1),
        };
        self.fragment_cache.insert(name.to_string(), cost);
        Ok(cost)
    }

    fn score_selection_set(&mut self, selection_set: &SelectionSet, parent_type: &str) -> Result<u64, AnalysisError> {
        let mut total: u64 = 0;
        let mut typed_inline_max: Option<u64> = None;

        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if is_pruned(&field.directives, self.variables) {
                        continue;
                    }
                    total = total.saturating_add(self.score_field(field, parent_type)?);
                }
                Selection::FragmentSpread(spread) => {
                    if is_pruned(&spread.directives, self.variables) {
                        continue;
                    }
                    total = total.saturating_add(self.score_fragment_spread(spread)?);
                }
                Selection::InlineFragment(inline) => {
                    if is_pruned(&inline.directives, self.variables) {
                        continue;
                    }
                    let cost = self.score_inline_fragment(inline, parent_type)?;
                    match &inline.type_condition {
                        None => total = total.saturating_add(cost),
                        Some(_) => {
                            typed_inline_max = Some(match typed_inline_max {
                                Some(existing) => existing.max(cost),
                                None => cost,
                            });
                        }
                    }
                }
            }
        }

        if let Some(max_cost) = typed_inline_max {
            total = total.saturating_add(max_cost);
        }
        Ok(total)
    }

    fn score_field(&mut self, field: &apollo_compiler::executable::Field, parent_type: &str) -> Result<u64, AnalysisError> {
        if field.name.as_str() == "__typename" {
            return Ok(0);
        }

        let Some(entry) = self.table.get(parent_type) else {
            return Err(AnalysisError::UnknownField {
                type_name: parent_type.to_string(),
                field_name: field.name.to_string(),
            });
        };
        let Some(descriptor) = entry.fields.get(field.name.as_str()) else {
            return Err(AnalysisError::UnknownField {
                type_name: parent_type.to_string(),
                field_name: field.name.to_string(),
            });
        };

        match descriptor.clone() {
            FieldDescriptor::Scalar { weight } => Ok(weight),
            FieldDescriptor::Object { resolves_to } => {
                let target_base = self.table.get(&resolves_to).map(|e| e.base_weight).unwrap_or(0);
                self.enter_selection();
                let inner = self.score_selection_set(&field.selection_set, &resolves_to);
                self.exit_selection();
                Ok(target_base.saturating_add(inner?))
            }
            FieldDescriptor::List { resolves_to, weight } => {
                self.enter_selection();
                let inner = self.score_selection_set(&field.selection_set, &resolves_to);
                self.exit_selection();
                let inner_cost = inner?;
                Ok(match weight {
                    ListWeight::Constant(n) => n.saturating_add(inner_cost),
                    ListWeight::Multiplier(spec) => spec.evaluate(&field.arguments, self.variables, inner_cost),
                })
            }
        }
    }

    fn score_fragment_spread(&mut self, spread: &Node<FragmentSpread>) -> Result<u64, AnalysisError> {
        let cost = self.fragment_cost(spread.fragment_name.as_str())?;
        let depth_before = self.current_depth;
        self.current_depth = depth_before.saturating_add(cost.depth_contribution);
        self.max_depth = self.max_depth.max(self.current_depth);
        self.current_depth = depth_before;
        Ok(cost.complexity)
    }

    fn score_inline_fragment(&mut self, inline: &Node<InlineFragment>, parent_type: &str) -> Result<u64, AnalysisError> {
        let target_type = inline
            .type_condition
            .as_ref()
            .map(|t| t.as_str())
            .unwrap_or(parent_type);
        // The depth increment a selection normally carries is immediately
        // negated for inline fragments: they don't
        // introduce a nesting level of their own.
        self.score_selection_set(&inline.selection_set, target_type)
    }

    fn enter_selection(&mut self) {
        self.current_depth += 1;
        self.max_depth = self.max_depth.max(self.current_depth);
    }

    fn exit_selection(&mut self) {
        self.current_depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightConfig;
    use crate::cost_model::build;
    use crate::cost_model::BuildOptions;
    use apollo_compiler::Schema;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"
        type Query {
            hero(episode: String): Character
            heroes(first: Int = 3): [Character]
            unbounded: [Character] @listCost(cost: 5)
        }
        type Character {
            name: String
            friends(first: Int): [Character]
            appearsIn: [String]
        }
        schema { query: Query }
    "#;

    fn build_table() -> TypeWeightTable {
        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphqls").unwrap();
        build(&schema, &WeightConfig::default(), BuildOptions::default()).unwrap()
    }

    fn analyze_str(query: &str) -> AnalysisOutcome {
        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphqls").unwrap();
        let document = ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let table = build_table();
        analyze(&document, None, &HashMap::new(), &table).unwrap()
    }

    #[test]
    fn scalar_only_query_costs_base_weight_only() {
        let outcome = analyze_str("query { hero { name } }");
        assert_eq!(outcome.complexity, 1 + 1);
        assert_eq!(outcome.max_depth, 2);
    }

    #[test]
    fn list_with_slicing_argument_multiplies_inner_cost() {
        let outcome = analyze_str("query { heroes(first: 2) { name friends(first: 3) { name } } }");
        // heroes: query.base(1) + heroes(2 * (friends_cost))
        // friends_cost per hero = 1 (Character base) + 3 * (name=0) = 1
        // heroes total = 2 * 1 = 2
        assert_eq!(outcome.complexity, 1 + 2);
    }

    #[test]
    fn list_cost_directive_is_constant() {
        let outcome = analyze_str("query { unbounded { name } }");
        assert_eq!(outcome.complexity, 1 + 5);
    }

    #[test]
    fn typename_is_free() {
        let outcome = analyze_str("query { hero { __typename name } }");
        assert_eq!(outcome.complexity, 1 + 1);
    }

    #[test]
    fn skip_directive_prunes_subtree() {
        let outcome = analyze_str("query { hero { name friends(first: 2) @skip(if: true) { name } } }");
        assert_eq!(outcome.complexity, 1 + 1);
    }

    #[test]
    fn fragment_spread_is_cached_and_depth_offset() {
        let outcome = analyze_str(
            "query { hero { ...nameFrag } } fragment nameFrag on Character { name }",
        );
        assert_eq!(outcome.complexity, 1 + 1);
        assert_eq!(outcome.max_depth, 2);
    }

    #[test]
    fn unknown_field_is_rejected() {
        // Build the weight table from a narrower schema so the operation
        // parses and validates fine against the full schema, but `friends`
        // has no entry under `character` in the table the analyzer walks.
        let narrow_schema_src = r#"
            type Query { hero(episode: String): Character }
            type Character { name: String }
            schema { query: Query }
        "#;
        let narrow_schema = Schema::parse_and_validate(narrow_schema_src, "narrow.graphqls").unwrap();
        let table = build(&narrow_schema, &WeightConfig::default(), BuildOptions::default()).unwrap();

        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphqls").unwrap();
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            "query { hero { name friends(first: 1) { name } } }",
            "query.graphql",
        )
        .unwrap();

        let err = analyze(&document, None, &HashMap::new(), &table).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::UnknownField { ref type_name, ref field_name }
                if type_name == "character" && field_name == "friends"
        ));
    }

    #[test]
    fn union_typed_field_resolves_through_reduced_entry() {
        let schema_src = r#"
            union HeroUnion = Human | Droid
            type Human { name: String }
            type Droid { name: String }
            type Query { heroUnion(episode: String): HeroUnion }
            schema { query: Query }
        "#;
        let schema = Schema::parse_and_validate(schema_src, "schema.graphqls").unwrap();
        let table = build(&schema, &WeightConfig::default(), BuildOptions::default()).unwrap();
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            r#"query { heroUnion(episode: "EMPIRE") { name } }"#,
            "query.graphql",
        )
        .unwrap();
        let outcome = analyze(&document, None, &HashMap::new(), &table).unwrap();
        // query base(1) + heroUnion: union base(1) + name(0) = 2
        assert_eq!(outcome.complexity, 2);
    }

    #[test]
    fn inline_fragment_untyped_is_additive_typed_is_max() {
        let schema_src = r#"
            interface Character { name: String }
            type Human implements Character { name: String homePlanet: String }
            type Droid implements Character { name: String primaryFunction: String }
            type Query { hero: Character }
            schema { query: Query }
        "#;
        let schema = Schema::parse_and_validate(schema_src, "schema.graphqls").unwrap();
        let table = build(&schema, &WeightConfig::default(), BuildOptions::default()).unwrap();
        let query = r#"
            query {
                hero {
                    name
                    ... on Human { homePlanet }
                    ... on Droid { primaryFunction }
                }
            }
        "#;
        let document = ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let outcome = analyze(&document, None, &HashMap::new(), &table).unwrap();
        // hero base(1) + name(0) + max(homePlanet=0, primaryFunction=0) = 1
        assert_eq!(outcome.complexity, 1);
    }

    #[test]
    fn slicing_argument_variable_is_resolved_from_bindings() {
        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphqls").unwrap();
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            "query($n: Int) { heroes(first: $n) { name } }",
            "query.graphql",
        )
        .unwrap();
        let table = build_table();
        let variables = maplit::hashmap! { "n".to_string() => serde_json::json!(4) };
        let outcome = analyze(&document, None, &variables, &table).unwrap();
        // query base(1) + heroes: 4 * (name(0) + Character base(1)) = 4
        assert_eq!(outcome.complexity, 1 + 4);
    }
}
