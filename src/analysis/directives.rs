//! `@skip`/`@include` evaluation. Every other directive
//! on a selection is ignored; this crate's cost model has no opinion on
//! `@defer` or federation directives.

use std::collections::HashMap;

use apollo_compiler::ast;

/// Returns `true` if the selection carrying `directives` should contribute
/// nothing to the running complexity: `@skip(if: true)` or
/// `@include(if: false)`, where the boolean is either a literal or resolved
/// from `variables`. A variable that is missing or not a JSON boolean is
/// treated as `false`, matching the "other directives are ignored" default
/// of leaving a selection in place unless explicitly pruned.
pub fn is_pruned(directives: &ast::DirectiveList, variables: &HashMap<String, serde_json::Value>) -> bool {
    if let Some(skip) = directives.get("skip") {
        if let Some(value) = skip.specified_argument_by_name("if") {
            if resolve_bool(&value, variables) {
                return true;
            }
        }
    }
    if let Some(include) = directives.get("include") {
        if let Some(value) = include.specified_argument_by_name("if") {
            if !resolve_bool(&value, variables) {
                return true;
            }
        }
    }
    false
}

fn resolve_bool(value: &ast::Value, variables: &HashMap<String, serde_json::Value>) -> bool {
    match value {
        ast::Value::Boolean(b) => *b,
        ast::Value::Variable(name) => variables
            .get(name.as_str())
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::ast::DirectiveList;

    fn directive_list(source: &str) -> DirectiveList {
        let doc = format!("query Q {{ field{source} }}");
        let parsed = ast::Document::parse(&doc, "test.graphql").expect("parse");
        for def in &parsed.definitions {
            if let ast::Definition::OperationDefinition(op) = def {
                if let Some(ast::Selection::Field(f)) = op.selection_set.first() {
                    return f.directives.clone();
                }
            }
        }
        DirectiveList::new()
    }

    fn empty_vars() -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    #[test]
    fn skip_true_prunes() {
        let directives = directive_list(" @skip(if: true)");
        assert!(is_pruned(&directives, &empty_vars()));
    }

    #[test]
    fn skip_false_keeps() {
        let directives = directive_list(" @skip(if: false)");
        assert!(!is_pruned(&directives, &empty_vars()));
    }

    #[test]
    fn include_false_prunes() {
        let directives = directive_list(" @include(if: false)");
        assert!(is_pruned(&directives, &empty_vars()));
    }

    #[test]
    fn variable_bound_skip_resolves_from_variables() {
        let directives = directive_list(" @skip(if: $cond)");
        let mut vars = empty_vars();
        vars.insert("cond".to_string(), serde_json::Value::Bool(true));
        assert!(is_pruned(&directives, &vars));
    }

    #[test]
    fn no_directives_never_pruned() {
        let directives = directive_list("");
        assert!(!is_pruned(&directives, &empty_vars()));
    }
}
