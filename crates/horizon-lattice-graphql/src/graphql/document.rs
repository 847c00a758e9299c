//! Operation classification for GraphQL documents.
//!
//! Decides which transport a document must use and reduces a
//! multi-operation document to the single selected operation, together with
//! the fragments that operation spreads (directly or through other
//! fragments). Everything else is pruned so the transport only ever sees the
//! selected operation.

use std::collections::HashSet;

use graphql_parser::query::{
    Definition, Document, FragmentDefinition, OperationDefinition, Selection, SelectionSet,
    parse_query,
};

use super::request::OperationKind;
use crate::error::{ClientError, Result};

type Operation<'a> = OperationDefinition<'a, String>;
type Fragment<'a> = FragmentDefinition<'a, String>;

/// The outcome of classifying a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedDocument {
    /// Kind of the selected operation.
    pub kind: OperationKind,
    /// Name of the selected operation (`None` for anonymous operations).
    pub name: Option<String>,
    /// Printed document containing only the selected operation and the
    /// fragments it uses.
    pub document: String,
}

/// Classify `raw` and select one operation out of it.
///
/// - Several operations and no `selector`: [`ClientError::AmbiguousOperation`].
/// - A `selector` that names no operation: [`ClientError::OperationNotFound`],
///   also when the document holds a single operation with another name.
/// - Fragment definitions do not count as operations.
pub fn classify(raw: &str, selector: Option<&str>) -> Result<ClassifiedDocument> {
    let parsed: Document<'_, String> = parse_query(raw)?;

    let mut operations = Vec::new();
    let mut fragments = Vec::new();
    for definition in parsed.definitions {
        match definition {
            Definition::Operation(operation) => operations.push(operation),
            Definition::Fragment(fragment) => fragments.push(fragment),
        }
    }

    let selected = select(operations, selector)?;
    let kind = kind_of(&selected);
    let name = name_of(&selected).cloned();

    let used = referenced_fragments(&selected, &fragments);
    let mut definitions = vec![Definition::Operation(selected)];
    definitions.extend(
        fragments
            .into_iter()
            .filter(|fragment| used.contains(&fragment.name))
            .map(Definition::Fragment),
    );

    let reduced = Document { definitions };
    Ok(ClassifiedDocument {
        kind,
        name,
        document: reduced.to_string(),
    })
}

fn select<'a>(mut operations: Vec<Operation<'a>>, selector: Option<&str>) -> Result<Operation<'a>> {
    if operations.is_empty() {
        return Err(ClientError::NoOperation);
    }

    match selector {
        Some(wanted) => {
            let position = operations
                .iter()
                .position(|operation| name_of(operation).is_some_and(|name| name == wanted))
                .ok_or_else(|| ClientError::OperationNotFound {
                    name: wanted.to_string(),
                })?;
            Ok(operations.swap_remove(position))
        }
        None if operations.len() > 1 => Err(ClientError::AmbiguousOperation {
            count: operations.len(),
        }),
        None => Ok(operations.remove(0)),
    }
}

fn kind_of(operation: &Operation<'_>) -> OperationKind {
    match operation {
        OperationDefinition::SelectionSet(_) | OperationDefinition::Query(_) => {
            OperationKind::Query
        }
        OperationDefinition::Mutation(_) => OperationKind::Mutation,
        OperationDefinition::Subscription(_) => OperationKind::Subscription,
    }
}

fn name_of<'o>(operation: &'o Operation<'_>) -> Option<&'o String> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_ref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_ref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_ref(),
    }
}

fn selection_set_of<'o, 'a>(operation: &'o Operation<'a>) -> &'o SelectionSet<'a, String> {
    match operation {
        OperationDefinition::SelectionSet(set) => set,
        OperationDefinition::Query(query) => &query.selection_set,
        OperationDefinition::Mutation(mutation) => &mutation.selection_set,
        OperationDefinition::Subscription(subscription) => &subscription.selection_set,
    }
}

/// Names of all fragments reachable from `operation`.
fn referenced_fragments<'a>(operation: &Operation<'a>, fragments: &[Fragment<'a>]) -> HashSet<String> {
    let mut used = HashSet::new();
    let mut pending = vec![selection_set_of(operation)];

    while let Some(set) = pending.pop() {
        for item in &set.items {
            match item {
                Selection::Field(field) => pending.push(&field.selection_set),
                Selection::InlineFragment(inline) => pending.push(&inline.selection_set),
                Selection::FragmentSpread(spread) => {
                    if used.insert(spread.fragment_name.clone())
                        && let Some(fragment) =
                            fragments.iter().find(|f| f.name == spread.fragment_name)
                    {
                        pending.push(&fragment.selection_set);
                    }
                }
            }
        }
    }

    used
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation_names(document: &str) -> Vec<Option<String>> {
        let parsed: Document<'_, String> = parse_query(document).unwrap();
        parsed
            .definitions
            .iter()
            .filter_map(|d| match d {
                Definition::Operation(op) => Some(name_of(op).cloned()),
                Definition::Fragment(_) => None,
            })
            .collect()
    }

    fn fragment_names(document: &str) -> Vec<String> {
        let parsed: Document<'_, String> = parse_query(document).unwrap();
        parsed
            .definitions
            .iter()
            .filter_map(|d| match d {
                Definition::Fragment(f) => Some(f.name.clone()),
                Definition::Operation(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_single_operation_without_selector() {
        let classified = classify("subscription OnCreate { onCreate { id } }", None).unwrap();
        assert_eq!(classified.kind, OperationKind::Subscription);
        assert_eq!(classified.name.as_deref(), Some("OnCreate"));
    }

    #[test]
    fn test_single_operation_with_matching_selector() {
        let classified = classify("mutation AddUser { addUser { id } }", Some("AddUser")).unwrap();
        assert_eq!(classified.kind, OperationKind::Mutation);
        assert_eq!(classified.name.as_deref(), Some("AddUser"));
    }

    #[test]
    fn test_single_operation_with_other_selector() {
        let err = classify("query A { x }", Some("B")).unwrap_err();
        assert!(matches!(err, ClientError::OperationNotFound { ref name } if name == "B"));
    }

    #[test]
    fn test_anonymous_operations() {
        let classified = classify("{ users { id } }", None).unwrap();
        assert_eq!(classified.kind, OperationKind::Query);
        assert_eq!(classified.name, None);

        let classified = classify("subscription { onCreate { id } }", None).unwrap();
        assert_eq!(classified.kind, OperationKind::Subscription);

        let err = classify("{ users { id } }", Some("Users")).unwrap_err();
        assert!(matches!(err, ClientError::OperationNotFound { .. }));
    }

    #[test]
    fn test_multiple_operations_need_selector() {
        let err = classify("query A { x } query B { y }", None).unwrap_err();
        assert!(matches!(err, ClientError::AmbiguousOperation { count: 2 }));

        let err = classify("query A { x } mutation B { y } subscription C { z }", None).unwrap_err();
        assert!(matches!(err, ClientError::AmbiguousOperation { count: 3 }));
    }

    #[test]
    fn test_selects_and_prunes() {
        let classified = classify("query A { x } query B { y }", Some("B")).unwrap();
        assert_eq!(classified.kind, OperationKind::Query);
        assert_eq!(classified.name.as_deref(), Some("B"));
        assert_eq!(
            operation_names(&classified.document),
            vec![Some("B".to_string())]
        );
        assert!(classified.document.contains('y'));
        assert!(!classified.document.contains("query A"));
    }

    #[test]
    fn test_missing_operation_name() {
        let err = classify("query A { x } query B { y }", Some("C")).unwrap_err();
        assert!(matches!(err, ClientError::OperationNotFound { ref name } if name == "C"));
    }

    #[test]
    fn test_keeps_only_reachable_fragments() {
        let document = r#"
            query A { user { ...UserFields } }
            query B { post { ...PostFields } }
            fragment UserFields on User { id ...Avatar }
            fragment Avatar on User { avatarUrl }
            fragment PostFields on Post { title }
        "#;

        let classified = classify(document, Some("A")).unwrap();
        assert_eq!(
            operation_names(&classified.document),
            vec![Some("A".to_string())]
        );
        assert_eq!(
            fragment_names(&classified.document),
            vec!["UserFields".to_string(), "Avatar".to_string()]
        );
    }

    #[test]
    fn test_fragments_do_not_count_as_operations() {
        let document = r#"
            subscription OnPost { postAdded { ...PostFields } }
            fragment PostFields on Post { id }
        "#;
        let classified = classify(document, None).unwrap();
        assert_eq!(classified.kind, OperationKind::Subscription);
        assert_eq!(fragment_names(&classified.document), vec!["PostFields".to_string()]);
    }

    #[test]
    fn test_fragment_only_document() {
        let err = classify("fragment F on User { id }", None).unwrap_err();
        assert!(matches!(err, ClientError::NoOperation));
    }

    #[test]
    fn test_syntax_error() {
        let err = classify("query {", None).unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[test]
    fn test_reduced_document_reparses_to_same_classification() {
        let first = classify("query A { x } subscription B { y(id: 1) { z } }", Some("B")).unwrap();
        let second = classify(&first.document, None).unwrap();
        assert_eq!(first, second);
    }
}
