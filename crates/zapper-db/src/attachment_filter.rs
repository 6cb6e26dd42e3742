//! SQL generation for [`AttachmentFilter`] queries.
//!
//! The builder turns a filter into a WHERE fragment over the `attachment a`
//! alias plus the parameters in binding order. Callers append the keyset
//! and limit parameters themselves.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use zapper_core::AttachmentFilter;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
    Timestamp(DateTime<Utc>),
    String(String),
    StringArray(Vec<String>),
}

/// Generates the WHERE clause for an attachment filter.
///
/// # Example
///
/// ```rust,ignore
/// let filter = AttachmentFilter::new().with_state(AttachmentState::Deleted);
/// let (sql, params) = AttachmentFilterQueryBuilder::new(&filter, 0).build();
/// // sql: "a.state = ANY($1::text[])"
/// ```
pub struct AttachmentFilterQueryBuilder<'a> {
    filter: &'a AttachmentFilter,
    param_offset: usize,
}

impl<'a> AttachmentFilterQueryBuilder<'a> {
    /// `param_offset` is the number of parameters already in the query.
    pub fn new(filter: &'a AttachmentFilter, param_offset: usize) -> Self {
        Self {
            filter,
            param_offset,
        }
    }

    /// Build the WHERE fragment. An empty filter yields `TRUE`.
    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        let mut idx = self.param_offset;

        if let Some(contexts) = &self.filter.contexts {
            if contexts.is_empty() {
                return ("FALSE".to_string(), vec![]);
            }
            let kinds = contexts.iter().map(|c| c.kind.to_string()).collect();
            let ids = contexts.iter().map(|c| c.id).collect();
            clauses.push(format!(
                "(a.context_type, a.context_id) IN (SELECT * FROM UNNEST(${}::text[], ${}::uuid[]))",
                idx + 1,
                idx + 2
            ));
            idx += 2;
            params.push(QueryParam::StringArray(kinds));
            params.push(QueryParam::UuidArray(ids));
        }

        if let Some(kind) = self.filter.context_kind {
            idx += 1;
            clauses.push(format!("a.context_type = ${}", idx));
            params.push(QueryParam::String(kind.to_string()));
        }

        if let Some(states) = &self.filter.states {
            idx += 1;
            clauses.push(format!("a.state = ANY(${}::text[])", idx));
            params.push(QueryParam::StringArray(
                states.iter().map(|s| s.to_string()).collect(),
            ));
        }

        if let Some(excluded) = &self.filter.exclude_states {
            idx += 1;
            clauses.push(format!("a.state <> ALL(${}::text[])", idx));
            params.push(QueryParam::StringArray(
                excluded.iter().map(|s| s.to_string()).collect(),
            ));
        }

        if let Some(name) = &self.filter.display_name {
            idx += 1;
            clauses.push(format!("a.display_name = ${}", idx));
            params.push(QueryParam::String(name.clone()));
        }

        if let Some(cutoff) = self.filter.created_before {
            idx += 1;
            clauses.push(format!("a.created_at < ${}", idx));
            params.push(QueryParam::Timestamp(cutoff));
        }

        if let Some(cutoff) = self.filter.deleted_before {
            idx += 1;
            clauses.push(format!("a.deleted_at < ${}", idx));
            params.push(QueryParam::Timestamp(cutoff));
        }

        if clauses.is_empty() {
            ("TRUE".to_string(), params)
        } else {
            (clauses.join(" AND "), params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapper_core::{AttachmentState, ContextKind, ContextRef};

    #[test]
    fn test_empty_filter_is_true() {
        let filter = AttachmentFilter::new();
        let (sql, params) = AttachmentFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_context_set_matches_nothing() {
        let filter = AttachmentFilter::new().in_contexts(vec![]);
        let (sql, params) = AttachmentFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_submission_export_filter() {
        let filter = AttachmentFilter::new()
            .of_kind(ContextKind::Assignment)
            .with_state(AttachmentState::Zipped)
            .named("submissions.zip")
            .created_before(Utc::now());
        let (sql, params) = AttachmentFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(
            sql,
            "a.context_type = $1 AND a.state = ANY($2::text[]) AND a.display_name = $3 AND a.created_at < $4"
        );
        assert_eq!(params.len(), 4);
        assert_eq!(params[0], QueryParam::String("Assignment".into()));
        assert_eq!(params[1], QueryParam::StringArray(vec!["zipped".into()]));
    }

    #[test]
    fn test_contexts_use_two_parallel_arrays() {
        let course = Uuid::now_v7();
        let group = Uuid::now_v7();
        let filter = AttachmentFilter::new()
            .in_contexts(vec![
                ContextRef::course(course),
                ContextRef::new(ContextKind::Group, group),
            ])
            .without_state(AttachmentState::Zipped);
        let (sql, params) = AttachmentFilterQueryBuilder::new(&filter, 1).build();
        assert!(sql.starts_with("(a.context_type, a.context_id) IN (SELECT * FROM UNNEST($2::text[], $3::uuid[]))"));
        assert!(sql.ends_with("a.state <> ALL($4::text[])"));
        assert_eq!(
            params[0],
            QueryParam::StringArray(vec!["Course".into(), "Group".into()])
        );
        assert_eq!(params[1], QueryParam::UuidArray(vec![course, group]));
    }
}
