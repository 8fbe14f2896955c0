use rusqlite::types::Value;

use crate::error::PathwayError;

/// How a filter key matches its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Column value is one of the given values.
    AnyOf,
    /// Column contains the given text, ignoring ASCII case.
    Contains,
}

/// A named predicate a record kind accepts.
#[derive(Debug, Clone, Copy)]
pub struct FilterField {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: MatchKind,
    pub normalize: fn(&str) -> Result<String, PathwayError>,
}

impl FilterField {
    pub const fn any_of(key: &'static str, column: &'static str) -> Self {
        Self {
            key,
            column,
            kind: MatchKind::AnyOf,
            normalize: trimmed,
        }
    }

    pub const fn contains(key: &'static str, column: &'static str) -> Self {
        Self {
            key,
            column,
            kind: MatchKind::Contains,
            normalize: trimmed,
        }
    }

    pub const fn normalized(mut self, normalize: fn(&str) -> Result<String, PathwayError>) -> Self {
        self.normalize = normalize;
        self
    }
}

pub fn trimmed(value: &str) -> Result<String, PathwayError> {
    Ok(value.trim().to_string())
}

pub fn uppercased(value: &str) -> Result<String, PathwayError> {
    Ok(value.trim().to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    AnyOf(Vec<String>),
    Contains(String),
}

/// Filter criteria: named predicates combined with AND.
///
/// Keys are checked against the record kind when the query runs, so an
/// unknown key fails with [`PathwayError::Validation`] instead of being ignored.
/// An empty value list or empty substring constrains nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    predicates: Vec<(String, Predicate)>,
    limit: Option<usize>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any_of<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.predicates
            .push((key.to_string(), Predicate::AnyOf(values)));
        self
    }

    pub fn contains(mut self, key: &str, text: impl Into<String>) -> Self {
        self.predicates
            .push((key.to_string(), Predicate::Contains(text.into())));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn predicates(&self) -> &[(String, Predicate)] {
        &self.predicates
    }

    /// Builds criteria from `key=value` pairs, splitting set values on commas.
    pub fn from_pairs<S: AsRef<str>>(
        fields: &[FilterField],
        pairs: &[S],
    ) -> Result<Self, PathwayError> {
        let mut criteria = Criteria::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                PathwayError::Validation(format!("expected key=value, got `{pair}`"))
            })?;
            let field = lookup_field(fields, key.trim())?;
            criteria = match field.kind {
                MatchKind::AnyOf => criteria.any_of(
                    field.key,
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty()),
                ),
                MatchKind::Contains => criteria.contains(field.key, value.trim()),
            };
        }
        Ok(criteria)
    }
}

fn lookup_field<'a>(fields: &'a [FilterField], key: &str) -> Result<&'a FilterField, PathwayError> {
    fields.iter().find(|field| field.key == key).ok_or_else(|| {
        let known = fields
            .iter()
            .map(|field| field.key)
            .collect::<Vec<_>>()
            .join(", ");
        PathwayError::Validation(format!("unknown filter key `{key}`; expected one of: {known}"))
    })
}

/// SQL `WHERE` fragment plus its bound parameters.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn compile(fields: &[FilterField], criteria: &Criteria) -> Result<WhereClause, PathwayError> {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for (key, predicate) in &criteria.predicates {
        let field = lookup_field(fields, key)?;
        match (field.kind, predicate) {
            (MatchKind::AnyOf, Predicate::AnyOf(values)) => {
                if values.is_empty() {
                    continue;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                conditions.push(format!("{} IN ({placeholders})", field.column));
                for value in values {
                    params.push(Value::Text((field.normalize)(value)?));
                }
            }
            (MatchKind::Contains, Predicate::Contains(text)) => {
                let text = (field.normalize)(text)?;
                if text.is_empty() {
                    continue;
                }
                conditions.push(format!("{} LIKE ? ESCAPE '\\'", field.column));
                params.push(Value::Text(format!("%{}%", escape_like(&text))));
            }
            (MatchKind::AnyOf, Predicate::Contains(_)) => {
                return Err(PathwayError::Validation(format!(
                    "`{key}` matches exact values; pass a list instead of a substring"
                )));
            }
            (MatchKind::Contains, Predicate::AnyOf(_)) => {
                return Err(PathwayError::Validation(format!(
                    "`{key}` is a substring match; pass a single text value"
                )));
            }
        }
    }

    let sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Ok(WhereClause { sql, params })
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const FIELDS: &[FilterField] = &[
        FilterField::any_of("gene_symbols", "gene_symbol"),
        FilterField::contains("pathway_name", "pathway_name"),
    ];

    #[test]
    fn compiles_and_combined_predicates() {
        let criteria = Criteria::new()
            .any_of("gene_symbols", ["TP53", "BRCA1"])
            .contains("pathway_name", "cancer");
        let clause = compile(FIELDS, &criteria).unwrap();
        assert_eq!(
            clause.sql,
            " WHERE gene_symbol IN (?, ?) AND pathway_name LIKE ? ESCAPE '\\'"
        );
        assert_eq!(clause.params.len(), 3);
    }

    #[test]
    fn empty_values_constrain_nothing() {
        let criteria = Criteria::new()
            .any_of("gene_symbols", Vec::<String>::new())
            .contains("pathway_name", "  ");
        let clause = compile(FIELDS, &criteria).unwrap();
        assert!(clause.sql.is_empty());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let criteria = Criteria::new().any_of("pathway", ["x"]);
        assert_matches!(compile(FIELDS, &criteria), Err(PathwayError::Validation(_)));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn pairs_split_set_values() {
        let criteria =
            Criteria::from_pairs(FIELDS, &["gene_symbols=TP53, EGFR", "pathway_name=Cell cycle"])
                .unwrap();
        assert_eq!(
            criteria.predicates()[0].1,
            Predicate::AnyOf(vec!["TP53".to_string(), "EGFR".to_string()])
        );
        assert_eq!(
            criteria.predicates()[1].1,
            Predicate::Contains("Cell cycle".to_string())
        );
    }
}
