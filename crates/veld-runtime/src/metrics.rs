//! Read-time query builders for metrics views.
//!
//! These render a single SELECT plus bound parameters from a declarative
//! request. All validation happens here, before anything touches the
//! engine: unknown measures and filter dimensions, or a time range against
//! a view with no time dimension, fail fast with a validation error.
//! Values never appear inline in the rendered SQL; only identifiers (quoted
//! via [`safe_name`]) and declared measure expressions do.

use chrono::{DateTime, Utc};
use serde_json::Value;

use veld_catalog::MetricsView;
use veld_core::{Error, Result};

use crate::materialize::safe_name;

/// A half-open time interval `[start, end)` on the view's time dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// A predicate on one dimension: exact values and/or LIKE patterns.
///
/// Within one condition the alternatives are OR'ed; a row matches if its
/// dimension value is in `values` or matches any pattern in `like`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCondition {
    /// Dimension name as declared in the view.
    pub dimension: String,
    /// Exact-match values.
    pub values: Vec<Value>,
    /// `ILIKE` patterns.
    pub like: Vec<String>,
}

/// A filter tree: include conditions AND'ed together, exclude conditions
/// negated and AND'ed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsFilter {
    /// Conditions a row must match.
    pub include: Vec<FilterCondition>,
    /// Conditions a row must not match.
    pub exclude: Vec<FilterCondition>,
}

impl MetricsFilter {
    fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Renders the time-range predicate, pushing bounds into `args`.
fn time_clause(
    view: &MetricsView,
    range: &TimeRange,
    args: &mut Vec<Value>,
) -> Result<Vec<String>> {
    if range.is_empty() {
        return Ok(Vec::new());
    }
    let Some(time_dim) = view.time_dimension.as_deref() else {
        return Err(Error::validation(
            "time range requested but the metrics view declares no time dimension",
        ));
    };
    let mut clauses = Vec::new();
    if let Some(start) = range.start {
        clauses.push(format!("{} >= ?", safe_name(time_dim)));
        args.push(Value::from(start.to_rfc3339()));
    }
    if let Some(end) = range.end {
        clauses.push(format!("{} < ?", safe_name(time_dim)));
        args.push(Value::from(end.to_rfc3339()));
    }
    Ok(clauses)
}

/// Renders one filter condition as a parameterized predicate.
fn condition_clause(
    view: &MetricsView,
    condition: &FilterCondition,
    exclude: bool,
    args: &mut Vec<Value>,
) -> Result<String> {
    let dimension = view.dimension(&condition.dimension).ok_or_else(|| {
        Error::validation(format!(
            "filter references unknown dimension '{}'",
            condition.dimension
        ))
    })?;
    if condition.values.is_empty() && condition.like.is_empty() {
        return Err(Error::validation(format!(
            "filter on dimension '{}' has no values or patterns",
            condition.dimension
        )));
    }

    let column = safe_name(dimension.column());
    let mut alternatives = Vec::new();
    if !condition.values.is_empty() {
        let placeholders = vec!["?"; condition.values.len()].join(", ");
        alternatives.push(format!("{column} IN ({placeholders})"));
        args.extend(condition.values.iter().cloned());
    }
    for pattern in &condition.like {
        alternatives.push(format!("{column} ILIKE ?"));
        args.push(Value::from(pattern.clone()));
    }

    let joined = alternatives.join(" OR ");
    if exclude {
        Ok(format!("NOT ({joined})"))
    } else {
        Ok(format!("({joined})"))
    }
}

fn filter_clauses(
    view: &MetricsView,
    filter: &MetricsFilter,
    args: &mut Vec<Value>,
) -> Result<Vec<String>> {
    let mut clauses = Vec::new();
    for condition in &filter.include {
        clauses.push(condition_clause(view, condition, false, args)?);
    }
    for condition in &filter.exclude {
        clauses.push(condition_clause(view, condition, true, args)?);
    }
    Ok(clauses)
}

fn where_fragment(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// Aggregate totals over a metrics view: one row, one column per requested
/// measure.
#[derive(Debug, Clone, Default)]
pub struct TotalsQuery {
    /// Names of the measures to aggregate; must all exist in the view.
    pub measure_names: Vec<String>,
    /// Optional time restriction.
    pub time_range: Option<TimeRange>,
    /// Optional filter tree.
    pub filter: Option<MetricsFilter>,
}

impl TotalsQuery {
    /// Renders the query against a view definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown measure, an unknown
    /// filter dimension, an empty measure list, or a time range against a
    /// view with no time dimension.
    pub fn build(&self, view: &MetricsView) -> Result<(String, Vec<Value>)> {
        if self.measure_names.is_empty() {
            return Err(Error::validation("totals query requests no measures"));
        }
        let mut selects = Vec::with_capacity(self.measure_names.len());
        for name in &self.measure_names {
            let measure = view.measure(name).ok_or_else(|| {
                Error::validation(format!("unknown measure '{name}'"))
            })?;
            selects.push(format!("{} AS {}", measure.expression, safe_name(name)));
        }

        let mut args = Vec::new();
        let mut clauses = Vec::new();
        if let Some(range) = &self.time_range {
            clauses.extend(time_clause(view, range, &mut args)?);
        }
        if let Some(filter) = &self.filter {
            if !filter.is_empty() {
                clauses.extend(filter_clauses(view, filter, &mut args)?);
            }
        }

        let sql = format!(
            "SELECT {} FROM {}{}",
            selects.join(", "),
            safe_name(&view.model),
            where_fragment(&clauses),
        );
        Ok((sql, args))
    }
}

/// Raw filtered rows from a metrics view's model, newest first when a time
/// dimension is declared.
#[derive(Debug, Clone, Default)]
pub struct RowsQuery {
    /// Optional time restriction.
    pub time_range: Option<TimeRange>,
    /// Optional filter tree.
    pub filter: Option<MetricsFilter>,
    /// Maximum number of rows to return.
    pub limit: Option<u64>,
}

impl RowsQuery {
    /// Renders the query against a view definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown filter dimension or a
    /// time range against a view with no time dimension.
    pub fn build(&self, view: &MetricsView) -> Result<(String, Vec<Value>)> {
        let mut args = Vec::new();
        let mut clauses = Vec::new();
        if let Some(range) = &self.time_range {
            clauses.extend(time_clause(view, range, &mut args)?);
        }
        if let Some(filter) = &self.filter {
            if !filter.is_empty() {
                clauses.extend(filter_clauses(view, filter, &mut args)?);
            }
        }

        let mut sql = format!(
            "SELECT * FROM {}{}",
            safe_name(&view.model),
            where_fragment(&clauses),
        );
        if let Some(time_dim) = view.time_dimension.as_deref() {
            sql.push_str(&format!(" ORDER BY {} DESC", safe_name(time_dim)));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok((sql, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use veld_catalog::{Dimension, Measure};

    fn sample_view() -> MetricsView {
        MetricsView {
            model: "orders".into(),
            time_dimension: Some("ordered_at".into()),
            dimensions: vec![
                Dimension {
                    name: "country".into(),
                    column: None,
                    label: None,
                },
                Dimension {
                    name: "channel".into(),
                    column: Some("sales_channel".into()),
                    label: None,
                },
            ],
            measures: vec![
                Measure {
                    name: "total".into(),
                    expression: "sum(amount)".into(),
                    label: None,
                },
                Measure {
                    name: "count".into(),
                    expression: "count(*)".into(),
                    label: None,
                },
            ],
        }
    }

    #[test]
    fn totals_renders_requested_measures() {
        let query = TotalsQuery {
            measure_names: vec!["total".into(), "count".into()],
            ..Default::default()
        };
        let (sql, args) = query.build(&sample_view()).unwrap();
        assert_eq!(
            sql,
            "SELECT sum(amount) AS \"total\", count(*) AS \"count\" FROM \"orders\""
        );
        assert!(args.is_empty());
    }

    #[test]
    fn unknown_measure_fails_before_rendering() {
        let query = TotalsQuery {
            measure_names: vec!["margin".into()],
            ..Default::default()
        };
        let err = query.build(&sample_view()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("margin"));
    }

    #[test]
    fn empty_measure_list_is_rejected() {
        let err = TotalsQuery::default().build(&sample_view()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn time_range_becomes_bound_parameters() {
        let query = TotalsQuery {
            measure_names: vec!["total".into()],
            time_range: Some(TimeRange {
                start: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                end: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            }),
            ..Default::default()
        };
        let (sql, args) = query.build(&sample_view()).unwrap();
        assert!(sql.contains("WHERE \"ordered_at\" >= ? AND \"ordered_at\" < ?"));
        assert_eq!(args.len(), 2);
        // Bound values only; nothing date-like is interpolated.
        assert!(!sql.contains("2024"));
    }

    #[test]
    fn time_range_requires_time_dimension() {
        let mut view = sample_view();
        view.time_dimension = None;
        let query = TotalsQuery {
            measure_names: vec!["total".into()],
            time_range: Some(TimeRange {
                start: Some(Utc::now()),
                end: None,
            }),
            ..Default::default()
        };
        let err = query.build(&view).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn include_and_exclude_filters_are_parameterized() {
        let query = TotalsQuery {
            measure_names: vec!["total".into()],
            filter: Some(MetricsFilter {
                include: vec![FilterCondition {
                    dimension: "country".into(),
                    values: vec![Value::from("DK"), Value::from("SE")],
                    like: vec!["N%".into()],
                }],
                exclude: vec![FilterCondition {
                    dimension: "channel".into(),
                    values: vec![Value::from("internal")],
                    like: vec![],
                }],
            }),
            ..Default::default()
        };
        let (sql, args) = query.build(&sample_view()).unwrap();
        assert!(sql.contains("(\"country\" IN (?, ?) OR \"country\" ILIKE ?)"));
        // The exclude condition targets the dimension's backing column.
        assert!(sql.contains("NOT (\"sales_channel\" IN (?))"));
        assert_eq!(args.len(), 4);
        assert!(!sql.contains("DK"));
    }

    #[test]
    fn unknown_filter_dimension_is_rejected() {
        let query = TotalsQuery {
            measure_names: vec!["total".into()],
            filter: Some(MetricsFilter {
                include: vec![FilterCondition {
                    dimension: "region".into(),
                    values: vec![Value::from("EU")],
                    like: vec![],
                }],
                exclude: vec![],
            }),
            ..Default::default()
        };
        let err = query.build(&sample_view()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn empty_filter_condition_is_rejected() {
        let query = RowsQuery {
            filter: Some(MetricsFilter {
                include: vec![FilterCondition {
                    dimension: "country".into(),
                    values: vec![],
                    like: vec![],
                }],
                exclude: vec![],
            }),
            ..Default::default()
        };
        let err = query.build(&sample_view()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn rows_query_orders_by_time_and_limits() {
        let query = RowsQuery {
            limit: Some(100),
            ..Default::default()
        };
        let (sql, args) = query.build(&sample_view()).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"orders\" ORDER BY \"ordered_at\" DESC LIMIT 100"
        );
        assert!(args.is_empty());
    }
}
