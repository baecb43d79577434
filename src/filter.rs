// Secondary index query filters

use crate::record::IndexValue;

/// Filter for querying documents through a secondary index
#[derive(Debug, Clone)]
pub struct Filter {
    /// Indexed field name to filter on
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Value to compare against
    pub value: IndexValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Equality lookup, the common case
    pub fn eq(field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Value to bind for this filter's comparison
    ///
    /// LIKE-based operators get their wildcards added here, with `%`, `_`
    /// and `\` in the caller's value escaped.
    pub(crate) fn bound_value(&self) -> IndexValue {
        match (&self.value, self.op) {
            (IndexValue::String(s), FilterOp::Contains) => IndexValue::String(format!("%{}%", escape_like(s))),
            (IndexValue::String(s), FilterOp::StartsWith) => IndexValue::String(format!("{}%", escape_like(s))),
            (value, _) => value.clone(),
        }
    }
}

/// Comparison operators for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,         // ==
    Ne,         // !=
    Gt,         // >
    Lt,         // <
    Gte,        // >=
    Lte,        // <=
    Contains,   // LIKE %value%
    StartsWith, // LIKE value%
}

impl FilterOp {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::Contains | FilterOp::StartsWith => "LIKE",
        }
    }

    pub(crate) fn is_like(self) -> bool {
        matches!(self, FilterOp::Contains | FilterOp::StartsWith)
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterOp::Eq => write!(f, "="),
            FilterOp::Ne => write!(f, "!="),
            FilterOp::Gt => write!(f, ">"),
            FilterOp::Lt => write!(f, "<"),
            FilterOp::Gte => write!(f, ">="),
            FilterOp::Lte => write!(f, "<="),
            FilterOp::Contains => write!(f, "CONTAINS"),
            FilterOp::StartsWith => write!(f, "STARTS WITH"),
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_creation() {
        let filter = Filter::eq("status", "todo");

        assert_eq!(filter.field, "status");
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, IndexValue::String("todo".to_string()));
    }

    #[test]
    fn test_filter_op_to_sql() {
        assert_eq!(FilterOp::Eq.to_sql(), "=");
        assert_eq!(FilterOp::Ne.to_sql(), "!=");
        assert_eq!(FilterOp::Gt.to_sql(), ">");
        assert_eq!(FilterOp::Lt.to_sql(), "<");
        assert_eq!(FilterOp::Gte.to_sql(), ">=");
        assert_eq!(FilterOp::Lte.to_sql(), "<=");
        assert_eq!(FilterOp::Contains.to_sql(), "LIKE");
        assert_eq!(FilterOp::StartsWith.to_sql(), "LIKE");
    }

    #[test]
    fn test_like_patterns_are_escaped() {
        let filter = Filter::new("dueDate", FilterOp::StartsWith, "2026-10-19");
        assert_eq!(filter.bound_value(), IndexValue::String("2026-10-19%".to_string()));

        let filter = Filter::new("name", FilterOp::Contains, "50%_off");
        assert_eq!(filter.bound_value(), IndexValue::String("%50\\%\\_off%".to_string()));

        let filter = Filter::new("count", FilterOp::Gt, IndexValue::Int(3));
        assert_eq!(filter.bound_value(), IndexValue::Int(3));
    }
}
