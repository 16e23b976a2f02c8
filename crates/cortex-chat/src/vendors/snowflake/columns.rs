use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::backend::{Statement, StatementExecutor};
use crate::errors::CortexError;

use super::validate_identifier;

static COLUMN_TYPE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^([^(]+)(?:\(([^)]+)\))?"));

/// Splits `NUMBER(38,0)` into `("NUMBER", "38,0")`; types without a length
/// get an empty one.
pub fn split_column_type(column_type: &str) -> (String, String) {
    let captures = COLUMN_TYPE
        .as_ref()
        .ok()
        .and_then(|pattern| pattern.captures(column_type));
    match captures {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
            caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
        ),
        None => (column_type.to_string(), String::new()),
    }
}

/// One column of a view as reported by `DESC VIEW`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub base_type: String,
    pub length: String,
}

/// Describes the columns of a view.
pub async fn describe_view(
    executor: &dyn StatementExecutor,
    view: &str,
) -> Result<Vec<ColumnDefinition>, CortexError> {
    validate_identifier(view)?;
    let result = executor
        .execute(&Statement::new(format!("DESC VIEW {view}")))
        .await?;

    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            let name = row.first()?.as_deref()?;
            let column_type = row.get(1).and_then(|c| c.as_deref()).unwrap_or_default();
            let (base_type, length) = split_column_type(column_type);
            Some(ColumnDefinition {
                name: name.to_string(),
                base_type,
                length,
            })
        })
        .collect())
}
