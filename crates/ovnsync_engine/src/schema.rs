//! Negotiates the monitored table set against the live schema.

use crate::config::TableColumns;
use crate::error::{ClientError, ClientResult};
use ovnsync_protocol::{DatabaseId, DatabaseSchema};

/// Negotiated tables in canonical order, each with its column list
/// (empty = all columns).
pub type NegotiatedTables = Vec<(String, Vec<String>)>;

/// Returns the canonical tables of `database` that the store actually serves.
///
/// Canonical order is preserved. Tables the store does not know are
/// dropped silently since the store's schema may lag or lead ours.
pub fn supported_tables(database: DatabaseId, schema: &DatabaseSchema) -> Vec<&'static str> {
    database
        .canonical_tables()
        .iter()
        .copied()
        .filter(|table| schema.has_table(table))
        .collect()
}

/// Computes the tables to monitor.
///
/// Without a restriction every supported table is monitored in full.
/// With one, every named table must be supported, and no table may name
/// specific columns: full-row monitoring is the only supported mode.
pub fn negotiate(
    database: DatabaseId,
    schema: &DatabaseSchema,
    restriction: Option<&TableColumns>,
) -> ClientResult<NegotiatedTables> {
    let supported = supported_tables(database, schema);

    let Some(restriction) = restriction.filter(|r| !r.is_empty()) else {
        return Ok(supported
            .into_iter()
            .map(|t| (t.to_string(), Vec::new()))
            .collect());
    };

    // Column lists are refused before table membership so the error does
    // not depend on which tables the store happens to serve.
    if let Some((table, _)) = restriction.iter().find(|(_, cols)| !cols.is_empty()) {
        return Err(ClientError::UnsupportedColumns {
            table: table.clone(),
        });
    }

    if let Some(table) = restriction
        .keys()
        .find(|t| !supported.iter().any(|s| *s == t.as_str()))
    {
        return Err(ClientError::UnknownTable {
            table: table.clone(),
            database: database.name().to_string(),
        });
    }

    Ok(supported
        .into_iter()
        .filter(|t| restriction.contains_key(*t))
        .map(|t| (t.to_string(), Vec::new()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovnsync_protocol::{ColumnSchema, TableSchema};

    fn schema_with(tables: &[&str]) -> DatabaseSchema {
        tables.iter().fold(DatabaseSchema::new("OVN_Northbound"), |s, t| {
            s.with_table(*t, TableSchema::new().with_column("name", ColumnSchema::atomic("string")))
        })
    }

    fn restriction(entries: &[(&str, &[&str])]) -> TableColumns {
        entries
            .iter()
            .map(|(t, cols)| (t.to_string(), cols.iter().map(|c| c.to_string()).collect()))
            .collect()
    }

    fn names(tables: &NegotiatedTables) -> Vec<&str> {
        tables.iter().map(|(t, _)| t.as_str()).collect()
    }

    #[test]
    fn unknown_tables_dropped_canonical_order_kept() {
        let schema = schema_with(&["ACL", "Logical_Switch", "Some_Future_Table", "NB_Global"]);
        let tables = negotiate(DatabaseId::Northbound, &schema, None).unwrap();
        assert_eq!(names(&tables), vec!["NB_Global", "Logical_Switch", "ACL"]);
        assert!(tables.iter().all(|(_, cols)| cols.is_empty()));
    }

    #[test]
    fn restriction_selects_subset_in_canonical_order() {
        let schema = schema_with(&["Logical_Switch", "Logical_Switch_Port", "ACL"]);
        let r = restriction(&[("ACL", &[]), ("Logical_Switch", &[])]);
        let tables = negotiate(DatabaseId::Northbound, &schema, Some(&r)).unwrap();
        assert_eq!(names(&tables), vec!["Logical_Switch", "ACL"]);
    }

    #[test]
    fn restricted_table_missing_from_schema() {
        let schema = schema_with(&["Logical_Switch"]);
        let r = restriction(&[("ACL", &[])]);
        let err = negotiate(DatabaseId::Northbound, &schema, Some(&r)).unwrap_err();
        assert!(matches!(err, ClientError::UnknownTable { ref table, .. } if table == "ACL"));
        assert!(err.is_configuration());
    }

    #[test]
    fn table_of_other_database_rejected() {
        // Chassis exists in the schema but is not a northbound table.
        let schema = schema_with(&["Chassis", "Logical_Switch"]);
        let r = restriction(&[("Chassis", &[])]);
        assert!(negotiate(DatabaseId::Northbound, &schema, Some(&r)).is_err());
    }

    #[test]
    fn column_restriction_unsupported_even_for_valid_tables() {
        let schema = schema_with(&["Logical_Switch"]);
        let r = restriction(&[("Logical_Switch", &["name"])]);
        let err = negotiate(DatabaseId::Northbound, &schema, Some(&r)).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedColumns { .. }));
    }

    #[test]
    fn column_restriction_unsupported_for_unknown_tables() {
        let schema = schema_with(&["Logical_Switch"]);
        let r = restriction(&[("Nope", &["name"])]);
        let err = negotiate(DatabaseId::Northbound, &schema, Some(&r)).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedColumns { .. }));
    }

    #[test]
    fn empty_restriction_means_everything() {
        let schema = schema_with(&["Logical_Switch", "ACL"]);
        let tables = negotiate(DatabaseId::Northbound, &schema, Some(&TableColumns::new())).unwrap();
        assert_eq!(names(&tables), vec!["Logical_Switch", "ACL"]);
    }

    #[test]
    fn southbound_uses_its_own_order() {
        let schema = schema_with(&["Port_Binding", "Chassis", "Logical_Switch"]);
        let tables = negotiate(DatabaseId::Southbound, &schema, None).unwrap();
        assert_eq!(names(&tables), vec!["Chassis", "Port_Binding"]);
    }
}
