//! Tabular renderings of objects.

use crate::{template::format_age, Result, Templates};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use ui_server_k8s_api::layout::{ColumnDefinition, Table, TableColumn, TableRow};

/// Columns used when a block or query defines none.
pub fn default_columns(namespaced: bool) -> Vec<ColumnDefinition> {
    let mut cols = vec![column("Name", "string", "{{ metadata.name }}")];
    if namespaced {
        cols.push(column("Namespace", "string", "{{ metadata.namespace }}"));
    }
    cols.push(ColumnDefinition {
        format: "date".to_string(),
        ..column("Age", "date", "{{ metadata.creationTimestamp }}")
    });
    cols
}

fn column(name: &str, type_: &str, path_template: &str) -> ColumnDefinition {
    ColumnDefinition {
        name: name.to_string(),
        type_: type_.to_string(),
        format: String::new(),
        path_template: path_template.to_string(),
        priority: 0,
    }
}

/// Renders one row per object. With `include_objects` each row also carries its object.
pub fn build(
    templates: &Templates,
    columns: &[ColumnDefinition],
    objects: &[Value],
    include_objects: bool,
) -> Result<Table> {
    let rows = objects
        .iter()
        .map(|obj| {
            let cells = columns
                .iter()
                .map(|c| cell(templates, c, obj))
                .collect::<Result<Vec<_>>>()?;
            Ok(TableRow {
                cells,
                object: include_objects.then(|| obj.clone()),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Table {
        column_definitions: Table::columns(columns),
        rows,
    })
}

fn cell(templates: &Templates, col: &ColumnDefinition, obj: &Value) -> Result<Value> {
    let text = templates.render(&col.path_template, obj)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(match (col.type_.as_str(), col.format.as_str()) {
        ("integer", _) => text.parse::<i64>().map(Value::from).unwrap_or_else(|_| text.into()),
        ("number", _) => text.parse::<f64>().map(Value::from).unwrap_or_else(|_| text.into()),
        ("boolean", _) => text.parse::<bool>().map(Value::from).unwrap_or_else(|_| text.into()),
        (_, "date") => match DateTime::parse_from_rfc3339(text) {
            Ok(ts) => format_age(Utc::now().signed_duration_since(ts)).into(),
            Err(_) => text.into(),
        },
        _ => text.into(),
    })
}

/// Encodes a table as a `meta.k8s.io/v1` `Table`.
pub fn to_k8s(table: &Table) -> Value {
    let columns = table
        .column_definitions
        .iter()
        .map(|c: &TableColumn| {
            json!({
                "name": c.name,
                "type": c.type_,
                "format": c.format,
                "description": c.description,
                "priority": c.priority,
            })
        })
        .collect::<Vec<_>>();
    let rows = table
        .rows
        .iter()
        .map(|r| {
            let mut row = json!({ "cells": r.cells });
            if let Some(obj) = &r.object {
                row["object"] = obj.clone();
            }
            row
        })
        .collect::<Vec<_>>();
    json!({
        "apiVersion": "meta.k8s.io/v1",
        "kind": "Table",
        "metadata": {},
        "columnDefinitions": columns,
        "rows": rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn typed_cells() {
        let templates = Templates::new();
        let cols = vec![
            column("Name", "string", "{{ metadata.name }}"),
            column("Replicas", "integer", "{{ spec.replicas }}"),
            column("Paused", "boolean", "{{ spec.paused }}"),
            column("Missing", "string", "{{ spec.nothing }}"),
        ];
        let obj = json!({
            "metadata": { "name": "web" },
            "spec": { "replicas": 2, "paused": false },
        });
        let table = build(&templates, &cols, &[obj.clone()], true).unwrap();
        assert_eq!(table.column_definitions.len(), 4);
        assert_eq!(
            table.rows[0].cells,
            vec![json!("web"), json!(2), json!(false), Value::Null]
        );
        assert_eq!(table.rows[0].object.as_ref(), Some(&obj));

        let k8s = to_k8s(&table);
        assert_eq!(k8s["kind"], "Table");
        assert_eq!(k8s["columnDefinitions"][1]["type"], "integer");
        assert_eq!(k8s["rows"][0]["cells"][0], "web");
    }

    #[test]
    fn default_columns_follow_scope() {
        assert_eq!(default_columns(true).len(), 3);
        let cluster = default_columns(false);
        assert_eq!(
            cluster.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Name", "Age"]
        );
    }
}
