//! Text templates rendered against objects.
//!
//! Templates use Jinja syntax with the object's fields as top-level variables, e.g.
//! `{{ metadata.name }}`. Missing fields render as nothing. A template without `{{` is returned
//! as is.

use chrono::{DateTime, Utc};
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};

/// Go-style placeholder for missing values, dropped from output.
const NO_VALUE: &str = "<no value>";

pub struct Templates {
    env: Environment<'static>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

// === impl Templates ===

impl Templates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_filter("jp", jsonpath);
        env.add_filter("age", age);
        env.add_filter("fmt_list", fmt_list);
        Self { env }
    }

    pub fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, Error> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        let rendered = self
            .env
            .render_str(template, Value::from_serialize(data))?;
        if !rendered.contains(NO_VALUE) {
            return Ok(rendered);
        }
        Ok(rendered.replace(NO_VALUE, ""))
    }

    /// Renders a condition. Only `true`, in any case and surrounding whitespace, holds.
    pub fn is_true(&self, template: &str, data: &serde_json::Value) -> Result<bool, Error> {
        let out = self.render(template, data)?;
        Ok(out.trim().eq_ignore_ascii_case("true"))
    }
}

// === filters ===

/// `{{ . | jp("{.spec.containers[*].name}") }}`
fn jsonpath(value: Value, path: &str) -> Result<String, Error> {
    let data = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    ui_server_k8s_index::jsonpath::render(path, &data)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Formats the time since an RFC 3339 timestamp as a kubectl-style age.
fn age(value: Value) -> String {
    let Some(ts) = value.as_str() else {
        return String::new();
    };
    match DateTime::parse_from_rfc3339(ts) {
        Ok(ts) => format_age(Utc::now().signed_duration_since(ts)),
        Err(_) => String::new(),
    }
}

pub(crate) fn format_age(d: chrono::TimeDelta) -> String {
    let secs = d.num_seconds().max(0);
    match secs {
        s if s < 120 => format!("{s}s"),
        s if s < 2 * 3600 => format!("{}m", s / 60),
        s if s < 48 * 3600 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}

fn fmt_list(value: Value) -> Result<String, Error> {
    let items = value
        .try_iter()?
        .map(|v| v.to_string())
        .collect::<Vec<_>>();
    Ok(items.join(", "))
}
