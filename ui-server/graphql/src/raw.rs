use crate::{Error, GraphSchema};
use ahash::AHashSet as HashSet;
use async_graphql::{Request, Variables};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use ui_server_core::ObjectId;

/// Lists of objects under this key, at any depth of a response, are the result of a query.
pub const REFS_KEY: &str = "refs";

/// Executes `query` and returns the response data as JSON.
pub async fn execute(schema: &GraphSchema, query: &str, variables: Value) -> Result<Value, Error> {
    let req = Request::new(query).variables(Variables::from_json(variables));
    let rsp = schema.execute(req).await;
    if !rsp.errors.is_empty() {
        let msgs = rsp
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>();
        return Err(Error::Query(msgs.join("; ")));
    }
    Ok(rsp.data.into_json()?)
}

/// Executes `query` and collects the objects listed under every `refs` key of the response.
///
/// Queries may select only some identity fields; the rest are left empty. Each object is
/// returned once, in order of first appearance.
pub async fn find_refs(
    schema: &GraphSchema,
    query: &str,
    variables: Value,
) -> Result<Vec<ObjectId>, Error> {
    let data = execute(schema, query, variables).await?;
    let mut found = Vec::new();
    collect(&data, &mut found)?;

    let mut seen = HashSet::new();
    found.retain(|id| seen.insert(id.clone()));
    debug!(refs = found.len(), "Resolved query");
    Ok(found)
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Ref {
    group: String,
    kind: String,
    namespace: String,
    name: String,
}

fn collect(value: &Value, found: &mut Vec<ObjectId>) -> Result<(), Error> {
    match value {
        Value::Object(fields) => {
            for (key, value) in fields {
                if key == REFS_KEY {
                    if let Value::Array(items) = value {
                        for item in items {
                            let r = Ref::deserialize(item)?;
                            found.push(ObjectId::new(r.group, r.kind, r.namespace, r.name));
                        }
                        continue;
                    }
                }
                collect(value, found)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, found)?;
            }
        }
        _ => {}
    }
    Ok(())
}
