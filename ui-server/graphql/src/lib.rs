//! A GraphQL view of the object graph.
//!
//! Every object is an `ObjectID` node with one field per edge label. Fields accept optional
//! `group` and `kind` arguments that narrow the result to a single kind:
//!
//! ```graphql
//! query Find($src: String!) {
//!   find(oid: $src) {
//!     backup_via(group: "stash.appscode.com", kind: "BackupConfiguration") {
//!       refs: offshoot(group: "stash.appscode.com", kind: "BackupSession") { namespace name }
//!     }
//!   }
//! }
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod raw;
mod schema;

#[cfg(test)]
mod tests;

pub use self::{
    raw::{execute, find_refs, REFS_KEY},
    schema::{build, GraphSchema, ObjectNode, Query},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("graphql query failed: {0}")]
    Query(String),

    #[error("malformed graphql response: {0}")]
    Response(#[from] serde_json::Error),
}
