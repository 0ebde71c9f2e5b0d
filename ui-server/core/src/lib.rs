//! Core types for the UI server's object relationship engine.
//!
//! Every object observed in the cluster is identified by an [`Oid`], a canonical string of the
//! form `G=<group>,K=<kind>,NS=<ns>,N=<name>`. Objects are linked by labelled, undirected edges in
//! the [`ObjectGraph`]. Edge labels partition the graph into views; the `offshoot` view is special
//! in that cross-label queries first expand through it.
//!
//! ```text
//! [ Deployment ] -offshoot- [ ReplicaSet ] -offshoot- [ Pod ]
//!       |
//!   exposed_by
//!       |
//!  [ Service ] -monitored_by- [ ServiceMonitor ]
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod graph;
mod label;
mod oid;
mod rid;
pub mod version;

pub use self::{
    graph::{Connections, ObjectGraph, SharedGraph},
    label::{EdgeLabel, UnknownLabel},
    oid::{GroupKind, ObjectId, Oid, ParseError},
    rid::{ResourceId, Scope},
};
