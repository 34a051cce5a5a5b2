//! Low-level types and storage primitives of the graphANNIS linguistic query
//! engine: the string pool, the node/edge annotation index, and the graph
//! storage implementations + registry. No knowledge of operators, query
//! planning, or the query language lives here; see the `graphannis` crate.

pub mod annostorage;
pub mod errors;
pub mod graph;
pub mod stringstorage;
pub mod types;
pub mod util;
