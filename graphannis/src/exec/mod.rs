pub mod nodesearch;
