pub mod filter;
pub mod indexjoin;
pub mod nestedloop;
pub mod parallel;
