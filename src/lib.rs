pub mod compress;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod generation;
pub mod lexical;
pub mod logging;
pub mod multihop;
pub mod prompts;
pub mod reason;
pub mod rerank;
pub mod search;
pub mod semantic;
pub mod store;
