//! # engram-retrieval
//!
//! Query-time hybrid search: embed the query, fan out vector and
//! full-text searches across the candidate shards, fuse the ranked
//! lists, and return the best k memories.

pub mod fusion;
pub mod searcher;

pub use fusion::{fuse, FusedHit, W_FTS, W_VECTOR};
pub use searcher::{HybridSearcher, SearchHit};
