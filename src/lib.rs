//! drivedex library
//!
//! Ingestion pipeline that crawls a Google Drive tree, extracts text from
//! heterogeneous file formats, and keeps a Qdrant collection in sync, plus the
//! retrieval path that turns a query into ranked context.

pub mod chunk;
pub mod config;
pub mod crawl;
pub mod drive;
pub mod embed;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod limiter;
pub mod retrieve;
pub mod retry;
pub mod store;
pub mod sync;
