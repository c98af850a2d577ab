//! Paper pipeline and the tools built on it
//!
//! arXiv abstract fetching, summarization and the MCP tool set registered at startup.

pub mod papers;
pub mod summarizer;
pub mod tools;
pub mod utils;
