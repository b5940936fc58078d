//! Content analyzer adapters.
//!
//! - `HttpContentAnalyzer` - Calls the external analysis service
//! - `MockContentAnalyzer` - Canned responses for tests and local runs

mod http_analyzer;
mod mock_analyzer;

pub use http_analyzer::{HttpAnalyzerConfig, HttpContentAnalyzer};
pub use mock_analyzer::MockContentAnalyzer;
