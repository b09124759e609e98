//! # Parley - conversational query resolution
//!
//! Resolves a user utterance against its conversation by combining exact
//! lookup, semantic search over question/answer corpora, intent
//! classification and coreference-aware rewriting, with per-session
//! conversational memory.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parley::{analysis::AnalyzeRequest, Config, NlpService};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let service = NlpService::new(&config)?;
//!
//!     let request = AnalyzeRequest::new("What about managers?")
//!         .session("demo")
//!         .prev_bot("Employees get 20 days under the leave policy.");
//!     let decision = service.analyze(&request);
//!     println!("{}", serde_json::to_string_pretty(&decision)?);
//!
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod coref;
pub mod domain;
pub mod error;
pub mod intent;
pub mod knowledge;
pub mod memory;
pub mod models;
pub mod nlp;
pub mod routes;
pub mod server;
pub mod utils;

// Re-export commonly used types for convenience
pub use analysis::{AnalyzeRequest, NlpService};
pub use config::Config;
pub use error::ServiceError;
pub use models::{Analysis, AnalysisResult, AnalysisStrategy, Decision, DecisionResponse, Role};
pub use nlp::NlpBackend;
