//! Logsieve - structured error extraction from CI build logs.
//!
//! Logsieve turns raw, unstructured tool output into [`ErrorRecord`]s. Each
//! line is cleaned (ANSI escapes and runner timestamps stripped), checked
//! against constant-time length gates and noise tables, then offered to every
//! tool parser. The parser reporting the highest confidence extracts the
//! record; ties go to the higher static priority.
//!
//! # Architecture
//!
//! - `record`: the immutable record model
//! - `context`: per-stream workflow attribution and the last-known file
//! - `preprocess`: escape stripping and line-length gates
//! - `noise`: three-tier benign-output classification
//! - `parser`: the parser contract, the dispatcher and every tool parser
//! - `stream`: lazy iteration over a line source
//! - `config`: YAML configuration
//! - `report`: output formatting (pretty, JSON, SARIF)
//!
//! # Example
//!
//! ```
//! let records = logsieve::extract("src/app.ts(10,5): error TS2322: Type 'string' is not assignable to type 'number'.");
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].rule_id(), Some("TS2322"));
//! ```
//!
//! # Adding a New Parser
//!
//! See `src/parser/languages/` for examples. Implement the `ToolParser`
//! trait and register it in `parser::default_parsers`.

pub mod cli;
pub mod config;
pub mod context;
pub mod noise;
pub mod parser;
pub mod preprocess;
pub mod record;
pub mod report;
pub mod stream;

pub use config::{Config, ConfigError, FailOn};
pub use context::ParseContext;
pub use parser::{ParserRegistry, ToolParser};
pub use record::{Category, ErrorRecord, Severity, Source, WorkflowContext};
pub use stream::{extract, extract_with, RecordStream};
