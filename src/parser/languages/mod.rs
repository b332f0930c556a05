//! Toolchain-specific parsers.
//!
//! Each module recognizes the output grammars of one toolchain and carries
//! its own noise table:
//! - `javascript`: ESLint (stylish, compact, unix)
//! - `typescript`: `tsc`
//! - `rust_lang`: rustc, Clippy, cargo, panics
//! - `go`: go build/vet/test, golangci-lint, panics
//! - `python`: tracebacks, pytest, mypy, ruff, pylint

pub mod go;
pub mod javascript;
pub mod python;
pub mod rust_lang;
pub mod typescript;

pub use go::GoParser;
pub use javascript::EslintParser;
pub use python::PythonParser;
pub use rust_lang::RustParser;
pub use typescript::TypeScriptParser;
