//! Source-to-source translation between languages via a typed common IR.
//!
//! `normalize-transpile` reads Python, TypeScript, JavaScript, Go, Rust or C#
//! into one language-neutral [`Module`], infers the types the source left
//! implicit, and writes the result as Python, TypeScript, JavaScript, Go, Rust or C#.
//!
//! # Architecture
//!
//! ```text
//! Source Languages        IR                  Target Languages
//! ────────────────    ──────────────────    ────────────────────
//! Python          ─┐                       ┌─> Python
//! TypeScript      ─┤                       ├─> TypeScript / JavaScript
//! JavaScript      ─┼─> Module ─> infer ────┼─> Go
//! Go              ─┤   (ir)     (infer)    ├─> Rust
//! Rust            ─┤                       └─> C#
//! C#              ─┘
//! ```
//!
//! Library calls (`len(x)`, `xs.join(sep)`, `strings.ToUpper(s)`) are
//! recognized against the [`idioms`] tables and become universal operations,
//! so each writer renders the target's native form.
//!
//! # Example
//!
//! ```ignore
//! use normalize_transpile::{Language, Translator};
//!
//! let translation = Translator::default().translate(
//!     "def add(a, b):\n    return a + b\n\nprint(add(1, 2))\n",
//!     Language::Python,
//!     Language::Go,
//! )?;
//! println!("{}", translation.output);
//! assert!(translation.report.is_complete());
//! ```
//!
//! Constructs the IR does not model survive as visible comments in the
//! output and are listed in the [`TranslationReport`]; they never abort a
//! translation. Parse and generation failures do.

pub mod config;
pub mod error;
pub mod idioms;
pub mod infer;
pub mod ir;
pub mod lang;
pub mod pipeline;
pub mod registry;
pub mod traits;

#[cfg(any(
    feature = "read-python",
    feature = "read-typescript",
    feature = "read-go",
    feature = "read-rust",
    feature = "read-csharp"
))]
pub mod input;
pub mod output;

// Re-exports: IR types
pub use ir::{
    BinaryOp, Class, Comprehension, Expr, Function, Literal, Module, Span, Stmt, Type, UnaryOp,
    Unsupported,
};

// Re-exports: errors and configuration
pub use config::{ConfigError, TranslateConfig};
pub use error::{ErrorKind, GenerationError, ParseError, TranslateError};
pub use lang::{Language, UnknownLanguage};

// Re-exports: Traits
pub use traits::{Reader, Writer};

// Re-exports: Inference
pub use infer::{AnnotatedModule, InferenceStats, infer};

// Re-exports: Pipeline
pub use pipeline::{Translation, TranslationJob, TranslationReport, Translator};

// Re-exports: Registry
pub use registry::{
    reader, reader_for_extension, reader_for_language, readers, writer, writer_for_extension,
    writer_for_language, writers,
};

// Re-exports: Built-in readers
#[cfg(feature = "read-csharp")]
pub use input::{CSHARP_READER, CSharpReader, read_csharp};
#[cfg(feature = "read-go")]
pub use input::{GO_READER, GoReader, read_go};
#[cfg(feature = "read-python")]
pub use input::{PYTHON_READER, PythonReader, read_python};
#[cfg(feature = "read-rust")]
pub use input::{RUST_READER, RustReader, read_rust};
#[cfg(feature = "read-typescript")]
pub use input::{
    JAVASCRIPT_READER, TYPESCRIPT_READER, TypeScriptReader, read_javascript, read_typescript,
};

// Re-exports: Built-in writers
pub use output::{
    CSHARP_WRITER, GO_WRITER, JAVASCRIPT_WRITER, PYTHON_WRITER, RUST_WRITER, TYPESCRIPT_WRITER,
};
