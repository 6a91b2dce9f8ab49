//! Traits for language readers and writers.

use crate::config::TranslateConfig;
use crate::error::{GenerationError, ParseError};
use crate::infer::AnnotatedModule;
use crate::ir::Module;
use crate::lang::Language;

/// A reader parses source code into the IR.
///
/// Readers are stateless statics; every call builds a fresh read context.
pub trait Reader: Send + Sync {
    fn language(&self) -> Language;

    /// File extensions this reader handles (e.g., &["ts", "tsx"]).
    fn extensions(&self) -> &'static [&'static str];

    /// Parse source code into the IR.
    fn read(&self, source: &str) -> Result<Module, ParseError>;
}

/// A writer emits an annotated module as source code in a target language.
pub trait Writer: Send + Sync {
    fn language(&self) -> Language;

    /// File extension for output (e.g., "go").
    fn extension(&self) -> &'static str {
        self.language().extension()
    }

    /// Emit the module. Fails instead of producing partial output.
    fn write(
        &self,
        module: &AnnotatedModule,
        config: &TranslateConfig,
    ) -> Result<String, GenerationError>;
}
