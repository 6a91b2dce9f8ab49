//! Translation pipeline: read, infer, write.
//!
//! A [`Translator`] holds only configuration. Every call builds its own
//! reader context, inference state and writer, so one translator can be
//! shared across threads.

use crate::config::TranslateConfig;
use crate::error::TranslateError;
use crate::infer::{self, AnnotatedModule};
use crate::ir::visit::collect_unsupported;
use crate::ir::{Module, Unsupported};
use crate::lang::Language;
use crate::registry;
use rayon::prelude::*;
use serde::Serialize;

/// Quality summary of one translation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranslationReport {
    /// Constructs the readers could not model, in source order.
    pub markers: Vec<Unsupported>,
    pub typed_slots: usize,
    pub dynamic_slots: usize,
    /// Share of type slots that fell back to the dynamic type.
    pub fallback_ratio: f64,
    pub inference_passes: usize,
    pub converged: bool,
}

impl TranslationReport {
    fn from_annotated(annotated: &AnnotatedModule) -> Self {
        let stats = &annotated.stats;
        Self {
            markers: collect_unsupported(&annotated.module),
            typed_slots: stats.typed_slots,
            dynamic_slots: stats.dynamic_slots,
            fallback_ratio: stats.fallback_ratio(),
            inference_passes: stats.passes,
            converged: stats.converged,
        }
    }

    /// True when every construct was translated.
    pub fn is_complete(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Generated source plus its report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub output: String,
    pub to: Language,
    pub report: TranslationReport,
}

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationJob {
    pub source: String,
    pub from: Language,
    pub to: Language,
}

impl TranslationJob {
    pub fn new(source: impl Into<String>, from: Language, to: Language) -> Self {
        Self {
            source: source.into(),
            from,
            to,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    config: TranslateConfig,
}

impl Translator {
    pub fn new(config: TranslateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslateConfig {
        &self.config
    }

    /// Translate `source` from one language to another.
    pub fn translate(
        &self,
        source: &str,
        from: Language,
        to: Language,
    ) -> Result<Translation, TranslateError> {
        let reader = registry::reader(from).ok_or(TranslateError::NoReader(from))?;
        tracing::debug!(%from, %to, bytes = source.len(), "translating");
        let module = reader.read(source)?;
        self.translate_module(module, to)
    }

    /// Translate by language names or aliases (`"py"`, `"golang"`, `"c#"`).
    pub fn translate_named(
        &self,
        source: &str,
        from: &str,
        to: &str,
    ) -> Result<Translation, TranslateError> {
        self.translate(source, from.parse()?, to.parse()?)
    }

    /// Infer and emit an already-built module.
    pub fn translate_module(
        &self,
        mut module: Module,
        to: Language,
    ) -> Result<Translation, TranslateError> {
        let writer = registry::writer(to).ok_or(TranslateError::NoWriter(to))?;
        if let Some(name) = &self.config.module_name {
            module.name = name.clone();
        }

        let annotated = infer::infer(module, &self.config.inference);
        let report = TranslationReport::from_annotated(&annotated);
        for marker in &report.markers {
            tracing::debug!(
                kind = %marker.kind,
                line = marker.span.line,
                column = marker.span.column,
                "unsupported construct passed through"
            );
        }
        if report.fallback_ratio > self.config.quality.max_fallback_ratio {
            tracing::warn!(
                module = %annotated.module.name,
                ratio = report.fallback_ratio,
                threshold = self.config.quality.max_fallback_ratio,
                "dynamic type fallback above threshold"
            );
        }

        let output = writer.write(&annotated, &self.config)?;
        Ok(Translation { output, to, report })
    }

    /// Translate independent jobs in parallel; results keep the input order.
    pub fn translate_batch(
        &self,
        jobs: &[TranslationJob],
    ) -> Vec<Result<Translation, TranslateError>> {
        jobs.par_iter()
            .map(|job| self.translate(&job.source, job.from, job.to))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ir::{Function, Stmt, Type};

    #[test]
    #[cfg(feature = "read-rust")]
    fn test_rust_source_translates() {
        let translation = Translator::default()
            .translate(
                "fn double(n: i64) -> i64 {\n    n * 2\n}\n\nfn main() {\n    println!(\"{}\", double(4));\n}\n",
                Language::Rust,
                Language::Python,
            )
            .unwrap();
        assert!(translation.output.contains("def double(n: int) -> int:"));
        assert!(translation.output.contains("print(double(4))"));
        assert!(translation.report.is_complete());
    }

    #[test]
    fn test_unknown_language_name() {
        let err = Translator::default()
            .translate_named("x = 1", "python", "cobol")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
        assert!(err.message().contains("cobol"));
    }

    #[test]
    fn test_module_name_override() {
        let config = TranslateConfig {
            module_name: Some("billing".to_string()),
            ..Default::default()
        };
        let mut module = Module::new("main");
        let ping = Function::new("ping", vec![], Type::void(), vec![Stmt::Return(None)]).unwrap();
        module.functions.push(ping);
        let translation = Translator::new(config)
            .translate_module(module, Language::Go)
            .unwrap();
        assert!(translation.output.starts_with("package billing\n"));
        assert!(translation.report.is_complete());
    }

    #[test]
    #[cfg(feature = "read-python")]
    fn test_report_counts_markers() {
        let source = "x = 1\nwith open(p) as f:\n    pass\n";
        let translation = Translator::default()
            .translate(source, Language::Python, Language::TypeScript)
            .unwrap();
        let markers = &translation.report.markers;
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].span.line, 2);
        assert!(translation.output.contains("unsupported"));
    }

    #[test]
    #[cfg(feature = "read-python")]
    fn test_batch_keeps_order() {
        let jobs: Vec<TranslationJob> = (0..8)
            .map(|i| TranslationJob::new(format!("print({i})\n"), Language::Python, Language::Go))
            .collect();
        let results = Translator::default().translate_batch(&jobs);
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            let translation = result.as_ref().unwrap();
            assert!(translation.output.contains(&format!("fmt.Println({i})")));
        }
    }
}
