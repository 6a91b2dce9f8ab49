//! Registry for readers and writers.
//!
//! Built-in readers and writers are immutable statics; lookups are plain
//! scans over fixed tables, so the registry needs no locking.

use crate::lang::Language;
use crate::traits::{Reader, Writer};

static READERS: &[&dyn Reader] = &[
    #[cfg(feature = "read-python")]
    &crate::input::PYTHON_READER,
    #[cfg(feature = "read-typescript")]
    &crate::input::TYPESCRIPT_READER,
    #[cfg(feature = "read-typescript")]
    &crate::input::JAVASCRIPT_READER,
    #[cfg(feature = "read-go")]
    &crate::input::GO_READER,
    #[cfg(feature = "read-rust")]
    &crate::input::RUST_READER,
    #[cfg(feature = "read-csharp")]
    &crate::input::CSHARP_READER,
];

static WRITERS: &[&dyn Writer] = &[
    &crate::output::PYTHON_WRITER,
    &crate::output::TYPESCRIPT_WRITER,
    &crate::output::JAVASCRIPT_WRITER,
    &crate::output::GO_WRITER,
    &crate::output::RUST_WRITER,
    &crate::output::CSHARP_WRITER,
];

/// Get the reader for a language, if one is compiled in.
pub fn reader(lang: Language) -> Option<&'static dyn Reader> {
    readers().find(|r| r.language() == lang)
}

/// Get the writer for a language.
pub fn writer(lang: Language) -> Option<&'static dyn Writer> {
    writers().find(|w| w.language() == lang)
}

/// Get a reader by language name or alias (`"python"`, `"ts"`, `"golang"`).
pub fn reader_for_language(name: &str) -> Option<&'static dyn Reader> {
    name.parse().ok().and_then(reader)
}

/// Get a reader by file extension.
pub fn reader_for_extension(ext: &str) -> Option<&'static dyn Reader> {
    let ext = ext.trim_start_matches('.');
    readers().find(|r| r.extensions().contains(&ext))
}

/// Get a writer by language name or alias.
pub fn writer_for_language(name: &str) -> Option<&'static dyn Writer> {
    name.parse().ok().and_then(writer)
}

/// Get a writer by the extension of the file it should produce.
pub fn writer_for_extension(ext: &str) -> Option<&'static dyn Writer> {
    Language::from_extension(ext.trim_start_matches('.')).and_then(writer)
}

/// All compiled-in readers.
pub fn readers() -> impl Iterator<Item = &'static dyn Reader> {
    READERS.iter().copied()
}

/// All writers.
pub fn writers() -> impl Iterator<Item = &'static dyn Writer> {
    WRITERS.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "read-typescript")]
    fn test_reader_lookup() {
        let reader = reader_for_language("typescript").expect("typescript reader");
        assert_eq!(reader.language(), Language::TypeScript);
        assert!(reader.extensions().contains(&"ts"));

        let reader = reader_for_extension("tsx").expect("tsx extension");
        assert_eq!(reader.language(), Language::TypeScript);

        let reader = reader_for_extension(".mjs").expect("mjs extension");
        assert_eq!(reader.language(), Language::JavaScript);
    }

    #[test]
    #[cfg(feature = "read-python")]
    fn test_python_reader_by_alias() {
        let reader = reader_for_language("py").expect("python reader");
        assert_eq!(reader.language(), Language::Python);
        assert!(reader_for_extension("py").is_some());
    }

    #[test]
    fn test_writer_lookup() {
        let writer = writer_for_language("C#").expect("csharp writer");
        assert_eq!(writer.language(), Language::CSharp);
        assert_eq!(writer.extension(), "cs");

        let writer = writer_for_extension("rs").expect("rust writer");
        assert_eq!(writer.language(), Language::Rust);
    }

    #[test]
    fn test_every_language_has_a_writer() {
        for lang in Language::ALL {
            assert!(writer(lang).is_some(), "no writer for {lang}");
        }
    }

    #[test]
    #[cfg(all(feature = "read-rust", feature = "read-csharp"))]
    fn test_every_language_has_a_reader() {
        for lang in Language::ALL {
            assert!(reader(lang).is_some(), "no reader for {lang}");
        }
        assert_eq!(reader_for_extension("rs").unwrap().language(), Language::Rust);
        assert_eq!(reader_for_extension("cs").unwrap().language(), Language::CSharp);
        assert!(reader_for_language("cobol").is_none());
    }

    #[test]
    #[cfg(all(feature = "read-python", feature = "read-go"))]
    fn test_roundtrip_via_registry() {
        let reader = reader_for_language("python").unwrap();
        let writer = writer_for_language("go").unwrap();

        let module = reader.read("print(1 + 2)\n").unwrap();
        let annotated = crate::infer::infer(module, &Default::default());
        let go = writer.write(&annotated, &Default::default()).unwrap();

        assert!(go.starts_with("package main"));
        assert!(go.contains("fmt.Println(1 + 2)"));
    }
}
