//! Integration tests for normalize-transpile.

use normalize_transpile::{
    ErrorKind, Language, TranslateConfig, Translation, TranslationJob, Translator,
};

const ADD: &str = "def add(a, b):\n    return a + b\n\n\ntotal = add(2, 3)\nprint(total)\n";

const POSITIVES: &str =
    "def positives(items):\n    return [x * 2 for x in items if x > 0]\n\n\nprint(positives([1, 5, 3]))\n";

const STORE: &str = r#"
class Store:
    def __init__(self):
        self.cache = {}
        self.count = 0

    def put(self, key: str, value: int):
        self.cache[key] = value
        self.count += 1
"#;

const SHOUT_TS: &str = r#"
function shout(words: string[]): void {
  const loud: string[] = [];
  for (const w of words) {
    loud.push(w.toUpperCase());
  }
  console.log(loud.length);
}

shout(["a", "b"]);
"#;

const SHOUT_GO: &str = r#"package main

import (
	"fmt"
	"strings"
)

func shout(words []string) {
	loud := []string{}
	for _, w := range words {
		loud = append(loud, strings.ToUpper(w))
	}
	fmt.Println(len(loud))
}

func main() {
	shout([]string{"a", "b"})
}
"#;

const COUNTER_TS: &str = r#"
class Counter {
  private count = 0;

  add(by: number): number {
    this.count += by;
    return this.count;
  }
}

const c = new Counter();
console.log(c.add(2));
"#;

fn translation(source: &str, from: Language, to: Language) -> Translation {
    Translator::default()
        .translate(source, from, to)
        .unwrap_or_else(|e| panic!("{from} -> {to} failed: {e}"))
}

fn translate(source: &str, from: Language, to: Language) -> String {
    translation(source, from, to).output
}

fn from_python(to: Language) -> String {
    translate(ADD, Language::Python, to)
}

// === Typed function from call sites ===

#[test]
fn add_to_python() {
    let output = from_python(Language::Python);
    assert!(output.contains("def add(a: int, b: int) -> int:"));
    assert!(output.contains("    return a + b"));
}

#[test]
fn add_to_typescript() {
    let output = from_python(Language::TypeScript);
    assert!(output.contains("function add(a: number, b: number): number {"));
    assert!(output.contains("console.log(total);"));
}

#[test]
fn add_to_javascript() {
    let output = from_python(Language::JavaScript);
    assert!(output.contains("function add(a, b) {"));
    assert!(!output.contains(": number"));
}

#[test]
fn add_to_go() {
    let output = from_python(Language::Go);
    assert!(output.starts_with("package main\n"));
    assert!(output.contains("func add(a int, b int) int {"));
    assert!(output.contains("fmt.Println(total)"));
}

#[test]
fn add_to_rust() {
    let output = from_python(Language::Rust);
    assert!(output.contains("pub fn add(a: i64, b: i64) -> i64 {"));
    assert!(output.contains("fn main() {"));
}

#[test]
fn add_to_csharp() {
    let output = from_python(Language::CSharp);
    assert!(output.contains("public static int add(int a, int b)"));
    assert!(output.contains("public static void Main()"));
}

#[test]
fn add_report_is_fully_typed() {
    let translation = Translator::default()
        .translate(ADD, Language::Python, Language::Go)
        .unwrap();
    let report = &translation.report;
    assert!(report.is_complete());
    assert!(report.converged);
    assert_eq!(report.dynamic_slots, 0);
    assert_eq!(report.fallback_ratio, 0.0);
}

// === Comprehensions keep filter and transform ===

#[test]
fn comprehension_in_every_target() {
    let python = translate(POSITIVES, Language::Python, Language::Python);
    assert!(python.contains("[x * 2 for x in items if x > 0]"));

    let ts = translate(POSITIVES, Language::Python, Language::TypeScript);
    assert!(ts.contains(".filter((x) => x > 0).map((x) => x * 2)"));

    let go = translate(POSITIVES, Language::Python, Language::Go);
    assert!(go.contains("append("));
    assert!(go.contains("if x > 0 {"));

    let rust = translate(POSITIVES, Language::Python, Language::Rust);
    assert!(rust.contains(".filter_map("));

    let csharp = translate(POSITIVES, Language::Python, Language::CSharp);
    assert!(csharp.contains(".Where(x => x > 0).Select(x => x * 2)"));
}

// === Constructor-only properties ===

#[test]
fn constructor_properties_are_typed() {
    let ts = translate(STORE, Language::Python, Language::TypeScript);
    assert!(ts.contains("class Store {"));
    assert!(ts.contains("count: number"));
    assert!(ts.contains("cache: Record<string, number>"));

    let python = translate(STORE, Language::Python, Language::Python);
    assert!(python.contains("count: int"));
    assert!(python.contains("cache: dict[str, int]"));
}

// === Literal escaping ===

#[test]
fn header_literal_survives_every_target() {
    let source = "banner = \"\\nHeader\\n\"\nprint(banner)\n";
    for to in Language::ALL {
        let output = translate(source, Language::Python, to);
        assert!(output.contains(r#""\nHeader\n""#), "{to}: {output}");
    }
}

#[test]
fn nul_before_digit_stays_two_characters() {
    let source = "s = \"\\x001\"\nprint(s)\n";
    for to in Language::ALL {
        let output = translate(source, Language::Python, to);
        let expected = match to {
            Language::Rust => r#""\u{0}1""#,
            _ => r#""\u00001""#,
        };
        assert!(output.contains(expected), "{to}: {output}");
    }
}

#[test]
fn escapes_reparse_in_readable_targets() {
    let source = "s = \"a\\\\b \\\"q\\\"\\nend\"\nprint(s)\n";
    for to in Language::ALL {
        let first = translate(source, Language::Python, to);
        let second = translate(&first, to, to);
        assert!(second.contains(r#"a\\b \"q\"\nend"#), "{to}: {second}");
    }
}

// === Idempotence ===

/// Each pass must read fully, then the second and third passes must agree.
fn assert_stable(source: &str, from: Language, to: Language) {
    let first = translation(source, from, to);
    let second = translation(&first.output, to, to);
    let third = translation(&second.output, to, to);
    for (pass, t) in [(1, &first), (2, &second), (3, &third)] {
        assert!(
            t.report.is_complete(),
            "{from} -> {to} pass {pass} left markers {:?}:\n{}",
            t.report.markers,
            t.output
        );
    }
    assert_eq!(second.output, third.output, "{from} -> {to} is not stable");
}

#[test]
fn python_output_is_stable() {
    assert_stable(ADD, Language::Python, Language::Python);
    assert_stable(POSITIVES, Language::Python, Language::Python);
}

#[test]
fn typescript_output_is_stable() {
    assert_stable(ADD, Language::Python, Language::TypeScript);
}

#[test]
fn go_output_is_stable() {
    assert_stable(ADD, Language::Python, Language::Go);
}

#[test]
fn javascript_output_is_stable() {
    assert_stable(ADD, Language::Python, Language::JavaScript);
}

#[test]
fn rust_output_is_stable() {
    assert_stable(ADD, Language::Python, Language::Rust);
}

#[test]
fn csharp_output_is_stable() {
    assert_stable(ADD, Language::Python, Language::CSharp);
}

#[test]
fn with_block_leaves_report_incomplete() {
    let source = "def run(p):\n    with open(p) as f:\n        pass\n";
    let first = translation(source, Language::Python, Language::Python);
    assert!(!first.report.is_complete());
}

// === Idioms survive from every source ===

/// Native spellings of upper-case, append and sequence length per target.
fn shout_idioms(to: Language) -> &'static [&'static str] {
    match to {
        Language::Python => &["loud.append(w.upper())", "print(len(loud))"],
        Language::TypeScript | Language::JavaScript => {
            &["loud.push(w.toUpperCase());", "console.log(loud.length);"]
        }
        Language::Go => &["loud = append(loud, strings.ToUpper(w))", "fmt.Println(len(loud))"],
        Language::Rust => &["loud.push(", ".to_uppercase()", "loud.len()"],
        Language::CSharp => &["loud.Add(w.ToUpper());", "Console.WriteLine(loud.Count);"],
    }
}

fn assert_shout_idioms(source: &str, from: Language) {
    for to in Language::ALL {
        let t = translation(source, from, to);
        assert!(t.report.is_complete(), "{from} -> {to}: {:?}", t.report.markers);
        for idiom in shout_idioms(to) {
            assert!(t.output.contains(idiom), "{from} -> {to} lost `{idiom}`:\n{}", t.output);
        }
    }
}

#[test]
fn typescript_idioms_in_every_target() {
    assert_shout_idioms(SHOUT_TS, Language::TypeScript);
}

#[test]
fn go_idioms_in_every_target() {
    assert_shout_idioms(SHOUT_GO, Language::Go);
}

// === Structural validity of emitted Rust and JavaScript ===

/// Brackets pair up outside string literals.
fn assert_balanced(output: &str, to: Language) {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut chars = output.chars();
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                assert_eq!(stack.pop(), Some(expected), "{to}: stray `{c}` in\n{output}");
            }
            _ => {}
        }
    }
    assert!(!in_string, "{to}: unterminated string in\n{output}");
    assert!(stack.is_empty(), "{to}: unclosed {stack:?} in\n{output}");
}

#[test]
fn emitted_rust_and_javascript_are_well_formed() {
    let sources = [
        (ADD, Language::Python),
        (POSITIVES, Language::Python),
        (STORE, Language::Python),
        (SHOUT_TS, Language::TypeScript),
        (SHOUT_GO, Language::Go),
        (COUNTER_TS, Language::TypeScript),
    ];
    for (source, from) in sources {
        let rust = translation(source, from, Language::Rust);
        assert!(rust.report.is_complete(), "{from} -> rust: {:?}", rust.report.markers);
        assert_balanced(&rust.output, Language::Rust);
        assert!(!rust.output.contains("undefined"), "{}", rust.output);

        let js = translation(source, from, Language::JavaScript);
        assert!(js.report.is_complete(), "{from} -> js: {:?}", js.report.markers);
        assert_balanced(&js.output, Language::JavaScript);
        for typed in [": number", ": string", ": void", "private ", "interface "] {
            assert!(!js.output.contains(typed), "{from} -> js kept `{typed}`:\n{}", js.output);
        }
    }
}

// === Class state across typed targets ===

#[test]
fn counter_widens_and_binds_mutably_in_rust() {
    let rust = translate(COUNTER_TS, Language::TypeScript, Language::Rust);
    assert!(rust.contains("count: f64"), "{rust}");
    assert!(rust.contains("pub fn add(&mut self, by: f64) -> f64 {"), "{rust}");
    assert!(rust.contains("let mut c = Counter::new();"), "{rust}");
}

// === Readers for Rust and C# ===

#[test]
fn rust_struct_to_typescript() {
    let source = r#"
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

fn main() {
    let p = Point { x: 3.0, y: 4.0 };
    println!("{}", p.norm());
}
"#;
    let t = translation(source, Language::Rust, Language::TypeScript);
    assert!(t.report.is_complete(), "{:?}", t.report.markers);
    assert!(t.output.contains("class Point {"), "{}", t.output);
    assert!(t.output.contains("Math.sqrt("), "{}", t.output);
    assert!(t.output.contains("new Point("), "{}", t.output);
    assert!(t.output.contains("console.log(p.norm());"), "{}", t.output);
}

#[test]
fn csharp_program_to_python() {
    let source = r#"
using System;

public static class Program
{
    public static int add(int a, int b)
    {
        return a + b;
    }

    public static void Main()
    {
        Console.WriteLine(add(2, 3));
    }
}
"#;
    let t = translation(source, Language::CSharp, Language::Python);
    assert!(t.report.is_complete(), "{:?}", t.report.markers);
    assert!(t.output.contains("def add(a: int, b: int) -> int:"), "{}", t.output);
    assert!(t.output.contains("print(add(2, 3))"), "{}", t.output);
}

// === Errors ===

#[test]
fn parse_error_is_surfaced() {
    let err = Translator::default()
        .translate("x = \"abc\ny = 2\n", Language::Python, Language::Go)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.location().map(|s| s.line), Some(1));
}

#[test]
fn unterminated_template_terminates() {
    let err = Translator::default()
        .translate("const s = `abc;\n", Language::TypeScript, Language::Python)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn unknown_target_by_name() {
    let err = Translator::default()
        .translate_named(ADD, "py", "fortran")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
}

// === Unsupported markers ===

#[test]
fn unsupported_construct_is_visible() {
    let source = "def run(p):\n    with open(p) as f:\n        pass\n    return 1\n";
    let translation = Translator::default()
        .translate(source, Language::Python, Language::Go)
        .unwrap();
    assert_eq!(translation.report.markers.len(), 1);
    assert_eq!(translation.report.markers[0].kind, "with");
    assert!(translation.output.contains("// unsupported with (line 2):"));
}

// === Configuration ===

#[test]
fn config_file_drives_writers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transpile.toml");
    std::fs::write(
        &path,
        "[csharp]\nnamespace = \"Acme.Math\"\nclass_name = \"Calc\"\n\n[python]\ntype_hints = false\n",
    )
    .unwrap();
    let config = TranslateConfig::load(&path).unwrap();
    let translator = Translator::new(config);

    let csharp = translator
        .translate(ADD, Language::Python, Language::CSharp)
        .unwrap()
        .output;
    assert!(csharp.contains("namespace Acme.Math;"));
    assert!(csharp.contains("public static class Calc"));

    let python = translator
        .translate(ADD, Language::Python, Language::Python)
        .unwrap()
        .output;
    assert!(python.contains("def add(a, b):"));
}

// === Batch ===

#[test]
fn batch_mixes_languages_and_keeps_order() {
    let jobs = vec![
        TranslationJob::new(ADD, Language::Python, Language::Rust),
        TranslationJob::new("x = \"oops\n", Language::Python, Language::Go),
        TranslationJob::new(
            "function twice(n: number): number {\n  return n * 2;\n}\n",
            Language::TypeScript,
            Language::Python,
        ),
    ];
    let results = Translator::default().translate_batch(&jobs);
    assert_eq!(results.len(), 3);
    assert!(results[0].as_ref().unwrap().output.contains("pub fn add"));
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::Parse);
    assert!(results[2].as_ref().unwrap().output.contains("def twice(n: float) -> float:"));
}

#[test]
fn report_serializes_to_json() {
    let translation = Translator::default()
        .translate(ADD, Language::Python, Language::TypeScript)
        .unwrap();
    let json = serde_json::to_value(&translation.report).unwrap();
    assert_eq!(json["markers"], serde_json::json!([]));
    assert_eq!(json["dynamic_slots"], 0);
    assert_eq!(json["converged"], true);
    assert!(json["typed_slots"].as_u64().unwrap() > 0);
}
