//! Idiom translation tables.
//!
//! Each universal [`Op`] maps to one surface template per language family.
//! Templates use `$0`, `$1`, ... for canonical argument positions and `$*`
//! for "all arguments". The same templates drive both directions:
//!
//! - readers parse them into [`Pattern`]s to recognize native calls
//!   (`len(x)`, `x.toUpperCase()`, `strings.Join(xs, sep)`);
//! - writers substitute rendered arguments and record the imports the form
//!   needs in an [`ImportSet`].
//!
//! The tables are immutable statics. Adding an operation or a rendering rule
//! touches only this file.

use crate::ir::{Expr, Type};
use crate::lang::Language;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Universal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Print,
    StrLength,
    SeqLength,
    Upper,
    Lower,
    Trim,
    /// `(haystack, needle)`
    Contains,
    StartsWith,
    EndsWith,
    /// `(string, separator)`
    Split,
    /// `(separator, items)`
    Join,
    /// `(string, old, new)`
    Replace,
    ToString,
    ToInt,
    ToFloat,
    Abs,
    Min,
    Max,
    Sqrt,
    Floor,
    RandomFloat,
    /// `(sequence, item)`; mutates the sequence.
    Append,
    Keys,
    Values,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::Print => "print",
            Op::StrLength => "string-length",
            Op::SeqLength => "sequence-length",
            Op::Upper => "uppercase",
            Op::Lower => "lowercase",
            Op::Trim => "trim",
            Op::Contains => "contains",
            Op::StartsWith => "starts-with",
            Op::EndsWith => "ends-with",
            Op::Split => "split",
            Op::Join => "join",
            Op::Replace => "replace",
            Op::ToString => "to-string",
            Op::ToInt => "to-int",
            Op::ToFloat => "to-float",
            Op::Abs => "abs",
            Op::Min => "min",
            Op::Max => "max",
            Op::Sqrt => "sqrt",
            Op::Floor => "floor",
            Op::RandomFloat => "random-float",
            Op::Append => "append",
            Op::Keys => "keys",
            Op::Values => "values",
        }
    }

    /// Pick between string and sequence length once the argument type is known.
    pub fn refine(self, first_arg: &Type) -> Op {
        match self {
            Op::SeqLength if first_arg.is_string() => Op::StrLength,
            Op::StrLength if first_arg.is_sequence() || first_arg.is_map() => Op::SeqLength,
            other => other,
        }
    }

    /// Result type given argument types.
    pub fn result_type(self, args: &[Type]) -> Type {
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        match self {
            Op::Print | Op::Append => Type::void(),
            Op::StrLength | Op::SeqLength | Op::ToInt | Op::Floor => Type::int(),
            Op::Upper | Op::Lower | Op::Trim | Op::Join | Op::Replace | Op::ToString => {
                Type::string()
            }
            Op::Contains | Op::StartsWith | Op::EndsWith => Type::bool(),
            Op::Split => Type::seq(Type::string()),
            Op::ToFloat | Op::Sqrt | Op::RandomFloat => Type::float(),
            Op::Abs => arg(0),
            Op::Min | Op::Max => arg(0).join(&arg(1)),
            Op::Keys => match arg(0).map_parts() {
                Some((k, _)) => Type::seq(k.clone()),
                None => Type::seq(Type::any()),
            },
            Op::Values => match arg(0).map_parts() {
                Some((_, v)) => Type::seq(v.clone()),
                None => Type::seq(Type::any()),
            },
        }
    }

    /// Evidence an operation gives about its first argument.
    pub fn first_arg_hint(self) -> Option<Type> {
        match self {
            Op::StrLength
            | Op::Upper
            | Op::Lower
            | Op::Trim
            | Op::StartsWith
            | Op::EndsWith
            | Op::Split
            | Op::Replace => Some(Type::string()),
            Op::SeqLength | Op::Append => Some(Type::seq(Type::any())),
            Op::Keys | Op::Values => Some(Type::map(Type::any(), Type::any())),
            Op::Abs | Op::Sqrt | Op::Floor => Some(Type::float()),
            _ => None,
        }
    }
}

/// Receiver discriminator for type-dependent renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    Any,
    Str,
    Seq,
    Map,
}

impl Receiver {
    pub fn of(ty: &Type) -> Receiver {
        if ty.is_string() {
            Receiver::Str
        } else if ty.is_sequence() {
            Receiver::Seq
        } else if ty.is_map() {
            Receiver::Map
        } else {
            Receiver::Any
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Both,
    RecognizeOnly,
}

/// One row of the table.
#[derive(Debug, Clone, Copy)]
pub struct Idiom {
    pub op: Op,
    pub lang: Language,
    pub receiver: Receiver,
    pub template: &'static str,
    pub imports: &'static [&'static str],
    role: Role,
}

const fn idiom(
    op: Op,
    lang: Language,
    template: &'static str,
    imports: &'static [&'static str],
) -> Idiom {
    Idiom {
        op,
        lang,
        receiver: Receiver::Any,
        template,
        imports,
        role: Role::Both,
    }
}

impl Idiom {
    const fn on(self, receiver: Receiver) -> Idiom {
        Idiom { receiver, ..self }
    }

    const fn recognize_only(self) -> Idiom {
        Idiom {
            role: Role::RecognizeOnly,
            ..self
        }
    }
}

use Language::{CSharp as Cs, Go, Python as Py, Rust as Rs, TypeScript as Ts};

/// Imports are written `module` or `module:item`.
pub static IDIOMS: &[Idiom] = &[
    idiom(Op::Print, Py, "print($*)", &[]),
    idiom(Op::Print, Ts, "console.log($*)", &[]),
    idiom(Op::Print, Go, "fmt.Println($*)", &["fmt"]),
    idiom(Op::Print, Rs, "println!(\"{}\", $0)", &[]),
    idiom(Op::Print, Cs, "Console.WriteLine($0)", &["System"]),
    // Sequence length first: it is the default when nothing is known.
    idiom(Op::SeqLength, Py, "len($0)", &[]),
    idiom(Op::SeqLength, Ts, "$0.length", &[]),
    idiom(Op::SeqLength, Go, "len($0)", &[]),
    idiom(Op::SeqLength, Rs, "($0.len() as i64)", &[]),
    idiom(Op::SeqLength, Rs, "$0.len()", &[]).recognize_only(),
    idiom(Op::SeqLength, Cs, "$0.Count", &[]),
    idiom(Op::StrLength, Py, "len($0)", &[]),
    idiom(Op::StrLength, Ts, "$0.length", &[]),
    idiom(Op::StrLength, Go, "len($0)", &[]),
    idiom(Op::StrLength, Rs, "($0.chars().count() as i64)", &[]),
    idiom(Op::StrLength, Cs, "$0.Length", &[]),
    idiom(Op::Upper, Py, "$0.upper()", &[]),
    idiom(Op::Upper, Ts, "$0.toUpperCase()", &[]),
    idiom(Op::Upper, Go, "strings.ToUpper($0)", &["strings"]),
    idiom(Op::Upper, Rs, "$0.to_uppercase()", &[]),
    idiom(Op::Upper, Cs, "$0.ToUpper()", &[]),
    idiom(Op::Lower, Py, "$0.lower()", &[]),
    idiom(Op::Lower, Ts, "$0.toLowerCase()", &[]),
    idiom(Op::Lower, Go, "strings.ToLower($0)", &["strings"]),
    idiom(Op::Lower, Rs, "$0.to_lowercase()", &[]),
    idiom(Op::Lower, Cs, "$0.ToLower()", &[]),
    idiom(Op::Trim, Py, "$0.strip()", &[]),
    idiom(Op::Trim, Ts, "$0.trim()", &[]),
    idiom(Op::Trim, Go, "strings.TrimSpace($0)", &["strings"]),
    idiom(Op::Trim, Rs, "$0.trim().to_string()", &[]),
    idiom(Op::Trim, Rs, "$0.trim()", &[]).recognize_only(),
    idiom(Op::Trim, Cs, "$0.Trim()", &[]),
    idiom(Op::Contains, Py, "$1 in $0", &[]),
    idiom(Op::Contains, Ts, "($1 in $0)", &[]).on(Receiver::Map),
    idiom(Op::Contains, Ts, "$0.includes($1)", &[]),
    idiom(Op::Contains, Go, "slices.Contains($0, $1)", &["slices"]).on(Receiver::Seq),
    idiom(Op::Contains, Go, "strings.Contains($0, $1)", &["strings"]),
    idiom(Op::Contains, Rs, "$0.contains_key(&$1)", &[]).on(Receiver::Map),
    idiom(Op::Contains, Rs, "$0.contains(&$1)", &[]),
    idiom(Op::Contains, Rs, "$0.contains_key($1)", &[]).on(Receiver::Map).recognize_only(),
    idiom(Op::Contains, Rs, "$0.contains($1)", &[]).recognize_only(),
    idiom(Op::Contains, Cs, "$0.ContainsKey($1)", &[]).on(Receiver::Map),
    idiom(Op::Contains, Cs, "$0.Contains($1)", &[]),
    idiom(Op::StartsWith, Py, "$0.startswith($1)", &[]),
    idiom(Op::StartsWith, Ts, "$0.startsWith($1)", &[]),
    idiom(Op::StartsWith, Go, "strings.HasPrefix($0, $1)", &["strings"]),
    idiom(Op::StartsWith, Rs, "$0.starts_with(&$1)", &[]),
    idiom(Op::StartsWith, Rs, "$0.starts_with($1)", &[]).recognize_only(),
    idiom(Op::StartsWith, Cs, "$0.StartsWith($1)", &[]),
    idiom(Op::EndsWith, Py, "$0.endswith($1)", &[]),
    idiom(Op::EndsWith, Ts, "$0.endsWith($1)", &[]),
    idiom(Op::EndsWith, Go, "strings.HasSuffix($0, $1)", &["strings"]),
    idiom(Op::EndsWith, Rs, "$0.ends_with(&$1)", &[]),
    idiom(Op::EndsWith, Rs, "$0.ends_with($1)", &[]).recognize_only(),
    idiom(Op::EndsWith, Cs, "$0.EndsWith($1)", &[]),
    idiom(Op::Split, Py, "$0.split($1)", &[]),
    idiom(Op::Split, Ts, "$0.split($1)", &[]),
    idiom(Op::Split, Go, "strings.Split($0, $1)", &["strings"]),
    idiom(
        Op::Split,
        Rs,
        "$0.split(&$1).map(String::from).collect::<Vec<String>>()",
        &[],
    ),
    idiom(Op::Split, Cs, "$0.Split($1).ToList()", &["System.Linq"]),
    idiom(Op::Split, Rs, "$0.split($1)", &[]).recognize_only(),
    idiom(Op::Split, Cs, "$0.Split($1)", &[]).recognize_only(),
    idiom(Op::Join, Py, "$0.join($1)", &[]),
    idiom(Op::Join, Ts, "$1.join($0)", &[]),
    idiom(Op::Join, Go, "strings.Join($1, $0)", &["strings"]),
    idiom(Op::Join, Rs, "$1.join(&$0)", &[]),
    idiom(Op::Join, Rs, "$1.join($0)", &[]).recognize_only(),
    idiom(Op::Join, Cs, "string.Join($0, $1)", &[]),
    idiom(Op::Replace, Py, "$0.replace($1, $2)", &[]),
    idiom(Op::Replace, Ts, "$0.replaceAll($1, $2)", &[]),
    idiom(Op::Replace, Go, "strings.ReplaceAll($0, $1, $2)", &["strings"]),
    idiom(Op::Replace, Rs, "$0.replace(&$1, &$2)", &[]),
    idiom(Op::Replace, Rs, "$0.replace($1, $2)", &[]).recognize_only(),
    idiom(Op::Replace, Cs, "$0.Replace($1, $2)", &[]),
    idiom(Op::ToString, Py, "str($0)", &[]),
    idiom(Op::ToString, Ts, "String($0)", &[]),
    idiom(Op::ToString, Ts, "$0.toString()", &[]).recognize_only(),
    idiom(Op::ToString, Go, "fmt.Sprint($0)", &["fmt"]),
    idiom(Op::ToString, Go, "strconv.Itoa($0)", &["strconv"]).recognize_only(),
    idiom(Op::ToString, Rs, "$0.to_string()", &[]),
    idiom(Op::ToString, Cs, "$0.ToString()", &[]),
    idiom(Op::ToInt, Py, "int($0)", &[]),
    idiom(Op::ToInt, Ts, "Math.trunc($0)", &[]),
    idiom(Op::ToInt, Ts, "parseInt($0)", &[]).recognize_only(),
    idiom(Op::ToInt, Go, "int($0)", &[]),
    idiom(Op::ToInt, Rs, "($0 as i64)", &[]),
    idiom(Op::ToInt, Cs, "(int)($0)", &[]),
    idiom(Op::ToInt, Cs, "int.Parse($0)", &[]).recognize_only(),
    idiom(Op::ToInt, Cs, "Convert.ToInt32($0)", &[]).recognize_only(),
    idiom(Op::ToFloat, Py, "float($0)", &[]),
    idiom(Op::ToFloat, Ts, "Number($0)", &[]),
    idiom(Op::ToFloat, Ts, "parseFloat($0)", &[]).recognize_only(),
    idiom(Op::ToFloat, Go, "float64($0)", &[]),
    idiom(Op::ToFloat, Rs, "($0 as f64)", &[]),
    idiom(Op::ToFloat, Cs, "(double)($0)", &[]),
    idiom(Op::ToFloat, Cs, "double.Parse($0)", &[]).recognize_only(),
    idiom(Op::ToFloat, Cs, "Convert.ToDouble($0)", &[]).recognize_only(),
    idiom(Op::Abs, Py, "abs($0)", &[]),
    idiom(Op::Abs, Ts, "Math.abs($0)", &[]),
    idiom(Op::Abs, Go, "math.Abs($0)", &["math"]),
    idiom(Op::Abs, Rs, "$0.abs()", &[]),
    idiom(Op::Abs, Cs, "Math.Abs($0)", &["System"]),
    idiom(Op::Min, Py, "min($0, $1)", &[]),
    idiom(Op::Min, Ts, "Math.min($0, $1)", &[]),
    idiom(Op::Min, Go, "min($0, $1)", &[]),
    idiom(Op::Min, Rs, "$0.min($1)", &[]),
    idiom(Op::Min, Cs, "Math.Min($0, $1)", &["System"]),
    idiom(Op::Max, Py, "max($0, $1)", &[]),
    idiom(Op::Max, Ts, "Math.max($0, $1)", &[]),
    idiom(Op::Max, Go, "max($0, $1)", &[]),
    idiom(Op::Max, Rs, "$0.max($1)", &[]),
    idiom(Op::Max, Cs, "Math.Max($0, $1)", &["System"]),
    idiom(Op::Sqrt, Py, "math.sqrt($0)", &["math"]),
    idiom(Op::Sqrt, Ts, "Math.sqrt($0)", &[]),
    idiom(Op::Sqrt, Go, "math.Sqrt(float64($0))", &["math"]),
    idiom(Op::Sqrt, Go, "math.Sqrt($0)", &["math"]).recognize_only(),
    idiom(Op::Sqrt, Rs, "($0 as f64).sqrt()", &[]),
    idiom(Op::Sqrt, Rs, "$0.sqrt()", &[]).recognize_only(),
    idiom(Op::Sqrt, Cs, "Math.Sqrt($0)", &["System"]),
    idiom(Op::Floor, Py, "math.floor($0)", &["math"]),
    idiom(Op::Floor, Ts, "Math.floor($0)", &[]),
    idiom(Op::Floor, Go, "int(math.Floor($0))", &["math"]),
    idiom(Op::Floor, Go, "math.Floor($0)", &["math"]).recognize_only(),
    idiom(Op::Floor, Rs, "($0.floor() as i64)", &[]),
    idiom(Op::Floor, Cs, "(int)Math.Floor($0)", &["System"]),
    idiom(Op::Floor, Cs, "Math.Floor($0)", &["System"]).recognize_only(),
    idiom(Op::RandomFloat, Py, "random.random()", &["random"]),
    idiom(Op::RandomFloat, Ts, "Math.random()", &[]),
    idiom(Op::RandomFloat, Go, "rand.Float64()", &["math/rand"]),
    idiom(Op::RandomFloat, Rs, "rand::random::<f64>()", &[]),
    idiom(Op::RandomFloat, Cs, "Random.Shared.NextDouble()", &["System"]),
    idiom(Op::Append, Py, "$0.append($1)", &[]),
    idiom(Op::Append, Ts, "$0.push($1)", &[]),
    idiom(Op::Append, Go, "$0 = append($0, $1)", &[]),
    idiom(Op::Append, Rs, "$0.push($1)", &[]),
    idiom(Op::Append, Cs, "$0.Add($1)", &[]),
    idiom(Op::Keys, Py, "list($0.keys())", &[]),
    idiom(Op::Keys, Py, "$0.keys()", &[]).recognize_only(),
    idiom(Op::Keys, Ts, "Object.keys($0)", &[]),
    idiom(Op::Keys, Go, "slices.Collect(maps.Keys($0))", &["maps", "slices"]),
    idiom(Op::Keys, Rs, "$0.keys().cloned().collect::<Vec<_>>()", &[]),
    idiom(Op::Keys, Cs, "$0.Keys.ToList()", &["System.Linq"]),
    idiom(Op::Keys, Rs, "$0.keys()", &[]).recognize_only(),
    idiom(Op::Keys, Cs, "$0.Keys", &[]).recognize_only(),
    idiom(Op::Values, Py, "list($0.values())", &[]),
    idiom(Op::Values, Py, "$0.values()", &[]).recognize_only(),
    idiom(Op::Values, Ts, "Object.values($0)", &[]),
    idiom(Op::Values, Go, "slices.Collect(maps.Values($0))", &["maps", "slices"]),
    idiom(Op::Values, Rs, "$0.values().cloned().collect::<Vec<_>>()", &[]),
    idiom(Op::Values, Cs, "$0.Values.ToList()", &["System.Linq"]),
    idiom(Op::Values, Rs, "$0.values()", &[]).recognize_only(),
    idiom(Op::Values, Cs, "$0.Values", &[]).recognize_only(),
];

/// Native filter/map method names, for languages that chain them.
#[derive(Debug, Clone, Copy)]
pub struct SequenceIdiom {
    pub lang: Language,
    pub filter: &'static str,
    pub map: &'static str,
    pub imports: &'static [&'static str],
}

pub static SEQUENCE_IDIOMS: &[SequenceIdiom] = &[
    SequenceIdiom {
        lang: Py,
        filter: "filter",
        map: "map",
        imports: &[],
    },
    SequenceIdiom {
        lang: Ts,
        filter: "filter",
        map: "map",
        imports: &[],
    },
    SequenceIdiom {
        lang: Rs,
        filter: "filter",
        map: "map",
        imports: &[],
    },
    SequenceIdiom {
        lang: Cs,
        filter: "Where",
        map: "Select",
        imports: &["System.Linq"],
    },
];

pub fn sequence_idiom(lang: Language) -> Option<&'static SequenceIdiom> {
    let lang = lang.idiom_family();
    SEQUENCE_IDIOMS.iter().find(|s| s.lang == lang)
}

/// Canonical exception names and their native spellings. The first native
/// name listed for a language is the one writers emit.
pub static EXCEPTIONS: &[(&str, &[(Language, &str)])] = &[
    (
        "Exception",
        &[(Py, "Exception"), (Ts, "Error"), (Cs, "Exception")],
    ),
    (
        "ValueError",
        &[(Py, "ValueError"), (Ts, "Error"), (Cs, "ArgumentException")],
    ),
    (
        "TypeError",
        &[
            (Py, "TypeError"),
            (Ts, "TypeError"),
            (Cs, "InvalidCastException"),
        ],
    ),
    (
        "KeyError",
        &[(Py, "KeyError"), (Ts, "Error"), (Cs, "KeyNotFoundException")],
    ),
    (
        "IndexError",
        &[
            (Py, "IndexError"),
            (Ts, "RangeError"),
            (Cs, "ArgumentOutOfRangeException"),
            (Cs, "IndexOutOfRangeException"),
        ],
    ),
    (
        "NotImplementedError",
        &[
            (Py, "NotImplementedError"),
            (Ts, "Error"),
            (Cs, "NotImplementedException"),
        ],
    ),
    (
        "RuntimeError",
        &[
            (Py, "RuntimeError"),
            (Ts, "Error"),
            (Cs, "InvalidOperationException"),
        ],
    ),
    (
        "ZeroDivisionError",
        &[
            (Py, "ZeroDivisionError"),
            (Ts, "RangeError"),
            (Cs, "DivideByZeroException"),
        ],
    ),
];

/// Map a native exception class name to its canonical name. Unknown names
/// pass through unchanged.
pub fn canonical_exception(lang: Language, native: &str) -> String {
    let lang = lang.idiom_family();
    EXCEPTIONS
        .iter()
        .find(|(_, natives)| natives.iter().any(|(l, n)| *l == lang && *n == native))
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or_else(|| native.to_string())
}

/// Map a canonical exception name to the native class for `lang`.
pub fn native_exception(lang: Language, canonical: &str) -> String {
    let lang = lang.idiom_family();
    EXCEPTIONS
        .iter()
        .find(|(name, _)| *name == canonical)
        .and_then(|(_, natives)| natives.iter().find(|(l, _)| *l == lang))
        .map(|(_, native)| native.to_string())
        .unwrap_or_else(|| canonical.to_string())
}

pub fn is_canonical_exception(name: &str) -> bool {
    EXCEPTIONS.iter().any(|(canonical, _)| *canonical == name)
}

// ============================================================================
// Template patterns (recognition)
// ============================================================================

/// Argument slot in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Arg(usize),
    Rest,
}

/// Parsed shape of a recognizable template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `name($0, $1)`, `pkg.name($*)`
    Call { name: String, args: Vec<Slot> },
    /// `$0.name($1)`
    Method {
        receiver: usize,
        name: String,
        args: Vec<Slot>,
    },
    /// `$0.name`
    Property { receiver: usize, name: String },
    /// `$1 in $0`
    In { needle: usize, haystack: usize },
}

fn parse_slot(s: &str) -> Option<Slot> {
    let rest = s.trim().strip_prefix('$')?;
    if rest == "*" {
        return Some(Slot::Rest);
    }
    rest.parse().ok().map(Slot::Arg)
}

fn parse_slots(inner: &str) -> Option<Vec<Slot>> {
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner.split(',').map(parse_slot).collect()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Parse a template into a recognizable pattern. Templates with any other
/// shape are render-only.
pub fn parse_pattern(template: &str) -> Option<Pattern> {
    let t = template.trim();
    if let Some((needle, haystack)) = t.split_once(" in ") {
        if let (Some(Slot::Arg(n)), Some(Slot::Arg(h))) = (parse_slot(needle), parse_slot(haystack))
        {
            return Some(Pattern::In {
                needle: n,
                haystack: h,
            });
        }
        return None;
    }
    if let Some(rest) = t.strip_prefix('$') {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let receiver: usize = digits.parse().ok()?;
        let rest = rest[digits.len()..].strip_prefix('.')?;
        let name: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            return None;
        }
        let tail = &rest[name.len()..];
        if tail.is_empty() {
            return Some(Pattern::Property { receiver, name });
        }
        let inner = tail.strip_prefix('(')?.strip_suffix(')')?;
        if inner.contains('(') {
            return None;
        }
        return Some(Pattern::Method {
            receiver,
            name,
            args: parse_slots(inner)?,
        });
    }
    let name: String = t.chars().take_while(|c| is_name_char(*c)).collect();
    if name.is_empty() {
        return None;
    }
    let inner = t[name.len()..].strip_prefix('(')?.strip_suffix(')')?;
    if inner.contains('(') {
        return None;
    }
    Some(Pattern::Call {
        name,
        args: parse_slots(inner)?,
    })
}

static PATTERNS: LazyLock<Vec<(Idiom, Pattern)>> = LazyLock::new(|| {
    IDIOMS
        .iter()
        .filter_map(|idiom| parse_pattern(idiom.template).map(|p| (*idiom, p)))
        .collect()
});

fn slots_accept(slots: &[Slot], argc: usize) -> bool {
    if slots.contains(&Slot::Rest) {
        true
    } else {
        slots.len() == argc
    }
}

/// Place native arguments into canonical positions.
fn canonicalize(
    receiver: Option<(usize, Expr)>,
    slots: &[Slot],
    native: Vec<Expr>,
) -> Option<Vec<Expr>> {
    if slots == [Slot::Rest] {
        let mut out = Vec::new();
        if let Some((_, r)) = receiver {
            out.push(r);
        }
        out.extend(native);
        return Some(out);
    }
    let max = slots
        .iter()
        .filter_map(|s| match s {
            Slot::Arg(i) => Some(*i),
            Slot::Rest => None,
        })
        .chain(receiver.as_ref().map(|(i, _)| *i))
        .max();
    let mut out: Vec<Option<Expr>> = vec![None; max.map_or(0, |m| m + 1)];
    if let Some((i, r)) = receiver {
        out[i] = Some(r);
    }
    for (slot, arg) in slots.iter().zip(native) {
        if let Slot::Arg(i) = slot {
            out[*i] = Some(arg);
        }
    }
    out.into_iter().collect()
}

/// Recognize a free-function call (`len(x)`, `fmt.Println(a, b)`).
///
/// Returns the arguments back unchanged when nothing matches.
pub fn recognize_call(
    lang: Language,
    name: &str,
    args: Vec<Expr>,
) -> Result<(Op, Vec<Expr>), Vec<Expr>> {
    let lang = lang.idiom_family();
    let found = PATTERNS.iter().find(|(idiom, p)| {
        idiom.lang == lang
            && matches!(p, Pattern::Call { name: n, args: slots } if n == name && slots_accept(slots, args.len()))
    });
    match found {
        Some((idiom, Pattern::Call { args: slots, .. })) => {
            let op = idiom.op;
            canonicalize(None, slots, args.clone())
                .map(|canonical| (op, canonical))
                .ok_or(args)
        }
        _ => Err(args),
    }
}

/// Recognize a method call (`s.upper()`, `xs.push(v)`).
pub fn recognize_method(
    lang: Language,
    receiver: Expr,
    name: &str,
    args: Vec<Expr>,
) -> Result<(Op, Vec<Expr>), (Expr, Vec<Expr>)> {
    let lang = lang.idiom_family();
    let found = PATTERNS.iter().find(|(idiom, p)| {
        idiom.lang == lang
            && matches!(p, Pattern::Method { name: n, args: slots, .. } if n == name && slots_accept(slots, args.len()))
    });
    match found {
        Some((
            idiom,
            Pattern::Method {
                receiver: slot,
                args: slots,
                ..
            },
        )) => {
            let op = idiom.op;
            match canonicalize(Some((*slot, receiver.clone())), slots, args.clone()) {
                Some(canonical) => Ok((op, canonical)),
                None => Err((receiver, args)),
            }
        }
        _ => Err((receiver, args)),
    }
}

/// Recognize a property read (`s.length`).
pub fn recognize_property(lang: Language, name: &str) -> Option<Op> {
    let lang = lang.idiom_family();
    PATTERNS.iter().find_map(|(idiom, p)| match p {
        Pattern::Property { name: n, .. } if idiom.lang == lang && n == name => Some(idiom.op),
        _ => None,
    })
}

/// Recognize a membership test (`x in xs`).
pub fn recognize_in(lang: Language) -> Option<Op> {
    let lang = lang.idiom_family();
    PATTERNS.iter().find_map(|(idiom, p)| match p {
        Pattern::In { .. } if idiom.lang == lang => Some(idiom.op),
        _ => None,
    })
}

// ============================================================================
// Rendering
// ============================================================================

/// Find the rendering row for `op` in `lang`, preferring a receiver-specific one.
pub fn lookup(op: Op, lang: Language, receiver: Receiver) -> Option<&'static Idiom> {
    let lang = lang.idiom_family();
    let candidates: Vec<&'static Idiom> = IDIOMS
        .iter()
        .filter(|i| i.op == op && i.lang == lang && i.role == Role::Both)
        .collect();
    candidates
        .iter()
        .find(|i| i.receiver == receiver && receiver != Receiver::Any)
        .or_else(|| candidates.iter().find(|i| i.receiver == Receiver::Any))
        .copied()
}

/// Substitute rendered arguments into a template.
pub fn fill_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('*') => {
                chars.next();
                out.push_str(&args.join(", "));
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                let idx: usize = digits.parse().unwrap_or(usize::MAX);
                if let Some(arg) = args.get(idx) {
                    out.push_str(arg);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

/// Render `op` for `lang`, recording required imports. `None` when the
/// table has no form for this language.
pub fn render(
    op: Op,
    lang: Language,
    receiver: Receiver,
    args: &[String],
    imports: &mut ImportSet,
) -> Option<String> {
    let idiom = lookup(op, lang, receiver)?;
    for import in idiom.imports {
        imports.add(import);
    }
    Some(fill_template(idiom.template, args))
}

/// Imports needed by one output file, deduplicated and ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSet {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `module` or `module:item`. A `::` inside a Rust path is not a
    /// separator.
    pub fn add(&mut self, spec: &str) {
        let split = spec.char_indices().find(|&(i, c)| {
            c == ':' && !spec[..i].ends_with(':') && !spec[i + 1..].starts_with(':')
        });
        match split.map(|(i, _)| (&spec[..i], &spec[i + 1..])) {
            Some((module, item)) => {
                self.entries
                    .entry(module.to_string())
                    .or_default()
                    .insert(item.to_string());
            }
            None => {
                self.entries.entry(spec.to_string()).or_default();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Modules in order, each with its (possibly empty) item list.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.entries
            .iter()
            .map(|(m, items)| (m.as_str(), items.iter().map(String::as_str).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_op_renders_for_every_writer_language() {
        let ops = [
            Op::Print,
            Op::StrLength,
            Op::SeqLength,
            Op::Upper,
            Op::Lower,
            Op::Trim,
            Op::Contains,
            Op::StartsWith,
            Op::EndsWith,
            Op::Split,
            Op::Join,
            Op::Replace,
            Op::ToString,
            Op::ToInt,
            Op::ToFloat,
            Op::Abs,
            Op::Min,
            Op::Max,
            Op::Sqrt,
            Op::Floor,
            Op::RandomFloat,
            Op::Append,
            Op::Keys,
            Op::Values,
        ];
        for lang in Language::ALL {
            for op in ops {
                assert!(
                    lookup(op, lang, Receiver::Any).is_some(),
                    "{} has no rendering for {lang}",
                    op.name()
                );
            }
        }
    }

    #[test]
    fn test_parse_patterns() {
        assert_eq!(
            parse_pattern("strings.Join($1, $0)"),
            Some(Pattern::Call {
                name: "strings.Join".into(),
                args: vec![Slot::Arg(1), Slot::Arg(0)]
            })
        );
        assert_eq!(
            parse_pattern("$0.length"),
            Some(Pattern::Property {
                receiver: 0,
                name: "length".into()
            })
        );
        assert_eq!(
            parse_pattern("$1 in $0"),
            Some(Pattern::In {
                needle: 1,
                haystack: 0
            })
        );
        assert_eq!(parse_pattern("$0 = append($0, $1)"), None);
        assert_eq!(parse_pattern("int(math.Floor($0))"), None);
    }

    #[test]
    fn test_recognize_reorders_arguments() {
        let (op, args) = recognize_call(
            Language::Go,
            "strings.Join",
            vec![Expr::ident("parts"), Expr::string(",")],
        )
        .unwrap();
        assert_eq!(op, Op::Join);
        assert_eq!(args, vec![Expr::string(","), Expr::ident("parts")]);

        let (op, args) =
            recognize_method(Language::Python, Expr::string(","), "join", vec![Expr::ident("parts")])
                .unwrap();
        assert_eq!(op, Op::Join);
        assert_eq!(args, vec![Expr::string(","), Expr::ident("parts")]);
    }

    #[test]
    fn test_recognize_rust_and_csharp_spellings() {
        let (op, _) = recognize_method(Language::Rust, Expr::ident("xs"), "len", vec![]).unwrap();
        assert_eq!(op, Op::SeqLength);

        let (op, args) =
            recognize_method(Language::Rust, Expr::ident("parts"), "join", vec![Expr::string(",")])
                .unwrap();
        assert_eq!(op, Op::Join);
        assert_eq!(args, vec![Expr::string(","), Expr::ident("parts")]);

        let (op, _) =
            recognize_call(Language::CSharp, "Console.WriteLine", vec![Expr::ident("s")]).unwrap();
        assert_eq!(op, Op::Print);
        assert_eq!(recognize_property(Language::CSharp, "Count"), Some(Op::SeqLength));
        assert_eq!(recognize_property(Language::CSharp, "Length"), Some(Op::StrLength));
    }

    #[test]
    fn test_recognize_variadic_print() {
        let (op, args) = recognize_call(
            Language::JavaScript,
            "console.log",
            vec![Expr::int(1), Expr::int(2)],
        )
        .unwrap();
        assert_eq!(op, Op::Print);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_unknown_call_returns_args() {
        let args = recognize_call(Language::Python, "frobnicate", vec![Expr::int(1)]).unwrap_err();
        assert_eq!(args, vec![Expr::int(1)]);
    }

    #[test]
    fn test_render_prefers_receiver_row() {
        let mut imports = ImportSet::new();
        let seq = render(
            Op::Contains,
            Language::Go,
            Receiver::Seq,
            &["xs".into(), "x".into()],
            &mut imports,
        )
        .unwrap();
        assert_eq!(seq, "slices.Contains(xs, x)");
        let s = render(
            Op::Contains,
            Language::Go,
            Receiver::Str,
            &["s".into(), "\"a\"".into()],
            &mut imports,
        )
        .unwrap();
        assert_eq!(s, "strings.Contains(s, \"a\")");
        let modules: Vec<&str> = imports.iter().map(|(m, _)| m).collect();
        assert_eq!(modules, vec!["slices", "strings"]);
    }

    #[test]
    fn test_import_set_dedups() {
        let mut imports = ImportSet::new();
        imports.add("typing:Any");
        imports.add("math");
        imports.add("typing:Any");
        imports.add("typing:Callable");
        let rendered: Vec<(&str, Vec<&str>)> = imports.iter().collect();
        assert_eq!(
            rendered,
            vec![("math", vec![]), ("typing", vec!["Any", "Callable"])]
        );
    }

    #[test]
    fn test_exception_mapping() {
        assert_eq!(canonical_exception(Language::TypeScript, "RangeError"), "IndexError");
        assert_eq!(native_exception(Language::CSharp, "ValueError"), "ArgumentException");
        assert_eq!(native_exception(Language::Python, "MyError"), "MyError");
    }

    #[test]
    fn test_refine_length() {
        assert_eq!(Op::SeqLength.refine(&Type::string()), Op::StrLength);
        assert_eq!(Op::SeqLength.refine(&Type::any()), Op::SeqLength);
    }
}
