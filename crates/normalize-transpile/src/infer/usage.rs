//! Per-variable usage facts and the types they suggest.

use super::callgraph::FunctionId;
use super::env::Signatures;
use crate::ir::Type;
use std::collections::BTreeSet;

/// How a variable is used inside one function body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageFacts {
    /// Operand of an arithmetic or ordering operator.
    pub arithmetic: bool,
    /// Join of the numeric types it was combined with.
    pub numeric_partner: Type,
    /// Concatenated with a string.
    pub string_partner: bool,
    /// Property and method names read from it.
    pub properties: BTreeSet<String>,
    pub indexed: bool,
    pub iterated: bool,
    /// Direct evidence from operations and index writes.
    pub hint: Type,
    /// Passed as argument `n` to a resolved function.
    pub call_positions: BTreeSet<(FunctionId, usize)>,
}

impl UsageFacts {
    pub fn is_empty(&self) -> bool {
        *self == UsageFacts::default()
    }

    /// Best type the usage supports; `Any` when nothing does.
    pub fn suggest(&self, sigs: &Signatures, structural: bool) -> Type {
        if !self.hint.is_any() {
            return self.hint.clone();
        }
        let from_calls = Type::join_all(
            self.call_positions
                .iter()
                .filter_map(|(id, i)| id.sig(sigs)?.params.get(*i)),
        );
        if from_calls.is_resolved() {
            return from_calls;
        }
        if self.string_partner {
            return Type::string();
        }
        if self.arithmetic {
            return if self.numeric_partner.is_numeric() {
                self.numeric_partner.clone()
            } else {
                Type::float()
            };
        }
        if structural
            && !self.properties.is_empty()
            && let Some(class) = match_class(sigs, &self.properties)
        {
            return Type::named(class);
        }
        if self.iterated {
            return Type::seq(Type::any());
        }
        Type::any()
    }
}

/// The single class whose members cover every accessed name.
pub fn match_class(sigs: &Signatures, accessed: &BTreeSet<String>) -> Option<String> {
    let mut candidates = sigs.classes.keys().filter(|class| {
        accessed.iter().all(|name| {
            sigs.property(class, name).is_some() || sigs.method(class, name).is_some()
        })
    });
    let first = candidates.next()?;
    // Ambiguous matches stay dynamic, unless every other candidate derives
    // from the first one.
    let ambiguous = candidates.any(|other| !derives_from(sigs, other, first));
    (!ambiguous).then(|| first.clone())
}

fn derives_from(sigs: &Signatures, class: &str, ancestor: &str) -> bool {
    let mut current = sigs.classes.get(class).and_then(|c| c.base.as_deref());
    let mut depth = 0;
    while let Some(name) = current {
        if name == ancestor {
            return true;
        }
        current = sigs.classes.get(name).and_then(|c| c.base.as_deref());
        depth += 1;
        if depth > sigs.classes.len() {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::env::ClassSig;

    fn sigs() -> Signatures {
        let mut sigs = Signatures::default();
        let mut point = ClassSig::default();
        point.properties.insert("x".into(), Type::float());
        point.properties.insert("y".into(), Type::float());
        sigs.classes.insert("Point".into(), point);
        let mut user = ClassSig::default();
        user.properties.insert("name".into(), Type::string());
        sigs.classes.insert("User".into(), user);
        sigs
    }

    #[test]
    fn test_structural_match() {
        let facts = UsageFacts {
            properties: ["x".to_string(), "y".to_string()].into(),
            ..UsageFacts::default()
        };
        assert_eq!(facts.suggest(&sigs(), true), Type::named("Point"));
        assert_eq!(facts.suggest(&sigs(), false), Type::any());
    }

    #[test]
    fn test_no_match_stays_dynamic() {
        let facts = UsageFacts {
            properties: ["x".to_string(), "name".to_string()].into(),
            ..UsageFacts::default()
        };
        assert_eq!(facts.suggest(&sigs(), true), Type::any());
    }

    #[test]
    fn test_arithmetic_defaults_to_float() {
        let facts = UsageFacts {
            arithmetic: true,
            ..UsageFacts::default()
        };
        assert_eq!(facts.suggest(&sigs(), true), Type::float());
        let facts = UsageFacts {
            arithmetic: true,
            numeric_partner: Type::int(),
            ..UsageFacts::default()
        };
        assert_eq!(facts.suggest(&sigs(), true), Type::int());
    }

    #[test]
    fn test_hint_wins() {
        let facts = UsageFacts {
            arithmetic: true,
            hint: Type::string(),
            ..UsageFacts::default()
        };
        assert_eq!(facts.suggest(&sigs(), true), Type::string());
        assert!(UsageFacts::default().is_empty());
    }
}
