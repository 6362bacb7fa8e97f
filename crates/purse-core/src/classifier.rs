//! Keyword fallback classifier.
//!
//! Used whenever the AI categorization service is unavailable. Scans the
//! candidate text for every catalog keyword and alias, case-insensitively,
//! and picks the longest match. Ties go to the category declared first, so
//! the catalog order doubles as a priority list. When nothing matches the
//! candidate lands in [`OTHER_CATEGORY`].
//!
//! The classifier is pure and never fails.

use std::sync::Arc;

use purse_types::{CategoryCatalog, OTHER_CATEGORY, TransactionKind};

/// Result of a fallback classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Canonical category name.
    pub category: String,
    /// Kind of that category.
    pub kind: TransactionKind,
    /// The keyword that decided it, if any.
    pub matched_keyword: Option<String>,
}

impl Classification {
    fn other() -> Self {
        Self {
            category: OTHER_CATEGORY.to_string(),
            kind: TransactionKind::Expense,
            matched_keyword: None,
        }
    }
}

/// A category's lowercased match terms, precomputed once.
struct Entry {
    category: String,
    kind: TransactionKind,
    terms: Vec<String>,
}

/// Keyword classifier over a fixed catalog.
pub struct FallbackClassifier {
    catalog: Arc<CategoryCatalog>,
    entries: Vec<Entry>,
}

impl FallbackClassifier {
    /// Build a classifier for `catalog`.
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        let entries = catalog
            .iter()
            .map(|cat| Entry {
                category: cat.name.clone(),
                kind: cat.kind,
                terms: cat
                    .match_terms()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
            })
            .collect();
        Self { catalog, entries }
    }

    /// The catalog this classifier matches against.
    pub fn catalog(&self) -> &Arc<CategoryCatalog> {
        &self.catalog
    }

    /// Classify free text.
    pub fn classify(&self, text: &str) -> Classification {
        let haystack = text.to_lowercase();
        let mut best: Option<(&Entry, &str, usize)> = None;

        for entry in &self.entries {
            for term in &entry.terms {
                if !haystack.contains(term.as_str()) {
                    continue;
                }
                let len = term.chars().count();
                // Strictly longer only: earlier categories win ties.
                if best.is_none_or(|(_, _, best_len)| len > best_len) {
                    best = Some((entry, term.as_str(), len));
                }
            }
        }

        match best {
            Some((entry, term, _)) => Classification {
                category: entry.category.clone(),
                kind: entry.kind,
                matched_keyword: Some(term.to_string()),
            },
            None => Classification::other(),
        }
    }
}

/// One-off classification without building a [`FallbackClassifier`].
pub fn classify(text: &str, catalog: &CategoryCatalog) -> Classification {
    FallbackClassifier::new(Arc::new(catalog.clone())).classify(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use purse_types::Category;

    fn builtin() -> FallbackClassifier {
        FallbackClassifier::new(Arc::new(CategoryCatalog::builtin()))
    }

    fn category(code: &str, name: &str, kind: TransactionKind, keywords: &[&str]) -> Category {
        Category {
            code: code.into(),
            name: name.into(),
            kind,
            keywords: keywords.iter().map(|s| (*s).to_string()).collect(),
            aliases: vec![],
        }
    }

    #[test]
    fn matches_simple_keyword() {
        let c = builtin().classify("такси до дома");
        assert_eq!(c.category, "Taxi");
        assert_eq!(c.kind, TransactionKind::Expense);
        assert_eq!(c.matched_keyword.as_deref(), Some("такси"));
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(builtin().classify("ТАКСИ").category, "Taxi");
        assert_eq!(builtin().classify("Coffee with Bob").category, "Food");
    }

    #[test]
    fn income_keywords() {
        let c = builtin().classify("зарплата за март");
        assert_eq!(c.category, "Income");
        assert_eq!(c.kind, TransactionKind::Income);
    }

    #[test]
    fn longest_keyword_wins() {
        // "яндекс такси" beats "такси" even though both belong to Taxi;
        // "подписка" (8) beats "кино" (4) across categories.
        let c = builtin().classify("яндекс такси");
        assert_eq!(c.matched_keyword.as_deref(), Some("яндекс такси"));
        assert_eq!(builtin().classify("подписка на кино").category, "Subscriptions");
    }

    #[test]
    fn tie_goes_to_earlier_category() {
        let catalog = CategoryCatalog::new(vec![
            category("a", "Alpha", TransactionKind::Expense, &["abcd"]),
            category("b", "Beta", TransactionKind::Expense, &["wxyz"]),
        ])
        .unwrap();
        let c = classify("wxyz abcd", &catalog);
        assert_eq!(c.category, "Alpha");
    }

    #[test]
    fn income_declared_first_wins_tie() {
        // "получил" (7) vs "подарок" (7): Income is declared before Gifts.
        assert_eq!(builtin().classify("получил подарок").category, "Income");
    }

    #[test]
    fn aliases_act_as_keywords() {
        assert_eq!(builtin().classify("прочие расходы на здоровье").category, "Health");
    }

    #[test]
    fn no_match_is_other() {
        let c = builtin().classify("что-то непонятное");
        assert_eq!(c.category, OTHER_CATEGORY);
        assert_eq!(c.kind, TransactionKind::Expense);
        assert!(c.matched_keyword.is_none());
    }

    #[test]
    fn empty_catalog_always_other() {
        let catalog = CategoryCatalog::new(vec![]).unwrap();
        assert_eq!(classify("такси", &catalog).category, OTHER_CATEGORY);
    }

    #[test]
    fn empty_text_is_other() {
        assert_eq!(builtin().classify("").category, OTHER_CATEGORY);
    }
}
