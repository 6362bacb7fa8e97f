//! Category catalog.
//!
//! The catalog is loaded once at startup (from config or the built-in
//! defaults) and is immutable for the rest of the run. Declaration order is
//! significant: the fallback classifier breaks keyword-length ties by it.

use serde::{Deserialize, Serialize};

use crate::error::{PurseError, Result};
use crate::transaction::TransactionKind;

/// Reserved category used when nothing else matches.
pub const OTHER_CATEGORY: &str = "Other";

/// A spending or income category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    /// Stable machine identifier (e.g. "food").
    pub code: String,

    /// Unique display name (e.g. "Food").
    pub name: String,

    /// Whether this category records expenses or income.
    #[serde(default)]
    pub kind: TransactionKind,

    /// Substrings that select this category in the fallback classifier.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Alternative names accepted from the AI service and from user edits.
    /// Aliases also act as fallback keywords.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Category {
    fn new(code: &str, name: &str, kind: TransactionKind, keywords: &[&str], aliases: &[&str]) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            keywords: keywords.iter().map(|s| (*s).to_string()).collect(),
            aliases: aliases.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Keywords followed by aliases, in declaration order.
    pub fn match_terms(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().chain(self.aliases.iter()).map(String::as_str)
    }

    fn answers_to(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase() == needle_lower
            || self.code.to_lowercase() == needle_lower
            || self.aliases.iter().any(|a| a.to_lowercase() == needle_lower)
    }
}

/// Ordered, immutable set of categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    /// Build a catalog, rejecting duplicate names and the reserved name.
    pub fn new(categories: Vec<Category>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for cat in &categories {
            let key = cat.name.to_lowercase();
            if key.is_empty() {
                return Err(PurseError::ConfigInvalid {
                    reason: format!("category '{}' has an empty name", cat.code),
                });
            }
            if key == OTHER_CATEGORY.to_lowercase() {
                return Err(PurseError::ConfigInvalid {
                    reason: format!("'{OTHER_CATEGORY}' is reserved and cannot be declared"),
                });
            }
            if !seen.insert(key) {
                return Err(PurseError::ConfigInvalid {
                    reason: format!("duplicate category name '{}'", cat.name),
                });
            }
        }
        Ok(Self { categories })
    }

    /// The built-in catalog: income first, then expense categories.
    pub fn builtin() -> Self {
        use TransactionKind::{Expense, Income};
        let categories = vec![
            Category::new(
                "income",
                "Income",
                Income,
                &["зарплата", "получил", "доход", "заработал", "премия", "перевод от", "salary", "paycheck", "bonus"],
                &["Доход"],
            ),
            Category::new(
                "food",
                "Food",
                Expense,
                &[
                    "продукты", "доставка", "ресторан", "кафе", "магазин", "пятёрочка", "обед", "ужин",
                    "завтрак", "кофе", "groceries", "lunch", "dinner", "breakfast", "coffee", "restaurant",
                ],
                &["Еда"],
            ),
            Category::new(
                "housing",
                "Housing",
                Expense,
                &["аренда", "жкх", "коммуналка", "интернет", "мебель", "ремонт", "rent", "utilities"],
                &["Жильё и быт"],
            ),
            Category::new(
                "taxi",
                "Taxi",
                Expense,
                &["такси", "uber", "яндекс такси", "каршеринг", "taxi", "cab"],
                &["Такси"],
            ),
            Category::new(
                "health",
                "Health",
                Expense,
                &["аптека", "врач", "клиника", "лекарства", "анализы", "pharmacy", "doctor"],
                &["Здоровье"],
            ),
            Category::new(
                "entertainment",
                "Entertainment",
                Expense,
                &["кино", "игры", "концерт", "бар", "cinema", "movie", "concert"],
                &["Развлечения"],
            ),
            Category::new("clothes", "Clothes", Expense, &["одежда", "обувь", "clothes", "shoes"], &["Одежда"]),
            Category::new(
                "subscriptions",
                "Subscriptions",
                Expense,
                &["подписка", "youtube premium", "icloud", "netflix", "spotify", "subscription"],
                &["Подписки"],
            ),
            Category::new("gifts", "Gifts", Expense, &["подарок", "день рождения", "gift"], &["Подарки"]),
        ];
        Self { categories }
    }

    /// Categories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    /// Category names in declaration order, without the reserved one.
    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of declared categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// `true` when no categories are declared (everything becomes "Other").
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Look up a category by name, code or alias, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Category> {
        let needle = name.trim().to_lowercase();
        self.categories.iter().find(|c| c.answers_to(&needle))
    }

    /// Resolve free text to a canonical category name.
    ///
    /// Accepts declared names, codes and aliases, plus the reserved
    /// "Other" (also spelled "Прочее").
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(cat) = self.get(name) {
            return Some(cat.name.as_str());
        }
        let needle = name.trim().to_lowercase();
        if needle == "other" || needle == "прочее" {
            return Some(OTHER_CATEGORY);
        }
        None
    }

    /// Kind recorded under `name`; the reserved category is an expense.
    pub fn kind_of(&self, name: &str) -> TransactionKind {
        self.get(name).map(|c| c.kind).unwrap_or(TransactionKind::Expense)
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
