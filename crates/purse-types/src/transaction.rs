//! Transaction candidates and confirmed transactions.
//!
//! A [`TransactionCandidate`] is what the pipeline hands to the confirmation
//! flow. Once the user accepts it, it becomes a [`ConfirmedTransaction`],
//! which is what the store persists.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of money movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money spent.
    #[default]
    Expense,
    /// Money received.
    Income,
}

impl TransactionKind {
    /// Parse the loose spelling used by AI replies ("expense", "расход", ...).
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "expense" | "expenses" | "расход" | "spend" => Some(Self::Expense),
            "income" | "доход" | "earning" => Some(Self::Income),
            _ => None,
        }
    }

    /// Sign shown in front of amounts.
    pub fn sign(self) -> char {
        match self {
            Self::Expense => '-',
            Self::Income => '+',
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expense => f.write_str("expense"),
            Self::Income => f.write_str("income"),
        }
    }
}

/// Where a candidate's category came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    /// Assigned by the AI categorization service.
    Ai,
    /// Assigned by the keyword fallback classifier.
    Fallback,
    /// Not classified yet.
    #[default]
    Unclassified,
    /// Set by the user while confirming the batch.
    Manual,
}

impl fmt::Display for CategorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ai => "ai",
            Self::Fallback => "fallback",
            Self::Unclassified => "unclassified",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// One parsed, not-yet-confirmed transaction.
///
/// `amount` is always strictly positive; the direction lives in `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionCandidate {
    /// The slice of user text this candidate was extracted from.
    pub raw_fragment: String,

    /// Absolute amount, never zero.
    pub amount: Decimal,

    /// Expense or income.
    #[serde(default)]
    pub kind: TransactionKind,

    /// Cleaned-up description. May be empty until enriched.
    #[serde(default)]
    pub description: String,

    /// Category name; `None` only before classification.
    #[serde(default)]
    pub category: Option<String>,

    /// Provenance of `category`.
    #[serde(default)]
    pub category_source: CategorySource,

    /// AI confidence in `[0, 1]`, present only when `category_source` is `Ai`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TransactionCandidate {
    /// Create an unclassified expense candidate.
    pub fn new(raw_fragment: impl Into<String>, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            raw_fragment: raw_fragment.into(),
            amount,
            kind: TransactionKind::Expense,
            description: description.into(),
            category: None,
            category_source: CategorySource::Unclassified,
            confidence: None,
        }
    }

    /// Text to classify: the description, or the raw fragment when the
    /// description is empty.
    pub fn classification_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.raw_fragment
        } else {
            &self.description
        }
    }

    /// Render for the confirmation prompt.
    pub fn format_for_user(&self) -> String {
        let description = if self.description.is_empty() {
            "(no description)"
        } else {
            &self.description
        };
        format!(
            "{description}\nCategory: {} [{}]\nAmount: {}{}",
            self.category.as_deref().unwrap_or("?"),
            self.category_source,
            self.kind.sign(),
            format_amount(self.amount),
        )
    }
}

/// A transaction the user accepted, ready for the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmedTransaction {
    /// Unique row id.
    pub id: Uuid,
    /// When the user confirmed it.
    pub recorded_at: DateTime<Utc>,
    /// Chat user that submitted the message.
    pub user_id: i64,
    /// Expense or income.
    pub kind: TransactionKind,
    /// Final category name.
    pub category: String,
    /// Final description.
    pub description: String,
    /// Absolute amount.
    pub amount: Decimal,
    /// Provenance of the category at confirmation time.
    pub category_source: CategorySource,
}

impl ConfirmedTransaction {
    /// Finalize a classified candidate.
    ///
    /// Candidates that somehow reach confirmation without a category are
    /// recorded under the reserved "Other" category.
    pub fn from_candidate(candidate: TransactionCandidate, user_id: i64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at,
            user_id,
            kind: candidate.kind,
            category: candidate
                .category
                .unwrap_or_else(|| crate::category::OTHER_CATEGORY.to_string()),
            description: candidate.description,
            amount: candidate.amount,
            category_source: candidate.category_source,
        }
    }

    /// Signed amount: negative for expenses, positive for income.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Expense => -self.amount,
            TransactionKind::Income => self.amount,
        }
    }

    /// Render the append-only row handed to spreadsheet-style stores.
    ///
    /// Columns: date, time, id, kind, category, description, amount, year,
    /// month, confirmed.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.recorded_at.format("%Y-%m-%d").to_string(),
            self.recorded_at.format("%H:%M:%S").to_string(),
            self.id.to_string(),
            self.kind.to_string(),
            self.category.clone(),
            self.description.clone(),
            self.signed_amount().to_string(),
            self.recorded_at.format("%Y").to_string(),
            self.recorded_at.format("%m").to_string(),
            "true".to_string(),
        ]
    }
}

/// Format an amount with space-separated thousands, dropping a zero
/// fractional part: `1500` -> `1 500`, `12.5` -> `12.50`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let int_part = rounded.trunc().abs();
    let frac = (rounded.abs() - int_part).normalize();

    let digits = int_part.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    if frac.is_zero() {
        format!("{sign}{grouped}")
    } else {
        let cents = (frac * Decimal::ONE_HUNDRED).trunc().to_string();
        format!("{sign}{grouped}.{cents:0>2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_candidate_is_unclassified_expense() {
        let c = TransactionCandidate::new("такси 500", dec!(500), "такси");
        assert_eq!(c.kind, TransactionKind::Expense);
        assert_eq!(c.category, None);
        assert_eq!(c.category_source, CategorySource::Unclassified);
        assert!(c.confidence.is_none());
    }

    #[test]
    fn classification_text_falls_back_to_fragment() {
        let c = TransactionCandidate::new("500", dec!(500), "");
        assert_eq!(c.classification_text(), "500");
        let c = TransactionCandidate::new("кофе 250", dec!(250), "кофе");
        assert_eq!(c.classification_text(), "кофе");
    }

    #[test]
    fn kind_parse_loose() {
        assert_eq!(TransactionKind::parse_loose("Expense"), Some(TransactionKind::Expense));
        assert_eq!(TransactionKind::parse_loose(" income "), Some(TransactionKind::Income));
        assert_eq!(TransactionKind::parse_loose("доход"), Some(TransactionKind::Income));
        assert_eq!(TransactionKind::parse_loose("transfer"), None);
    }

    #[test]
    fn format_amount_groups_thousands() {
        assert_eq!(format_amount(dec!(500)), "500");
        assert_eq!(format_amount(dec!(1500)), "1 500");
        assert_eq!(format_amount(dec!(1234567)), "1 234 567");
        assert_eq!(format_amount(dec!(12.5)), "12.50");
        assert_eq!(format_amount(dec!(1000.05)), "1 000.05");
        assert_eq!(format_amount(dec!(250.00)), "250");
    }

    #[test]
    fn format_for_user_shows_sign_and_source() {
        let mut c = TransactionCandidate::new("зарплата 100000", dec!(100000), "зарплата");
        c.kind = TransactionKind::Income;
        c.category = Some("Income".into());
        c.category_source = CategorySource::Fallback;
        let text = c.format_for_user();
        assert!(text.contains("зарплата"));
        assert!(text.contains("Income [fallback]"));
        assert!(text.contains("+100 000"));
    }

    #[test]
    fn confirmed_defaults_missing_category_to_other() {
        let c = TransactionCandidate::new("500", dec!(500), "");
        let confirmed = ConfirmedTransaction::from_candidate(c, 7, Utc::now());
        assert_eq!(confirmed.category, "Other");
        assert_eq!(confirmed.user_id, 7);
        assert_eq!(confirmed.signed_amount(), dec!(-500));
    }

    #[test]
    fn to_row_has_fixed_columns() {
        use chrono::TimeZone;

        let mut c = TransactionCandidate::new("такси 500", dec!(500), "такси");
        c.category = Some("Taxi".into());
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 18, 5, 9).unwrap();
        let row = ConfirmedTransaction::from_candidate(c, 1, at).to_row();
        assert_eq!(row.len(), 10);
        assert_eq!(row[0], "2025-03-07");
        assert_eq!(row[1], "18:05:09");
        assert_eq!(row[3], "expense");
        assert_eq!(row[4], "Taxi");
        assert_eq!(row[6], "-500");
        assert_eq!(row[7], "2025");
        assert_eq!(row[8], "03");
        assert_eq!(row[9], "true");
    }

    #[test]
    fn candidate_serde_roundtrip_keeps_decimal() {
        let c = TransactionCandidate::new("кофе 12,50", dec!(12.50), "кофе");
        let json = serde_json::to_string(&c).unwrap();
        let back: TransactionCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount, dec!(12.50));
        assert!(!json.contains("confidence"));
    }
}
