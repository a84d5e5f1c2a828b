//! Typed order records, as returned by the orders bulk query.
//!
//! Field names follow the Admin API's camelCase JSON, so the same types also
//! read and write the local order cache.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{money::Money, period::Period};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub shipping_address: Option<MailingAddress>,
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailingAddress {
    #[serde(default, rename = "countryCodeV2")]
    pub country_code: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TaxLine {
    /// The tax rate as a fraction, so 20% is `0.2`.
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub kind: TransactionKind,
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub amount_set: Option<MoneyBag>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Sale,
    Refund,
    Authorization,
    Capture,
    Change,
    Void,
    EmvAuthorization,
    SuggestedRefund,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failure,
    Pending,
    Error,
    AwaitingResponse,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyBag {
    pub shop_money: MoneyV2,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyV2 {
    pub amount: Money,
    #[serde(default)]
    pub currency_code: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unfulfilled_quantity: i64,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product: Option<Product>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Product {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Transaction {
    /// Returns this transaction's signed contribution to turnover.
    ///
    /// Only successful transactions count: sales add their amount and
    /// refunds subtract it. Every other kind of transaction contributes
    /// nothing.
    #[must_use]
    pub fn amount(&self) -> Money {
        if self.status != TransactionStatus::Success {
            return Money::ZERO;
        }
        let amount = self
            .amount_set
            .as_ref()
            .map_or(Money::ZERO, |set| set.shop_money.amount);
        match self.kind {
            TransactionKind::Sale => amount,
            TransactionKind::Refund => -amount,
            _ => Money::ZERO,
        }
    }
}

impl Order {
    /// Sums the amounts of this order's live transactions processed during
    /// `period`, optionally only those of a single `kind`.
    ///
    /// Test transactions are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction that would be counted has no
    /// processing time.
    pub fn sum_transactions(
        &self,
        kind: Option<TransactionKind>,
        period: &Period,
    ) -> Result<Money> {
        let mut total = Money::ZERO;
        for t in &self.transactions {
            if t.test || kind.is_some_and(|k| k != t.kind) {
                continue;
            }
            let processed_at = t
                .processed_at
                .ok_or_else(|| anyhow!("order {}: transaction has no processing time", self.name))?;
            if period.contains(processed_at) {
                total += t.amount();
            }
        }
        Ok(total)
    }

    /// Returns the order's tax-inclusive turnover during `period`: sales
    /// less refunds.
    ///
    /// # Errors
    ///
    /// See [`Order::sum_transactions`].
    pub fn turnover(&self, period: &Period) -> Result<Money> {
        self.sum_transactions(None, period)
    }

    /// Returns the combined rate of all the order's tax lines, or `None` if
    /// no tax was charged.
    #[must_use]
    pub fn tax_rate(&self) -> Option<Decimal> {
        self.tax_lines
            .iter()
            .filter_map(|line| line.rate)
            .reduce(|a, b| a + b)
    }

    /// Returns the order's turnover during `period` with tax removed,
    /// rounded to cents.
    ///
    /// # Errors
    ///
    /// See [`Order::sum_transactions`].
    pub fn net_turnover(&self, period: &Period) -> Result<Money> {
        let gross = self.turnover(period)?;
        Ok(match self.tax_rate() {
            Some(rate) => gross.excluding_tax(rate),
            None => gross,
        })
    }

    #[must_use]
    pub fn country_code(&self) -> Option<&str> {
        self.shipping_address
            .as_ref()
            .and_then(|address| address.country_code.as_deref())
    }

    /// Returns the distinct product tags of all line items, lower-cased, in
    /// the order they first appear.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        unique(self.line_items.iter().flat_map(LineItem::tags))
    }

    /// Returns the distinct vendors of all line items, in the form given by
    /// [`LineItem::vendor_key`].
    #[must_use]
    pub fn vendors(&self) -> Vec<String> {
        unique(self.line_items.iter().map(LineItem::vendor_key))
    }
}

impl LineItem {
    #[must_use]
    pub fn fulfilled_quantity(&self) -> i64 {
        (self.quantity - self.unfulfilled_quantity).max(0)
    }

    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.product
            .iter()
            .flat_map(|p| &p.tags)
            .map(|tag| tag.to_lowercase())
            .collect()
    }

    /// Returns the trimmed, lower-cased vendor name, or an empty string if the
    /// line item has no vendor.
    #[must_use]
    pub fn vendor_key(&self) -> String {
        self.vendor
            .as_deref()
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_default()
    }
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}
