use anyhow::{Context, Result};
use rust_decimal::Decimal;

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::Path,
};

use crate::{
    groups::Groups,
    money::Money,
    order::{LineItem, Order, TransactionKind},
    period::Period,
};

const NO_VENDOR: &str = "(no vendor)";

/// What a [`Report`] breaks sales down by.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dimension {
    Tag,
    Vendor,
}

impl Dimension {
    fn keys(self, order: &Order) -> Vec<String> {
        match self {
            Self::Tag => order.tags(),
            Self::Vendor => order.vendors(),
        }
    }

    fn item_has_key(self, item: &LineItem, key: &str) -> bool {
        match self {
            Self::Tag => item.tags().iter().any(|t| t == key),
            Self::Vendor => item.vendor_key() == key,
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::Tag => "Tag",
            Self::Vendor => "Vendor",
        }
    }

    fn label(self, key: &str) -> String {
        match self {
            Self::Tag => key.to_string(),
            Self::Vendor if key.is_empty() => NO_VENDOR.to_string(),
            Self::Vendor => title_case(key),
        }
    }
}

/// Holds sales figures, broken down by product tag or by vendor.
///
/// To create a new, empty `Report`, use [`Report::new`].
///
/// To add group configuration, use [`Report::add_group`] or [`Report::read_groups`].
///
/// To add order data, use [`Report::add_orders`].
///
/// To get a printable version of the report, use its [`Display`] implementation.
/// To export it, use [`Report::write_csv`].
#[derive(Debug)]
pub struct Report {
    dimension: Dimension,
    groups: Groups,
    only: Vec<String>,
    rows: BTreeMap<String, Stat>,
    pub sort_by_revenue: bool,
}

/// Holds sales figures for one tag, vendor, or group.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Stat {
    pub orders: usize,
    pub fulfilled: i64,
    pub revenue: Money,
    /// Refunds, as a negative amount.
    pub refunded: Money,
}

impl Stat {
    /// Returns refunds as a percentage of revenue.
    #[must_use]
    pub fn refund_ratio(&self) -> Decimal {
        self.refunded.abs().percent_of(self.revenue)
    }
}

impl Report {
    /// Creates a new, empty report with no data or group configuration.
    #[must_use]
    pub fn new(dimension: Dimension) -> Report {
        Self {
            dimension,
            groups: Groups::default(),
            only: Vec::new(),
            rows: BTreeMap::new(),
            sort_by_revenue: false,
        }
    }

    /// Limits the report to the given tags or vendors. Matching ignores case.
    pub fn restrict_to<S: AsRef<str>>(&mut self, keys: &[S]) {
        self.only = keys
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .collect();
    }

    /// Reads group configuration from `path`. See [`Groups::from_file`].
    ///
    /// # Errors
    ///
    /// Returns any errors from reading the group configuration.
    pub fn read_groups(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.groups = Groups::from_file(path)?;
        Ok(())
    }

    /// Adds a new group configuration.
    ///
    /// Tags or vendors matching `regex_str` will be reported together as
    /// group `name`.
    ///
    /// # Errors
    ///
    /// Returns any errors from compiling `regex_str`.
    pub fn add_group(&mut self, name: &str, regex_str: &str) -> Result<()> {
        self.groups.add(name, regex_str)
    }

    /// Returns the row label for `key`: its group name, if it belongs to a
    /// group, or else the key formatted for display.
    #[must_use]
    pub fn label(&self, key: &str) -> String {
        self.groups
            .group_for(key)
            .map_or_else(|| self.dimension.label(key), |name| name.to_string())
    }

    /// Adds the sales of `orders` during `period` to the report.
    ///
    /// Each order counts once towards every tag or vendor it has, and its
    /// whole revenue and refunds are credited to each of them. Items
    /// fulfilled only count line items carrying the tag or vendor.
    ///
    /// # Errors
    ///
    /// Returns any error from summing an order's transactions.
    pub fn add_orders(&mut self, orders: &[Order], period: &Period) -> Result<()> {
        for order in orders {
            let mut labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for key in self.dimension.keys(order) {
                if !self.only.is_empty() && !self.only.contains(&key) {
                    continue;
                }
                labels.entry(self.label(&key)).or_default().push(key);
            }
            if labels.is_empty() {
                continue;
            }
            let revenue = order.sum_transactions(Some(TransactionKind::Sale), period)?;
            let refunded = order.sum_transactions(Some(TransactionKind::Refund), period)?;
            for (label, keys) in labels {
                let fulfilled: i64 = order
                    .line_items
                    .iter()
                    .filter(|item| keys.iter().any(|k| self.dimension.item_has_key(item, k)))
                    .map(LineItem::fulfilled_quantity)
                    .sum();
                let stat = self.rows.entry(label).or_default();
                stat.orders += 1;
                stat.fulfilled += fulfilled;
                stat.revenue += revenue;
                stat.refunded += refunded;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Stat> {
        self.rows.get(label)
    }

    #[must_use]
    /// Returns row labels sorted by items fulfilled, descending.
    ///
    /// Rows with identical figures are sorted alphabetically.
    pub fn labels_by_fulfilled(&self) -> Vec<&str> {
        let mut labels: Vec<_> = self.rows.iter().collect();
        labels.sort_by(|(_, a), (_, b)| b.fulfilled.cmp(&a.fulfilled));
        labels.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    #[must_use]
    /// Returns row labels sorted by revenue, descending.
    ///
    /// Rows with identical revenue are sorted alphabetically.
    pub fn labels_by_revenue(&self) -> Vec<&str> {
        let mut labels: Vec<_> = self.rows.iter().collect();
        labels.sort_by(|(_, a), (_, b)| b.revenue.cmp(&a.revenue));
        labels.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    fn sorted_labels(&self) -> Vec<&str> {
        if self.sort_by_revenue {
            self.labels_by_revenue()
        } else {
            self.labels_by_fulfilled()
        }
    }

    fn headers(&self) -> [&'static str; 6] {
        [
            self.dimension.heading(),
            "Orders Count",
            "Items Fulfilled",
            "Revenue",
            "Refunded",
            "Refund Ratio",
        ]
    }

    /// Returns the report as rows of display strings, in sorted order.
    #[must_use]
    pub fn rows(&self) -> Vec<[String; 6]> {
        self.sorted_labels()
            .into_iter()
            .filter_map(|label| self.rows.get(label).map(|stat| (label, stat)))
            .map(|(label, stat)| {
                [
                    label.to_string(),
                    stat.orders.to_string(),
                    stat.fulfilled.to_string(),
                    stat.revenue.to_string(),
                    format!("({})", -stat.refunded),
                    format!("{}%", Money::new(stat.refund_ratio())),
                ]
            })
            .collect()
    }

    /// Writes the report to a CSV file at `path`.
    ///
    /// # Errors
    ///
    /// Returns any errors from creating or writing the file.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        wtr.write_record(self.headers())?;
        for row in self.rows() {
            wtr.write_record(&row)?;
        }
        wtr.flush()
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers = self.headers();
        let rows = self.rows();
        let mut widths = headers.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }
        let [w0, w1, w2, w3, w4, w5] = widths;
        writeln!(
            f,
            "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}  {:>w4$}  {:>w5$}",
            headers[0], headers[1], headers[2], headers[3], headers[4], headers[5]
        )?;
        let length = widths.iter().sum::<usize>() + 10;
        writeln!(f, "{:-<length$}", "")?;
        for [name, orders, fulfilled, revenue, refunded, ratio] in &rows {
            writeln!(
                f,
                "{name:<w0$}  {orders:>w1$}  {fulfilled:>w2$}  {revenue:>w3$}  {refunded:>w4$}  {ratio:>w5$}"
            )?;
        }
        Ok(())
    }
}

/// Capitalises the first letter of each word. Any character that isn't a
/// letter or digit starts a new word.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !c.is_alphanumeric();
    }
    out
}
