use anyhow::Result;
use clap::ValueEnum;

use std::fmt::Display;

use crate::{money::Money, order::Order, period::Period};

pub const DEFAULT_HOME_COUNTRY: &str = "GB";

pub const EU_COUNTRY_CODES: [&str; 28] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GB", "GR", "HR", "HU", "IE",
    "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

#[must_use]
pub fn is_in_european_union(country_code: &str) -> bool {
    EU_COUNTRY_CODES.contains(&country_code)
}

/// Returns the total turnover during `period`, including VAT.
///
/// # Errors
///
/// Returns any error from summing an order's transactions.
pub fn total_turnover(orders: &[Order], period: &Period) -> Result<Money> {
    orders.iter().map(|o| o.turnover(period)).sum()
}

/// Returns the total turnover during `period`, excluding VAT.
///
/// # Errors
///
/// Returns any error from summing an order's transactions.
pub fn net_turnover(orders: &[Order], period: &Period) -> Result<Money> {
    orders.iter().map(|o| o.net_turnover(period)).sum()
}

/// Returns the turnover during `period`, excluding VAT, of orders shipped to
/// EU countries other than `home_country`.
///
/// # Errors
///
/// Returns any error from summing an order's transactions.
pub fn eu_sales(orders: &[Order], period: &Period, home_country: &str) -> Result<Money> {
    orders
        .iter()
        .filter(|o| {
            o.country_code()
                .is_some_and(|cc| cc != home_country && is_in_european_union(cc))
        })
        .map(|o| o.net_turnover(period))
        .sum()
}

/// VAT accounting schemes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Scheme {
    /// Flat rate scheme
    Flat,
}

/// The figures needed for a flat rate scheme VAT return.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct FlatRateReturn {
    /// Total turnover, including VAT and EC sales (box 6).
    pub turnover: Money,
    /// Total value of EC sales, excluding VAT (box 8).
    pub eu_sales: Money,
}

impl FlatRateReturn {
    /// # Errors
    ///
    /// Returns any error from summing an order's transactions.
    pub fn compute(orders: &[Order], period: &Period, home_country: &str) -> Result<Self> {
        Ok(Self {
            turnover: total_turnover(orders, period)?,
            eu_sales: eu_sales(orders, period, home_country)?,
        })
    }
}

impl Display for FlatRateReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Total turnover, including VAT and EC sales (box 6): {}",
            self.turnover
        )?;
        writeln!(
            f,
            "Total value of EC sales, excluding VAT (box 8): {}",
            self.eu_sales
        )
    }
}
