use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use std::fmt::Display;

const DATE_FORMAT: &str = "%Y-%m-%d";
const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// An inclusive range of time covering whole UTC days.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Period {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Period {
    /// Parses a period from its start and end dates, in `YYYY-MM-DD` format.
    ///
    /// The period starts at the very beginning of the `from` day and ends at
    /// the very last nanosecond of the `to` day.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * `dates` does not contain exactly two dates
    /// * either date is invalid
    /// * `from` is later than `to`
    pub fn parse<S: AsRef<str>>(dates: &[S]) -> Result<Self> {
        let [from, to] = dates else {
            bail!("expected `from` and `to` period dates");
        };
        let from = NaiveDate::parse_from_str(from.as_ref(), DATE_FORMAT)
            .with_context(|| format!("error parsing `from` date {:?}", from.as_ref()))?;
        let to = NaiveDate::parse_from_str(to.as_ref(), DATE_FORMAT)
            .with_context(|| format!("error parsing `to` date {:?}", to.as_ref()))?;
        if from > to {
            bail!("period starts ({from}) after it ends ({to})");
        }
        Self::between(from, to)
    }

    /// Creates the period from the start of `from` to the end of `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds cannot be represented.
    pub fn between(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        let start = from
            .and_hms_opt(0, 0, 0)
            .context("invalid start of period")?;
        let end = to
            .and_hms_nano_opt(23, 59, 59, 999_999_999)
            .context("invalid end of period")?;
        Ok(Self {
            from: start.and_utc(),
            to: end.and_utc(),
        })
    }

    /// Reports whether `instant` falls inside the period, bounds included.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant <= self.to
    }

    /// Returns the orders search filter selecting every order created,
    /// updated or processed during the period.
    #[must_use]
    pub fn search_query(&self) -> String {
        let from = self.from.format(QUERY_TIME_FORMAT);
        let to = self.to.format(QUERY_TIME_FORMAT);
        format!(
            "(created_at:>='{from}' created_at:<='{to}') \
             OR (updated_at:>='{from}' updated_at:<='{to}') \
             OR (processed_at:>='{from}' processed_at:<='{to}')"
        )
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.from, self.to)
    }
}
