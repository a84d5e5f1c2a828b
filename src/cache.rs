use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use crate::{order::Order, period::Period};

pub const DEFAULT_CACHE_FILE: &str = ".cache.json";

/// A local JSON copy of the orders fetched for a period.
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
}

#[derive(Deserialize, Serialize)]
struct CacheFile {
    #[serde(flatten)]
    period: Period,
    orders: Vec<Order>,
}

impl Cache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached orders for `period`, or `None` if nothing is cached
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file exists but cannot be read or
    /// decoded.
    pub fn read(&self, period: &Period) -> Result<Option<Vec<Order>>> {
        if !self.path.exists() {
            debug!("no order cache at {}", self.path.display());
            return Ok(None);
        }
        let file = File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let cached: CacheFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("reading {}", self.path.display()))?;
        if cached.period != *period {
            warn!(
                "Ignoring cached orders for a different period ({})",
                cached.period
            );
            return Ok(None);
        }
        Ok(Some(cached.orders))
    }

    /// Replaces the cache contents with `orders` fetched for `period`.
    ///
    /// The new contents go to a temporary file next to the cache, which is
    /// then renamed over it, so a failed write leaves the old cache intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub fn write(&self, period: &Period, orders: &[Order]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temporary file in {}", dir.display()))?;
        let mut wtr = BufWriter::new(tmp);
        serde_json::to_writer(
            &mut wtr,
            &CacheFile {
                period: *period,
                orders: orders.to_vec(),
            },
        )
        .with_context(|| format!("writing {}", self.path.display()))?;
        let tmp = wtr.into_inner().map_err(|e| e.into_error())?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
