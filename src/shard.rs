//! Search shards.
//!
//! GitHub search never returns more than 1,000 results for one query, so a
//! harvest is split into half-open ranges over creation date or star count,
//! each small enough to paginate to the end.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HarvestError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardDimension {
    Created,
    Stars,
}

/// Half-open range covered by a shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShardRange {
    /// Repositories created on `from` up to, not including, `until`.
    Created { from: NaiveDate, until: NaiveDate },
    /// Repositories with `min <= stars < max`; no upper bound when `max` is `None`.
    Stars { min: u64, max: Option<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shard {
    range: ShardRange,
}

impl Shard {
    pub fn created(from: NaiveDate, until: NaiveDate) -> Result<Self> {
        if from >= until {
            return Err(HarvestError::InvalidShard(format!(
                "created range {}..{} is empty",
                from.format(DATE_FORMAT),
                until.format(DATE_FORMAT)
            )));
        }
        Ok(Self {
            range: ShardRange::Created { from, until },
        })
    }

    pub fn stars(min: u64, max: Option<u64>) -> Result<Self> {
        if let Some(max) = max {
            if min >= max {
                return Err(HarvestError::InvalidShard(format!(
                    "stars range {}..{} is empty",
                    min, max
                )));
            }
        }
        Ok(Self {
            range: ShardRange::Stars { min, max },
        })
    }

    pub fn range(&self) -> &ShardRange {
        &self.range
    }

    pub fn dimension(&self) -> ShardDimension {
        match self.range {
            ShardRange::Created { .. } => ShardDimension::Created,
            ShardRange::Stars { .. } => ShardDimension::Stars,
        }
    }

    /// Search qualifier for this shard. GitHub ranges are inclusive on both
    /// ends, so the exclusive upper bound is stepped back by one unit.
    pub fn filter(&self) -> String {
        match &self.range {
            ShardRange::Created { from, until } => {
                let last = until.pred_opt().unwrap_or(*until);
                format!(
                    "created:{}..{}",
                    from.format(DATE_FORMAT),
                    last.format(DATE_FORMAT)
                )
            }
            ShardRange::Stars { min, max: Some(max) } => format!("stars:{}..{}", min, max - 1),
            ShardRange::Stars { min, max: None } => format!("stars:>={}", min),
        }
    }

    /// Stable key identifying the shard across runs.
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Shards over different dimensions never overlap: a star band and a
    /// date window select independently.
    pub fn overlaps(&self, other: &Shard) -> bool {
        if self.dimension() != other.dimension() {
            return false;
        }
        match (self.range(), other.range()) {
            (
                ShardRange::Created { from: a, until: b },
                ShardRange::Created { from: c, until: d },
            ) => a < d && c < b,
            (ShardRange::Stars { min: a, max: b }, ShardRange::Stars { min: c, max: d }) => {
                let below_b = b.map_or(true, |b| *c < b);
                let below_d = d.map_or(true, |d| *a < d);
                below_b && below_d
            }
            _ => false,
        }
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            ShardRange::Created { from, until } => write!(
                f,
                "created:{}..{}",
                from.format(DATE_FORMAT),
                until.format(DATE_FORMAT)
            ),
            ShardRange::Stars { min, max: Some(max) } => write!(f, "stars:{}..{}", min, max),
            ShardRange::Stars { min, max: None } => write!(f, "stars:{}..", min),
        }
    }
}

impl FromStr for Shard {
    type Err = HarvestError;

    /// Parses the label form: `created:2010-01-01..2010-02-01`,
    /// `stars:100..200` or the open-ended `stars:1000..`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HarvestError::InvalidShard(format!("cannot parse shard '{}'", s));

        let (dimension, range) = s.trim().split_once(':').ok_or_else(invalid)?;
        let (lower, upper) = range.split_once("..").ok_or_else(invalid)?;

        match dimension {
            "created" => {
                let from = NaiveDate::parse_from_str(lower, DATE_FORMAT).map_err(|_| invalid())?;
                let until = NaiveDate::parse_from_str(upper, DATE_FORMAT).map_err(|_| invalid())?;
                Shard::created(from, until)
            }
            "stars" => {
                let min = lower.parse::<u64>().map_err(|_| invalid())?;
                let max = if upper.is_empty() {
                    None
                } else {
                    Some(upper.parse::<u64>().map_err(|_| invalid())?)
                };
                Shard::stars(min, max)
            }
            _ => Err(invalid()),
        }
    }
}

/// Contiguous creation-date windows of `window_days` covering `[start, end)`.
/// The final window is cut short at `end`.
pub fn date_windows(start: NaiveDate, end: NaiveDate, window_days: u32) -> Result<Vec<Shard>> {
    if window_days == 0 {
        return Err(HarvestError::InvalidShard("window must be at least one day".to_string()));
    }

    let mut shards = Vec::new();
    let mut current = start;
    while current < end {
        let next = current
            .checked_add_days(Days::new(u64::from(window_days)))
            .map_or(end, |next| next.min(end));
        shards.push(Shard::created(current, next)?);
        current = next;
    }
    Ok(shards)
}

/// Date windows covering whole calendar years `start_year..=end_year`.
pub fn yearly_date_windows(start_year: i32, end_year: i32, window_days: u32) -> Result<Vec<Shard>> {
    if start_year > end_year {
        return Err(HarvestError::InvalidShard(format!(
            "start year {} is after end year {}",
            start_year, end_year
        )));
    }
    let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
        .ok_or_else(|| HarvestError::InvalidShard(format!("invalid year {}", start_year)))?;
    let end = NaiveDate::from_ymd_opt(end_year + 1, 1, 1)
        .ok_or_else(|| HarvestError::InvalidShard(format!("invalid year {}", end_year)))?;
    date_windows(start, end, window_days)
}

/// Star bands between consecutive boundaries, plus an open-ended band from
/// the last boundary upwards.
pub fn star_bands(boundaries: &[u64]) -> Result<Vec<Shard>> {
    if boundaries.is_empty() {
        return Err(HarvestError::InvalidShard("no star boundaries given".to_string()));
    }
    if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(HarvestError::InvalidShard(format!(
            "star boundaries must be strictly increasing: {:?}",
            boundaries
        )));
    }

    let mut shards: Vec<Shard> = boundaries
        .windows(2)
        .map(|pair| Shard::stars(pair[0], Some(pair[1])))
        .collect::<Result<_>>()?;
    if let Some(last) = boundaries.last() {
        shards.push(Shard::stars(*last, None)?);
    }
    Ok(shards)
}

/// Index pairs of shards in the same dimension whose ranges intersect.
pub fn find_overlaps(shards: &[Shard]) -> Vec<(usize, usize)> {
    let mut overlaps = Vec::new();
    for (i, a) in shards.iter().enumerate() {
        for (j, b) in shards.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                overlaps.push((i, j));
            }
        }
    }
    overlaps
}
