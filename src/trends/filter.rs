//! Filter specification over bucket summaries.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::aggregate::AggregateSummary;
use crate::error::ValidationError;

/// Value meaning "no filter" for provider and location selectors.
pub const ALL: &str = "all";

/// Filter input as it arrives from a caller: every field optional, dates as
/// `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    pub provider: Option<String>,
    pub location: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

/// Validated filter. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub provider: Option<String>,
    /// `"{latBucket},{lonBucket}"`, matched exactly.
    pub location: Option<String>,
    /// Inclusive.
    pub from_date: Option<NaiveDate>,
    /// Inclusive.
    pub to_date: Option<NaiveDate>,
}

impl FilterSpec {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = selector(Some(provider.into()));
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = selector(Some(location.into()));
        self
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from_date = from;
        self.to_date = to;
        self
    }

    pub fn matches(&self, summary: &AggregateSummary) -> bool {
        let key = &summary.key;

        if let Some(provider) = &self.provider {
            if &key.provider != provider {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if &key.location_key() != location {
                return false;
            }
        }
        if self.from_date.is_some_and(|from| key.date < from) {
            return false;
        }
        if self.to_date.is_some_and(|to| key.date > to) {
            return false;
        }
        true
    }
}

impl TryFrom<FilterQuery> for FilterSpec {
    type Error = ValidationError;

    fn try_from(query: FilterQuery) -> Result<Self, Self::Error> {
        Ok(FilterSpec {
            provider: selector(query.provider),
            location: selector(query.location),
            from_date: parse_date("fromDate", query.from_date)?,
            to_date: parse_date("toDate", query.to_date)?,
        })
    }
}

/// Blank and `"all"` selectors mean no filter.
fn selector(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != ALL)
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, ValidationError> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| {
            ValidationError::InvalidFilter(format!("{field} must be YYYY-MM-DD, got {value:?}"))
        })
}

/// Summaries matching `spec`. An empty result is not an error.
pub fn filter(summaries: &[AggregateSummary], spec: &FilterSpec) -> Vec<AggregateSummary> {
    summaries
        .iter()
        .filter(|s| spec.matches(s))
        .cloned()
        .collect()
}

/// Orders summaries by date, hour, provider, then grid cell.
pub fn sort_chronologically(summaries: &mut [AggregateSummary]) {
    summaries.sort_by(|a, b| {
        (a.key.date, a.key.hour, &a.key.provider, a.key.cell)
            .cmp(&(b.key.date, b.key.hour, &b.key.provider, b.key.cell))
    });
}
