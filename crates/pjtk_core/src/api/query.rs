//! URL query decoding for list endpoints.
//!
//! List values are comma separated (`lake=HU,ER`). Malformed numbers and dates
//! are rejected; malformed geometry is ignored so that a bad map selection
//! degrades to an unfiltered list.

use super::{ApiError, ApiResult};
use crate::geo::{parse_buffered_point, parse_region, Region};
use crate::repo::filter::{ProjectFilter, SpatialFilter, SpatialPredicate};
use crate::repo::report_repo::ReportFilter;
use crate::service::spatial_service::{RoiMode, RoiQuery};
use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Decoded `key=value` pairs of one request. A repeated key keeps its last
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds params from already percent-decoded pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { values }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn number<T: FromStr>(&self, key: &str) -> ApiResult<Option<T>> {
        self.get(key)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| ApiError::BadRequest(format!("`{key}` must be a number")))
            })
            .transpose()
    }

    pub fn numbers<T: FromStr>(&self, key: &str) -> ApiResult<Vec<T>> {
        self.list(key)
            .iter()
            .map(|value| {
                value.parse::<T>().map_err(|_| {
                    ApiError::BadRequest(format!("`{key}` must be a comma separated list of numbers"))
                })
            })
            .collect()
    }

    pub fn date(&self, key: &str) -> ApiResult<Option<NaiveDate>> {
        self.get(key)
            .map(|value| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|_| ApiError::BadRequest(format!("`{key}` must be yyyy-mm-dd")))
            })
            .transpose()
    }

    /// Project attribute and geometry filters shared by every list endpoint.
    pub fn project_filter(&self) -> ApiResult<ProjectFilter> {
        let mut filter = ProjectFilter {
            year: self.number("year")?,
            year_gte: self.number("year__gte")?,
            year_lte: self.number("year__lte")?,
            year_gt: self.number("year__gt")?,
            year_lt: self.number("year__lt")?,
            prj_date0_gte: self.date("prj_date0__gte")?,
            prj_date0_lte: self.date("prj_date0__lte")?,
            prj_date1_gte: self.date("prj_date1__gte")?,
            prj_date1_lte: self.date("prj_date1__lte")?,
            prj_cd: upper(self.list("prj_cd")),
            prj_cd_not: upper(self.list("prj_cd__not")),
            prj_cd_like: self.get("prj_cd__like").map(str::to_uppercase),
            prj_cd_not_like: self.get("prj_cd__not_like").map(str::to_uppercase),
            prj_cd_endswith: upper(self.list("prj_cd__endswith")),
            prj_cd_not_endswith: upper(self.list("prj_cd__not_endswith")),
            prj_nm_like: self.get("prj_nm__like").map(str::to_string),
            prj_nm_not_like: self.get("prj_nm__not_like").map(str::to_string),
            prj_ldr: self.list("prj_ldr"),
            lake: self.list("lake"),
            lake_not: self.list("lake__not"),
            protocol: self.list("protocol"),
            protocol_not: self.list("protocol__not"),
            project_type_ids: self.numbers("project_type")?,
            scope: self.list("scope"),
            ..ProjectFilter::default()
        };

        // first_year / last_year are the form-friendly spellings of the
        // inclusive bounds; the stricter bound wins when both are given.
        if let Some(first) = self.number::<i32>("first_year")? {
            filter.year_gte = Some(filter.year_gte.map_or(first, |gte| gte.max(first)));
        }
        if let Some(last) = self.number::<i32>("last_year")? {
            filter.year_lte = Some(filter.year_lte.map_or(last, |lte| lte.min(last)));
        }
        if let Some(date) = self.date("prj_date0")? {
            filter.prj_date0_gte = Some(date);
            filter.prj_date0_lte = Some(date);
        }
        if let Some(date) = self.date("prj_date1")? {
            filter.prj_date1_gte = Some(date);
            filter.prj_date1_lte = Some(date);
        }

        filter.spatial = self.spatial_filters();
        Ok(filter)
    }

    pub fn report_filter(&self) -> ApiResult<ReportFilter> {
        Ok(ReportFilter {
            project: self.project_filter()?,
            report_type: self.list("report_type"),
            report_type_not: self.list("report_type__not"),
        })
    }

    /// Year and project type restrictions of a region-of-interest query.
    pub fn roi_query(&self, how: RoiMode) -> ApiResult<RoiQuery> {
        Ok(RoiQuery {
            how,
            project_types: self.numbers("project_type")?,
            first_year: self.number("first_year")?,
            last_year: self.number("last_year")?,
        })
    }

    fn spatial_filters(&self) -> Vec<SpatialFilter> {
        let mut filters = Vec::new();
        let sources: [(&str, fn(&str) -> Option<Region>, SpatialPredicate); 4] = [
            ("within__roi", region, SpatialPredicate::Within),
            ("intersects__roi", region, SpatialPredicate::Intersects),
            ("within__buffered_point", buffered, SpatialPredicate::Within),
            ("intersects__buffered_point", buffered, SpatialPredicate::Intersects),
        ];
        for (key, decode, predicate) in sources {
            let Some(text) = self.get(key) else {
                continue;
            };
            match decode(text) {
                Some(region) => filters.push(SpatialFilter { region, predicate }),
                None => debug!("event=geometry_filter_ignored module=api status=ok key={key}"),
            }
        }
        filters
    }
}

fn region(text: &str) -> Option<Region> {
    parse_region(text).ok()
}

fn buffered(text: &str) -> Option<Region> {
    parse_buffered_point(text).ok()
}

fn upper(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|value| value.to_uppercase()).collect()
}
