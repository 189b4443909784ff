//! `measure` service: body measures (weight, fat mass, blood pressure, ...)
//!
//! `getmeas` is paginated: a response with `more` set carries the `offset`
//! to send next. [`MeasureApi::stream_measures`] follows that chain and
//! yields measure groups one by one, holding at most one page in memory.

use futures_util::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;
use withings_core::{Action, Error, Params, Result};

use crate::Withings;

/// Measure type ids to request (1 = weight, 6 = fat ratio, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasureTypes {
    /// Sent as `meastype`
    Single(u32),
    /// Sent as comma-joined `meastypes`
    Many(Vec<u32>),
}

/// Whether a group holds real measures or user objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureCategory {
    Real = 1,
    Objective = 2,
}

/// Parameters of a `getmeas` call. Unset bounds are not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureQuery {
    pub types: MeasureTypes,
    pub category: MeasureCategory,
    /// Unix seconds
    pub start_date: Option<i64>,
    /// Unix seconds
    pub end_date: Option<i64>,
    /// Only groups modified after this unix timestamp
    pub last_update: Option<i64>,
    /// Pagination offset from a previous response
    pub offset: Option<u64>,
}

impl MeasureQuery {
    pub fn new(types: MeasureTypes, category: MeasureCategory) -> Self {
        Self {
            types,
            category,
            start_date: None,
            end_date: None,
            last_update: None,
            offset: None,
        }
    }

    fn to_params(&self) -> Params {
        let params = match &self.types {
            MeasureTypes::Single(kind) => Params::new().with("meastype", *kind),
            MeasureTypes::Many(kinds) => Params::new().with(
                "meastypes",
                kinds
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        };
        params
            .with("category", self.category as u8)
            .with("startdate", self.start_date)
            .with("enddate", self.end_date)
            .with("lastupdate", self.last_update)
            .with("offset", self.offset)
    }
}

/// One page of `getmeas` results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureResponse {
    #[serde(rename = "updatetime", default)]
    pub update_time: i64,
    #[serde(default)]
    pub timezone: String,
    #[serde(rename = "measuregrps", default)]
    pub groups: Vec<MeasureGroup>,
    /// Non-zero when more pages follow
    #[serde(default)]
    pub more: u8,
    #[serde(default)]
    pub offset: u64,
}

/// Measures captured together (e.g. one weigh-in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureGroup {
    #[serde(rename = "grpid")]
    pub group_id: u64,
    #[serde(rename = "attrib")]
    pub attribution: i32,
    /// Unix seconds of the measurement
    pub date: i64,
    pub created: i64,
    pub category: u8,
    #[serde(rename = "deviceid", default)]
    pub device_id: Option<String>,
    pub measures: Vec<MeasurePoint>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A single value, encoded as `value * 10^unit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurePoint {
    pub value: i64,
    #[serde(rename = "type")]
    pub kind: u32,
    pub unit: i32,
}

impl MeasurePoint {
    /// Decoded value in the measure type's SI unit.
    pub fn real_value(&self) -> f64 {
        self.value as f64 * 10f64.powi(self.unit)
    }
}

/// View on the `measure` service.
#[derive(Debug, Clone, Copy)]
pub struct MeasureApi<'a> {
    session: &'a Withings,
}

impl<'a> MeasureApi<'a> {
    pub(crate) fn new(session: &'a Withings) -> Self {
        Self { session }
    }

    /// Fetch one page of measures.
    pub async fn get_measure(&self, query: &MeasureQuery) -> Result<MeasureResponse> {
        self.session.call(Action::GetMeas, query.to_params()).await
    }

    /// Stream every measure group matching `query`, page after page.
    ///
    /// Starts at `query.offset` and stops after the first page whose `more`
    /// flag is zero. An error ends the stream after being yielded.
    pub fn stream_measures(
        self,
        query: MeasureQuery,
    ) -> impl Stream<Item = Result<MeasureGroup>> + 'a {
        stream::try_unfold(Some(query), move |next| async move {
            let Some(query) = next else {
                return Ok::<_, Error>(None);
            };
            let page = self.get_measure(&query).await?;
            debug!(
                groups = page.groups.len(),
                more = page.more,
                offset = page.offset,
                "fetched measure page"
            );
            let next = (page.more > 0).then(|| MeasureQuery {
                offset: Some(page.offset),
                ..query
            });
            let groups = stream::iter(page.groups.into_iter().map(Ok::<_, Error>));
            Ok(Some((groups, next)))
        })
        .try_flatten()
    }
}
