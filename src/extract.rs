use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::endpoints::{location_id, normalize_node};
use crate::error::{Error, Result};
use crate::options::Frequency;
use crate::time::utcify;

/// LMPs outside this band ($/MWh) are reported as suspicious.
pub const SANE_LMP_RANGE: (f64, f64) = (-500.0, 3000.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Something odd in the data that does not stop extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityIssue {
    NonPositiveLoad { timestamp: DateTime<Utc>, value: f64 },
    OffGrid { timestamp: DateTime<Utc>, minutes: u32 },
    DuplicateTimestamp { timestamp: DateTime<Utc> },
    PriceOutOfRange { timestamp: DateTime<Utc>, value: f64 },
}

impl QualityIssue {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            QualityIssue::NonPositiveLoad { timestamp, .. }
            | QualityIssue::OffGrid { timestamp, .. }
            | QualityIssue::DuplicateTimestamp { timestamp }
            | QualityIssue::PriceOutOfRange { timestamp, .. } => *timestamp,
        }
    }

    fn within(&self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> bool {
        (start_at..=end_at).contains(&self.timestamp())
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::NonPositiveLoad { timestamp, value } => {
                write!(f, "non-positive load {value} MW at {timestamp}")
            }
            QualityIssue::OffGrid { timestamp, minutes } => {
                write!(f, "{timestamp} is not on the {minutes}-minute grid")
            }
            QualityIssue::DuplicateTimestamp { timestamp } => {
                write!(f, "duplicate observation at {timestamp}")
            }
            QualityIssue::PriceOutOfRange { timestamp, value } => {
                write!(f, "implausible LMP {value} $/MWh at {timestamp}")
            }
        }
    }
}

/// Observations in strictly increasing time order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    frequency: Frequency,
    observations: Vec<Observation>,
    issues: Vec<QualityIssue>,
}

impl ObservationSeries {
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    /// Keeps observations and issues with `start_at <= timestamp <= end_at`.
    pub fn clip(mut self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        self.observations
            .retain(|o| o.timestamp >= start_at && o.timestamp <= end_at);
        self.issues.retain(|issue| issue.within(start_at, end_at));
        self
    }
}

/// Time-indexed LMPs for one node, with any implausible prices flagged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    prices: BTreeMap<DateTime<Utc>, f64>,
    issues: Vec<QualityIssue>,
}

impl PriceSeries {
    pub fn prices(&self) -> &BTreeMap<DateTime<Utc>, f64> {
        &self.prices
    }

    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &f64)> {
        self.prices.iter()
    }

    pub fn clip(mut self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        self.prices
            .retain(|timestamp, _| (start_at..=end_at).contains(timestamp));
        self.issues.retain(|issue| issue.within(start_at, end_at));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fuel {
    Coal,
    NaturalGas,
    Nuclear,
    Hydro,
    Wind,
    Solar,
    Wood,
    Refuse,
    Oil,
    LandfillGas,
    Other,
}

impl Fuel {
    pub fn from_category(category: &str) -> Self {
        match category.trim().to_lowercase().as_str() {
            "coal" => Fuel::Coal,
            "natural gas" | "gas" => Fuel::NaturalGas,
            "nuclear" => Fuel::Nuclear,
            "hydro" => Fuel::Hydro,
            "wind" => Fuel::Wind,
            "solar" => Fuel::Solar,
            "wood" | "biomass" => Fuel::Wood,
            "refuse" => Fuel::Refuse,
            "oil" => Fuel::Oil,
            "landfill gas" => Fuel::LandfillGas,
            other => {
                tracing::debug!("Unmapped fuel category {other:?}");
                Fuel::Other
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuelMixObservation {
    pub timestamp: DateTime<Utc>,
    pub fuel: Fuel,
    pub category: String,
    pub gen_mw: f64,
    pub marginal: bool,
}

/// Either the latest price or a time-indexed series.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceResult {
    Latest(f64),
    Series(PriceSeries),
}

// --- Wire rows ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoadRow {
    begin_date: String,
    load_mw: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LmpRow {
    begin_date: String,
    location: LocationRef,
    lmp_total: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocationRef {
    Tagged {
        #[serde(rename = "$")]
        name: String,
        #[serde(rename = "@LocId", default)]
        loc_id: Option<Value>,
    },
    Plain(String),
}

impl LocationRef {
    fn matches(&self, node: &str) -> bool {
        let (name, loc_id) = match self {
            LocationRef::Tagged { name, loc_id } => (name.as_str(), loc_id.as_ref()),
            LocationRef::Plain(name) => (name.as_str(), None),
        };
        if normalize_node(name) == normalize_node(node) {
            return true;
        }
        let loc_id = loc_id.and_then(|v| match v {
            Value::String(s) => s.parse::<u32>().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        });
        loc_id.is_some() && loc_id == location_id(node)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FuelRow {
    begin_date: String,
    fuel_category: String,
    gen_mw: f64,
    #[serde(default)]
    marginal_flag: Option<String>,
}

const LOAD_SHAPES: &[(&str, &str)] = &[
    ("FiveMinSystemLoads", "FiveMinSystemLoad"),
    ("HourlyLoadForecasts", "HourlyLoadForecast"),
];
const LOAD_FREQUENCIES: &[Frequency] = &[Frequency::FiveMinute, Frequency::Hourly];

const LMP_SHAPES: &[(&str, &str)] = &[("FiveMinLmps", "FiveMinLmp"), ("HourlyLmps", "HourlyLmp")];

const FUEL_SHAPES: &[(&str, &str)] = &[("GenFuelMixes", "GenFuelMix")];

/// Finds the row list in a document. Rows may sit under `{plural: {singular: [...]}}`
/// or directly under `{singular: [...]}`, and a single row may come unwrapped.
/// An empty string or an empty object stands for a day without rows.
fn rows<T: DeserializeOwned>(document: &Value, shapes: &[(&str, &str)]) -> Result<(usize, Vec<T>)> {
    let (shape, table) = shapes
        .iter()
        .enumerate()
        .find_map(|(i, (plural, singular))| {
            document
                .get(plural)
                .map(|inner| inner.get(singular).unwrap_or(inner))
                .or_else(|| document.get(singular))
                .map(|table| (i, table))
        })
        .ok_or_else(|| {
            let expected: Vec<_> = shapes.iter().map(|(plural, _)| *plural).collect();
            Error::MalformedDocument(format!("expected one of {}", expected.join(", ")))
        })?;

    let items: Vec<&Value> = match table {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(_) => vec![table],
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => {
            return Err(Error::MalformedDocument(format!(
                "unexpected row container {other}"
            )))
        }
    };

    let parsed = items
        .into_iter()
        .map(|item| {
            T::deserialize(item).map_err(|e| Error::MalformedDocument(format!("bad row: {e}")))
        })
        .collect::<Result<Vec<T>>>()?;
    Ok((shape, parsed))
}

fn check_price(timestamp: DateTime<Utc>, value: f64) -> Option<QualityIssue> {
    let (low, high) = SANE_LMP_RANGE;
    (!(low..=high).contains(&value)).then_some(QualityIssue::PriceOutOfRange { timestamp, value })
}

fn node_rows(document: &Value, node: &str) -> Result<Vec<(DateTime<Utc>, f64)>> {
    let (_, rows) = rows::<LmpRow>(document, LMP_SHAPES)?;
    let matching = rows
        .into_iter()
        .filter(|row| row.location.matches(node))
        .map(|row| Ok((utcify(&row.begin_date)?, row.lmp_total)))
        .collect::<Result<Vec<_>>>()?;
    if matching.is_empty() {
        return Err(Error::NodeNotFound(node.to_string()));
    }
    Ok(matching)
}

/// The most recent LMP for `node` in a single document.
pub fn extract_lmp_latest(document: &Value, node: &str) -> Result<f64> {
    let (timestamp, price) = node_rows(document, node)?
        .into_iter()
        .max_by_key(|(timestamp, _)| *timestamp)
        .ok_or_else(|| Error::NodeNotFound(node.to_string()))?;

    if let Some(issue) = check_price(timestamp, price) {
        tracing::warn!("Data quality: {issue}");
    }
    Ok(price)
}

/// Merges the LMPs for `node` across daily documents into one time-ordered series.
/// Every document must mention the node. Prices outside `SANE_LMP_RANGE` are kept
/// and reported as issues.
pub fn extract_lmp_series(documents: &[Value], node: &str) -> Result<PriceSeries> {
    let mut series = PriceSeries::default();
    for document in documents {
        for (timestamp, price) in node_rows(document, node)? {
            if let Some(issue) = check_price(timestamp, price) {
                tracing::warn!("Data quality: {issue}");
                series.issues.push(issue);
            }
            series.prices.insert(timestamp, price);
        }
    }
    Ok(series)
}

/// Flattens current, daily and forecast load documents into one series.
///
/// Non-positive loads and off-grid timestamps are kept and reported as issues.
pub fn extract_load_series(documents: &[Value]) -> Result<ObservationSeries> {
    let mut frequency = None;
    let mut points = BTreeMap::new();
    let mut issues = Vec::new();

    for document in documents {
        let (shape, rows) = rows::<LoadRow>(document, LOAD_SHAPES)?;
        let doc_frequency = LOAD_FREQUENCIES[shape];
        frequency.get_or_insert(doc_frequency);

        for row in rows {
            let timestamp = utcify(&row.begin_date)?;
            if row.load_mw <= 0.0 {
                issues.push(QualityIssue::NonPositiveLoad {
                    timestamp,
                    value: row.load_mw,
                });
            }
            if let Some(minutes) = doc_frequency.minutes() {
                if timestamp.timestamp() % (i64::from(minutes) * 60) != 0 {
                    issues.push(QualityIssue::OffGrid { timestamp, minutes });
                }
            }
            if points.insert(timestamp, row.load_mw).is_some() {
                issues.push(QualityIssue::DuplicateTimestamp { timestamp });
            }
        }
    }

    for issue in &issues {
        tracing::warn!("Data quality: {issue}");
    }

    Ok(ObservationSeries {
        frequency: frequency.unwrap_or(Frequency::FiveMinute),
        observations: points
            .into_iter()
            .map(|(timestamp, value)| Observation { timestamp, value })
            .collect(),
        issues,
    })
}

/// Generation by fuel, ordered by time and then fuel.
pub fn extract_fuel_mix(documents: &[Value]) -> Result<Vec<FuelMixObservation>> {
    let mut mix = Vec::new();
    for document in documents {
        let (_, rows) = rows::<FuelRow>(document, FUEL_SHAPES)?;
        for row in rows {
            mix.push(FuelMixObservation {
                timestamp: utcify(&row.begin_date)?,
                fuel: Fuel::from_category(&row.fuel_category),
                category: row.fuel_category,
                gen_mw: row.gen_mw,
                marginal: row.marginal_flag.as_deref() == Some("Y"),
            });
        }
    }
    mix.sort_by_key(|o| (o.timestamp, o.fuel));
    Ok(mix)
}
