use std::fmt;

use chrono::{Days, NaiveDate, TimeZone};
use chrono_tz::Tz;

use crate::options::{DataKind, Frequency, Market, ModeKind, RequestOptions, Window};
use crate::time::Clock;

/// A request path relative to the API base URL, e.g. `/genfuelmix/current.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Data sets published by the web services API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    GenFuelMix,
    FiveMinuteSystemLoad,
    HourlyLoadForecast,
    FiveMinuteLmp,
    DayAheadHourlyLmp,
}

impl Resource {
    /// The resource serving `kind` data settled in `market`.
    pub fn select(kind: DataKind, market: Market) -> Option<Self> {
        match (kind, market) {
            (DataKind::Generation, Market::NotApplicable | Market::RealTime) => {
                Some(Resource::GenFuelMix)
            }
            (DataKind::Load, Market::FiveMinute | Market::RealTime) => {
                Some(Resource::FiveMinuteSystemLoad)
            }
            (DataKind::Load, Market::DayAhead) => Some(Resource::HourlyLoadForecast),
            (DataKind::Price, Market::RealTime) => Some(Resource::FiveMinuteLmp),
            (DataKind::Price, Market::DayAhead) => Some(Resource::DayAheadHourlyLmp),
            _ => None,
        }
    }

    pub fn stem(&self) -> &'static str {
        match self {
            Resource::GenFuelMix => "genfuelmix",
            Resource::FiveMinuteSystemLoad => "fiveminutesystemload",
            Resource::HourlyLoadForecast => "hourlyloadforecast",
            Resource::FiveMinuteLmp => "fiveminutelmp",
            Resource::DayAheadHourlyLmp => "hourlylmp/da/final",
        }
    }

    pub fn native_frequency(&self) -> Frequency {
        match self {
            Resource::GenFuelMix => Frequency::NotApplicable,
            Resource::FiveMinuteSystemLoad | Resource::FiveMinuteLmp => Frequency::FiveMinute,
            Resource::HourlyLoadForecast | Resource::DayAheadHourlyLmp => Frequency::Hourly,
        }
    }

    pub fn accepts_frequency(&self, frequency: Frequency) -> bool {
        match self {
            // Latest LMPs have no series spacing to speak of.
            Resource::FiveMinuteLmp => {
                matches!(frequency, Frequency::FiveMinute | Frequency::NotApplicable)
            }
            _ => frequency == self.native_frequency(),
        }
    }

    /// Latest needs a `current` document; forecast needs day documents published ahead of time.
    pub fn supports(&self, mode: ModeKind) -> bool {
        match mode {
            ModeKind::Latest => matches!(
                self,
                Resource::GenFuelMix | Resource::FiveMinuteSystemLoad | Resource::FiveMinuteLmp
            ),
            ModeKind::Forecast => {
                matches!(self, Resource::HourlyLoadForecast | Resource::DayAheadHourlyLmp)
            }
            ModeKind::Historical => true,
        }
    }

    fn is_priced(&self) -> bool {
        matches!(self, Resource::FiveMinuteLmp | Resource::DayAheadHourlyLmp)
    }
}

const LOCATIONS: &[(&str, u32)] = &[
    ("INTERNALHUB", 4000),
    ("MAINE", 4001),
    ("NEWHAMPSHIRE", 4002),
    ("VERMONT", 4003),
    ("CONNECTICUT", 4004),
    ("RHODEISLAND", 4005),
    ("SEMASS", 4006),
    ("WCMASS", 4007),
    ("NEMASSBOST", 4008),
];

/// Maps a pricing node name (`NEMASSBOST`, `.Z.NEMASSBOST`, `.H.INTERNAL_HUB`)
/// or a numeric location id to the id the API uses in location paths.
pub fn location_id(node: &str) -> Option<u32> {
    let node = node.trim();
    if !node.is_empty() && node.bytes().all(|b| b.is_ascii_digit()) {
        return node.parse().ok();
    }
    let key = normalize_node(node);
    LOCATIONS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, id)| *id)
}

/// Strips the zone/hub prefix and separators so `.Z.NEMASSBOST` and `nemassbost` compare equal.
pub fn normalize_node(node: &str) -> String {
    let node = node.trim();
    let node = node
        .strip_prefix(".Z.")
        .or_else(|| node.strip_prefix(".H."))
        .unwrap_or(node);
    node.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Builds the ordered list of request paths for a resolved request.
///
/// Latest requests hit the `current` document. Forecast requests get one dated
/// document per day starting from today's UTC date. Historical requests get one
/// per calendar day of `[start_at, end_at]`, taking dates in `day_tz`.
pub fn build(options: &RequestOptions, clock: &dyn Clock, day_tz: Tz) -> Vec<Endpoint> {
    let resource = options.resource();
    let suffix = location_suffix(resource, options.node());

    let endpoints: Vec<Endpoint> = match options.window() {
        Window::Latest => vec![Endpoint(format!(
            "/{}/current{suffix}.json",
            resource.stem()
        ))],
        Window::Forecast { horizon_days } => {
            let today = clock.now().date_naive();
            (0..u64::from(horizon_days))
                .filter_map(|n| today.checked_add_days(Days::new(n)))
                .map(|day| day_endpoint(resource, day, &suffix))
                .collect()
        }
        Window::Historical { start_at, end_at } => {
            let first = day_tz.from_utc_datetime(&start_at.naive_utc()).date_naive();
            let last = day_tz.from_utc_datetime(&end_at.naive_utc()).date_naive();
            first
                .iter_days()
                .take_while(|day| *day <= last)
                .map(|day| day_endpoint(resource, day, &suffix))
                .collect()
        }
    };

    tracing::debug!("Built {} endpoint(s) for {}", endpoints.len(), resource.stem());
    endpoints
}

fn day_endpoint(resource: Resource, day: NaiveDate, suffix: &str) -> Endpoint {
    Endpoint(format!(
        "/{}/day/{}{suffix}.json",
        resource.stem(),
        day.format("%Y%m%d")
    ))
}

fn location_suffix(resource: Resource, node: Option<&str>) -> String {
    if !resource.is_priced() {
        return String::new();
    }
    node.and_then(location_id)
        .map(|id| format!("/location/{id}"))
        .unwrap_or_default()
}
