use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use proptest::{
    arbitrary::Arbitrary,
    prelude::prop,
    strategy::{BoxedStrategy, Just, Strategy},
};

/// Minutes in the daily reference cycle.
pub const DAY_MINUTES: u32 = 24 * 60;

/// Names of the schedules every model may reference through [`Schedule::Library`].
pub const LIBRARY_NAMES: &[&str] = &[
    "AlwaysOn",
    "AlwaysOff",
    "DefaultActivity",
    "OfficeOccupancy",
    "OfficeLighting",
    "ResidentialOccupancy",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    Constant {
        type_limits: ScheduleTypeLimits,
        value: f64,
    },
    /// Fixed compact time series; each period applies until its `through` date.
    Compact {
        type_limits: ScheduleTypeLimits,
        periods: Vec<SchedulePeriod>,
    },
    /// Reference to a schedule from the built-in library.
    Library { name: String },
}

impl Schedule {
    /// Resolve library references to their definition.
    /// Returns `None` for unknown library names.
    pub fn resolved(&self) -> Option<Schedule> {
        match self {
            Schedule::Library { name } => library_schedule(name),
            other => Some(other.clone()),
        }
    }

    pub fn type_limits(&self) -> Option<ScheduleTypeLimits> {
        match self.resolved()? {
            Schedule::Constant { type_limits, .. } | Schedule::Compact { type_limits, .. } => {
                Some(type_limits)
            }
            Schedule::Library { .. } => None,
        }
    }

    pub fn always_on() -> Self {
        Schedule::Library {
            name: "AlwaysOn".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulePeriod {
    pub through: MonthDay,
    pub until: Vec<TimeValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub time: TimeOfDay,
    pub value: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTypeLimits {
    Fraction,
    OnOff,
    Temperature,
    Any,
}

impl ScheduleTypeLimits {
    pub const ALL: [ScheduleTypeLimits; 4] = [
        ScheduleTypeLimits::Fraction,
        ScheduleTypeLimits::OnOff,
        ScheduleTypeLimits::Temperature,
        ScheduleTypeLimits::Any,
    ];

    /// Name of the `ScheduleTypeLimits` object emitted for this kind.
    pub fn idf_name(&self) -> &'static str {
        match self {
            ScheduleTypeLimits::Fraction => "Fraction",
            ScheduleTypeLimits::OnOff => "On/Off",
            ScheduleTypeLimits::Temperature => "Temperature",
            ScheduleTypeLimits::Any => "Any Number",
        }
    }

    pub fn accepts(&self, value: f64) -> bool {
        value.is_finite()
            && match self {
                ScheduleTypeLimits::Fraction => (0.0..=1.0).contains(&value),
                ScheduleTypeLimits::OnOff => value == 0.0 || value == 1.0,
                ScheduleTypeLimits::Temperature => (-100.0..=200.0).contains(&value),
                ScheduleTypeLimits::Any => true,
            }
    }
}

/// Calendar day without a year, written `month/day` as in IDF compact schedules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub const YEAR_END: MonthDay = MonthDay { month: 12, day: 31 };

    pub fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    /// Day of year in a leap year, or `None` for impossible dates.
    pub fn ordinal(&self) -> Option<u32> {
        NaiveDate::from_ymd_opt(2024, self.month, self.day).map(|date| date.ordinal())
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (month, day) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected month/day, got {s:?}"))?;
        Ok(MonthDay {
            month: month.trim().parse().map_err(|_| format!("bad month in {s:?}"))?,
            day: day.trim().parse().map_err(|_| format!("bad day in {s:?}"))?,
        })
    }
}

impl TryFrom<String> for MonthDay {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

/// Time of day in minutes after midnight; `24:00` is the end of the cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(pub u32);

impl TimeOfDay {
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(DAY_MINUTES);

    pub fn hm(hours: u32, minutes: u32) -> Self {
        TimeOfDay(hours * 60 + minutes)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hours, minutes) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected hh:mm, got {s:?}"))?;
        let hours: u32 = hours.trim().parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minutes: u32 = minutes
            .trim()
            .parse()
            .map_err(|_| format!("bad minute in {s:?}"))?;
        if minutes >= 60 {
            return Err(format!("bad minute in {s:?}"));
        }
        Ok(TimeOfDay::hm(hours, minutes))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Definition of a library schedule.
pub fn library_schedule(name: &str) -> Option<Schedule> {
    let daily = |type_limits, profile: &[(u32, f64)]| Schedule::Compact {
        type_limits,
        periods: vec![SchedulePeriod {
            through: MonthDay::YEAR_END,
            until: profile
                .iter()
                .map(|&(hour, value)| TimeValue {
                    time: TimeOfDay::hm(hour, 0),
                    value,
                })
                .collect(),
        }],
    };

    Some(match name {
        "AlwaysOn" => Schedule::Constant {
            type_limits: ScheduleTypeLimits::OnOff,
            value: 1.0,
        },
        "AlwaysOff" => Schedule::Constant {
            type_limits: ScheduleTypeLimits::OnOff,
            value: 0.0,
        },
        "DefaultActivity" => Schedule::Constant {
            type_limits: ScheduleTypeLimits::Any,
            value: 120.0,
        },
        "OfficeOccupancy" => daily(
            ScheduleTypeLimits::Fraction,
            &[(7, 0.0), (8, 0.5), (12, 0.95), (13, 0.5), (18, 0.95), (24, 0.05)],
        ),
        "OfficeLighting" => daily(
            ScheduleTypeLimits::Fraction,
            &[(7, 0.05), (19, 0.9), (24, 0.05)],
        ),
        "ResidentialOccupancy" => daily(
            ScheduleTypeLimits::Fraction,
            &[(7, 1.0), (9, 0.5), (17, 0.2), (22, 0.8), (24, 1.0)],
        ),
        _ => return None,
    })
}

#[cfg(test)]
impl Arbitrary for Schedule {
    type Parameters = ();
    type Strategy = BoxedStrategy<Schedule>;

    /// Only well-formed schedules: ordered, gap-free, values within type limits.
    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        let constant = (0f64..=1f64).prop_map(|value| Schedule::Constant {
            type_limits: ScheduleTypeLimits::Fraction,
            value,
        });
        let compact = prop::collection::btree_set(1u32..DAY_MINUTES, 0..4)
            .prop_flat_map(|cuts| {
                let times: Vec<u32> = cuts.into_iter().chain([DAY_MINUTES]).collect();
                let count = times.len();
                (Just(times), prop::collection::vec(0f64..=1f64, count))
            })
            .prop_map(|(times, values)| Schedule::Compact {
                type_limits: ScheduleTypeLimits::Fraction,
                periods: vec![SchedulePeriod {
                    through: MonthDay::YEAR_END,
                    until: times
                        .into_iter()
                        .zip(values)
                        .map(|(time, value)| TimeValue {
                            time: TimeOfDay(time),
                            value,
                        })
                        .collect(),
                }],
            });
        prop::strategy::Union::new(vec![constant.boxed(), compact.boxed()]).boxed()
    }
}
