//! Evaluation statistics and their ranking sense.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{TuneError, TuneResult};

/// Whether larger or smaller values of a statistic are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    HigherIsBetter,
    LowerIsBetter,
}

impl Sense {
    /// Orders two scores so that `Greater` means `a` is better than `b`.
    ///
    /// NaN is worse than any other score; two NaNs compare equal.
    pub fn compare(self, a: f64, b: f64) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => match self {
                Self::HigherIsBetter => a.total_cmp(&b),
                Self::LowerIsBetter => b.total_cmp(&a),
            },
        }
    }
}

/// A statistic an evaluator can report for a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Statistic {
    #[serde(rename = "CC")]
    CorrelationCoefficient,
    #[serde(rename = "RMSE")]
    RootMeanSquaredError,
    #[serde(rename = "RRSE")]
    RootRelativeSquaredError,
    #[serde(rename = "MAE")]
    MeanAbsoluteError,
    #[serde(rename = "RAE")]
    RelativeAbsoluteError,
    #[serde(rename = "COMB")]
    Combined,
    #[serde(rename = "ACC")]
    Accuracy,
    #[serde(rename = "KAP")]
    Kappa,
}

struct StatisticInfo {
    statistic: Statistic,
    code: &'static str,
    readable: &'static str,
    sense: Sense,
}

const STATISTICS: [StatisticInfo; 8] = [
    StatisticInfo {
        statistic: Statistic::CorrelationCoefficient,
        code: "CC",
        readable: "Correlation coefficient",
        sense: Sense::HigherIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::RootMeanSquaredError,
        code: "RMSE",
        readable: "Root mean squared error",
        sense: Sense::LowerIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::RootRelativeSquaredError,
        code: "RRSE",
        readable: "Root relative squared error",
        sense: Sense::LowerIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::MeanAbsoluteError,
        code: "MAE",
        readable: "Mean absolute error",
        sense: Sense::LowerIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::RelativeAbsoluteError,
        code: "RAE",
        readable: "Relative absolute error",
        sense: Sense::LowerIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::Combined,
        code: "COMB",
        readable: "Combined = (1-abs(CC)) + RRSE + RAE",
        sense: Sense::LowerIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::Accuracy,
        code: "ACC",
        readable: "Accuracy",
        sense: Sense::HigherIsBetter,
    },
    StatisticInfo {
        statistic: Statistic::Kappa,
        code: "KAP",
        readable: "Kappa",
        sense: Sense::HigherIsBetter,
    },
];

impl Statistic {
    pub const ALL: [Statistic; 8] = [
        Statistic::CorrelationCoefficient,
        Statistic::RootMeanSquaredError,
        Statistic::RootRelativeSquaredError,
        Statistic::MeanAbsoluteError,
        Statistic::RelativeAbsoluteError,
        Statistic::Combined,
        Statistic::Accuracy,
        Statistic::Kappa,
    ];

    fn info(self) -> &'static StatisticInfo {
        // The table holds one row per variant in declaration order.
        &STATISTICS[self as usize]
    }

    pub fn sense(self) -> Sense {
        self.info().sense
    }

    /// Short code, e.g. `"RMSE"`.
    pub fn code(self) -> &'static str {
        self.info().code
    }

    pub fn readable(self) -> &'static str {
        self.info().readable
    }

    /// Orders two scores of this statistic; `Greater` means `a` is better.
    pub fn compare(self, a: f64, b: f64) -> Ordering {
        self.sense().compare(a, b)
    }
}

impl Default for Statistic {
    fn default() -> Self {
        Self::CorrelationCoefficient
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Statistic {
    type Err = TuneError;

    fn from_str(s: &str) -> TuneResult<Self> {
        let wanted = s.trim();
        STATISTICS
            .iter()
            .find(|info| info.code.eq_ignore_ascii_case(wanted))
            .map(|info| info.statistic)
            .ok_or_else(|| TuneError::Validation(format!("Unknown statistic: {wanted}")))
    }
}

/// Serde adapters for scores.
///
/// JSON has no NaN or infinity, so non-finite scores are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`; finite scores stay numbers.
pub mod score_serde {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    impl From<f64> for Repr {
        fn from(value: f64) -> Self {
            if value.is_finite() {
                Repr::Number(value)
            } else if value.is_nan() {
                Repr::Text("NaN".to_string())
            } else if value > 0.0 {
                Repr::Text("inf".to_string())
            } else {
                Repr::Text("-inf".to_string())
            }
        }
    }

    impl Repr {
        fn into_f64<E: de::Error>(self) -> Result<f64, E> {
            match self {
                Repr::Number(value) => Ok(value),
                Repr::Text(text) => text
                    .parse()
                    .map_err(|_| E::custom(format!("invalid score: {text}"))),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Repr::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Repr::deserialize(deserializer)?.into_f64()
    }

    pub mod option {
        use super::Repr;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<f64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.map(Repr::from).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<f64>, D::Error> {
            Option::<Repr>::deserialize(deserializer)?
                .map(Repr::into_f64)
                .transpose()
        }
    }

    pub mod map {
        use super::Repr;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::collections::BTreeMap;

        pub fn serialize<K, S>(map: &BTreeMap<K, f64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            K: Serialize,
            S: Serializer,
        {
            serializer.collect_map(map.iter().map(|(key, value)| (key, Repr::from(*value))))
        }

        pub fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, f64>, D::Error>
        where
            K: Deserialize<'de> + Ord,
            D: Deserializer<'de>,
        {
            BTreeMap::<K, Repr>::deserialize(deserializer)?
                .into_iter()
                .map(|(key, repr)| repr.into_f64().map(|value| (key, value)))
                .collect()
        }
    }
}

/// Named statistic values reported by an evaluator for one configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(with = "score_serde::map")]
    values: BTreeMap<Statistic, f64>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, statistic: Statistic, value: f64) -> Self {
        self.values.insert(statistic, value);
        self
    }

    pub fn insert(&mut self, statistic: Statistic, value: f64) {
        self.values.insert(statistic, value);
    }

    /// Looks up a statistic. `Combined` is derived from CC, RRSE and RAE when
    /// the evaluator did not report it directly.
    pub fn get(&self, statistic: Statistic) -> Option<f64> {
        if let Some(value) = self.values.get(&statistic) {
            return Some(*value);
        }
        if statistic == Statistic::Combined {
            let cc = self.values.get(&Statistic::CorrelationCoefficient)?;
            let rrse = self.values.get(&Statistic::RootRelativeSquaredError)?;
            let rae = self.values.get(&Statistic::RelativeAbsoluteError)?;
            return Some((1.0 - cc.abs()) + rrse + rae);
        }
        None
    }

    /// Statistics available through [`Statistics::get`], including derived ones.
    pub fn available(&self) -> Vec<Statistic> {
        Statistic::ALL
            .into_iter()
            .filter(|s| self.get(*s).is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
