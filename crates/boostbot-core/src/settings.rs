//! Per-channel reaction boosting configuration.
//!
//! Channels persist their settings as an untyped JSON object. [`ReactionSettings::from_value`]
//! turns that payload into a typed value object; [`ReactionSettings::validate`] enforces the
//! invariants. Absent keys take defaults. Present keys of the wrong type are remembered and
//! reported by `validate`, never defaulted.

use std::time::Duration;

use rand::Rng;
use serde_json::{Map, Number, Value};

pub const MAX_REACTION_COUNT: i64 = 100;

const DEFAULT_REACTION_COUNT: i64 = 1;
const DEFAULT_DELAY_MIN: f64 = 2.0;
const DEFAULT_DELAY_MAX: f64 = 8.0;
const DEFAULT_AUTO_BOOST: bool = true;

/// Why a settings payload was rejected. The message is what ends up in the activity log.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Reaction settings must be an object")]
    NotAnObject,

    #[error("Emojis must be a list of strings")]
    EmojisNotStrings,

    #[error("Auto-boost must be true or false")]
    AutoBoostNotBool,

    #[error("At least one emoji must be selected")]
    NoEmojis,

    #[error("Reaction count must be an integer")]
    CountNotInteger,

    #[error("Reaction count must be between 1 and 100")]
    CountOutOfRange,

    #[error("Delay values must be numbers")]
    DelayNotNumber,

    #[error("Minimum delay must be non-negative")]
    NegativeDelay,

    #[error("Maximum delay must be greater than or equal to minimum delay")]
    DelayRangeInverted,

    #[error("Delay values are too large")]
    DelayTooLarge,

    #[error("Reaction count cannot exceed number of emojis")]
    CountExceedsPool,
}

/// Delay bound in seconds.
///
/// Keeps the JSON number exactly as it was configured (`2` stays `2`, `2.5` stays `2.5`).
#[derive(Clone, Debug, PartialEq)]
pub struct DelaySecs(Number);

impl DelaySecs {
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        Number::from_f64(secs).map(Self)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_f64().unwrap_or(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReactionSettings {
    pub emojis: Vec<String>,
    pub reaction_count: i64,
    pub delay_min: DelaySecs,
    pub delay_max: DelaySecs,
    pub auto_boost: bool,
    mistyped: Mistyped,
}

/// Keys that were present with the wrong JSON type. The typed field keeps its default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Mistyped {
    emojis: bool,
    reaction_count: bool,
    delays: bool,
    auto_boost: bool,
}

impl Default for ReactionSettings {
    fn default() -> Self {
        Self {
            emojis: Vec::new(),
            reaction_count: DEFAULT_REACTION_COUNT,
            delay_min: DelaySecs(number_f64(DEFAULT_DELAY_MIN)),
            delay_max: DelaySecs(number_f64(DEFAULT_DELAY_MAX)),
            auto_boost: DEFAULT_AUTO_BOOST,
            mistyped: Mistyped::default(),
        }
    }
}

impl ReactionSettings {
    pub fn new(
        emojis: Vec<String>,
        reaction_count: i64,
        delay_min: DelaySecs,
        delay_max: DelaySecs,
        auto_boost: bool,
    ) -> Self {
        Self {
            emojis,
            reaction_count,
            delay_min,
            delay_max,
            auto_boost,
            mistyped: Mistyped::default(),
        }
    }

    /// Parse the persisted payload. Unknown keys are ignored.
    ///
    /// Only a non-object payload fails here; wrongly typed keys surface from [`Self::validate`].
    pub fn from_value(value: &Value) -> Result<Self, SettingsError> {
        let obj = value.as_object().ok_or(SettingsError::NotAnObject)?;
        let mut out = Self::default();

        if let Some(v) = obj.get("emojis") {
            match parse_emojis(v) {
                Some(emojis) => out.emojis = emojis,
                None => out.mistyped.emojis = true,
            }
        }
        if let Some(v) = obj.get("auto_boost") {
            match v.as_bool() {
                Some(b) => out.auto_boost = b,
                None => out.mistyped.auto_boost = true,
            }
        }
        if let Some(v) = obj.get("reaction_count") {
            match parse_integer(v) {
                Some(n) => out.reaction_count = n,
                None => out.mistyped.reaction_count = true,
            }
        }
        for (key, slot) in [("delay_min", &mut out.delay_min), ("delay_max", &mut out.delay_max)] {
            if let Some(v) = obj.get(key) {
                match v {
                    Value::Number(n) => *slot = DelaySecs(n.clone()),
                    _ => out.mistyped.delays = true,
                }
            }
        }

        Ok(out)
    }

    /// Parse and validate in one step.
    pub fn parse(value: &Value) -> Result<Self, SettingsError> {
        let settings = Self::from_value(value)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "emojis".to_string(),
            Value::Array(self.emojis.iter().cloned().map(Value::String).collect()),
        );
        obj.insert(
            "reaction_count".to_string(),
            Value::Number(Number::from(self.reaction_count)),
        );
        obj.insert(
            "delay_min".to_string(),
            Value::Number(self.delay_min.0.clone()),
        );
        obj.insert(
            "delay_max".to_string(),
            Value::Number(self.delay_max.0.clone()),
        );
        obj.insert("auto_boost".to_string(), Value::Bool(self.auto_boost));
        Value::Object(obj)
    }

    /// Check the invariants; only the first failing check is reported.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.mistyped.emojis {
            return Err(SettingsError::EmojisNotStrings);
        }
        if self.emojis.is_empty() {
            return Err(SettingsError::NoEmojis);
        }
        if self.mistyped.reaction_count {
            return Err(SettingsError::CountNotInteger);
        }
        if !(1..=MAX_REACTION_COUNT).contains(&self.reaction_count) {
            return Err(SettingsError::CountOutOfRange);
        }

        let min = self.delay_min.as_secs_f64();
        let max = self.delay_max.as_secs_f64();
        if self.mistyped.delays || !min.is_finite() || !max.is_finite() {
            return Err(SettingsError::DelayNotNumber);
        }
        if min < 0.0 {
            return Err(SettingsError::NegativeDelay);
        }
        if max < min {
            return Err(SettingsError::DelayRangeInverted);
        }
        // Every pause must fit in a Duration.
        if Duration::try_from_secs_f64(max).is_err() {
            return Err(SettingsError::DelayTooLarge);
        }

        if self.reaction_count as usize > self.emojis.len() {
            return Err(SettingsError::CountExceedsPool);
        }
        if self.mistyped.auto_boost {
            return Err(SettingsError::AutoBoostNotBool);
        }

        Ok(())
    }

    /// Number of emojis a boost will use: `min(reaction_count, len(emojis))`.
    pub fn effective_count(&self) -> usize {
        let count = usize::try_from(self.reaction_count.max(0)).unwrap_or(0);
        count.min(self.emojis.len())
    }

    /// Uniform pause in `[delay_min, delay_max]`.
    pub fn random_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.delay_min.as_secs_f64().max(0.0);
        let max = self.delay_max.as_secs_f64().max(min);
        let secs = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn number_f64(v: f64) -> Number {
    Number::from_f64(v).unwrap_or_else(|| Number::from(0))
}

fn parse_emojis(v: &Value) -> Option<Vec<String>> {
    v.as_array()?
        .iter()
        .map(|item| item.as_str().map(|s| s.to_string()))
        .collect()
}

fn parse_integer(v: &Value) -> Option<i64> {
    let Value::Number(n) = v else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    // Integers beyond i64 are still integers; the range check rejects them.
    n.is_u64().then_some(i64::MAX)
}
