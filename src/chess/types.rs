use super::error::{ErrorAccumulator, RecordError};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use shakmaty::{ByColor, Color};
use std::fmt;

pub const UNKNOWN_PLAYER: &str = "Unknown";
pub const DEFAULT_VARIANT: &str = "standard";
pub const DEFAULT_SPEED: &str = "game";
pub const DEFAULT_STATUS: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Player {
    pub name: Option<String>,
    pub rating: Option<i64>,
}

impl Player {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_PLAYER)
    }
}

/// Clock settings exactly as the server reports them (no unit conversion).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    pub initial: i64,
    pub increment: i64,
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.initial, self.increment)
    }
}

/// One game as exported by Lichess, with every optional field made explicit.
///
/// Missing fields stay `None`; the accessors substitute the documented
/// defaults. Fields that were present with an unexpected JSON type are
/// treated as missing and described in `warnings`.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub id: String,
    pub players: ByColor<Player>,
    pub winner: Option<Color>,
    /// Kept in the offset it was given in; the PGN date is read in that offset.
    pub created_at: Option<DateTime<FixedOffset>>,
    pub clock: Clock,
    pub variant: Option<String>,
    pub speed: Option<String>,
    pub status: Option<String>,
    pub moves: String,

    pub warnings: ErrorAccumulator,
}

impl Default for GameRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            players: ByColor {
                white: Player::default(),
                black: Player::default(),
            },
            winner: None,
            created_at: None,
            clock: Clock::default(),
            variant: None,
            speed: None,
            status: None,
            moves: String::new(),
            warnings: ErrorAccumulator::default(),
        }
    }
}

impl GameRecord {
    pub fn variant(&self) -> &str {
        self.variant.as_deref().unwrap_or(DEFAULT_VARIANT)
    }

    pub fn speed(&self) -> &str {
        self.speed.as_deref().unwrap_or(DEFAULT_SPEED)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or(DEFAULT_STATUS)
    }

    /// Validates a loosely typed game value at the boundary.
    ///
    /// Only a value that is not a JSON object is rejected.
    pub fn from_json(value: &Value) -> Result<Self, RecordError> {
        let Value::Object(game) = value else {
            return Err(RecordError::InvalidRecord {
                found: json_type_name(value),
            });
        };

        let mut warnings = ErrorAccumulator::default();
        let players = object_field(game, "players", "players", &mut warnings);
        let clock = object_field(game, "clock", "clock", &mut warnings);

        Ok(Self {
            id: string_field(game, "id", "id", &mut warnings).unwrap_or_default(),
            players: ByColor {
                white: parse_player(players, "white", &mut warnings),
                black: parse_player(players, "black", &mut warnings),
            },
            winner: parse_winner(game, &mut warnings),
            created_at: parse_created_at(game, &mut warnings),
            clock: Clock {
                initial: clock
                    .and_then(|c| integer_field(c, "initial", "clock.initial", &mut warnings))
                    .unwrap_or(0),
                increment: clock
                    .and_then(|c| integer_field(c, "increment", "clock.increment", &mut warnings))
                    .unwrap_or(0),
            },
            variant: string_field(game, "variant", "variant", &mut warnings),
            speed: string_field(game, "speed", "speed", &mut warnings),
            status: string_field(game, "status", "status", &mut warnings),
            moves: string_field(game, "moves", "moves", &mut warnings).unwrap_or_default(),
            warnings,
        })
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn conversion_error(label: &str, value: &Value, warnings: &mut ErrorAccumulator) {
    warnings.push(&format!(
        "Conversion error: {label}={value} (unexpected {})",
        json_type_name(value)
    ));
}

fn object_field<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    label: &str,
    warnings: &mut ErrorAccumulator,
) -> Option<&'a Map<String, Value>> {
    match map.get(key)? {
        Value::Null => None,
        Value::Object(inner) => Some(inner),
        other => {
            conversion_error(label, other, warnings);
            None
        }
    }
}

fn string_field(
    map: &Map<String, Value>,
    key: &str,
    label: &str,
    warnings: &mut ErrorAccumulator,
) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => {
            conversion_error(label, other, warnings);
            None
        }
    }
}

fn integer_field(
    map: &Map<String, Value>,
    key: &str,
    label: &str,
    warnings: &mut ErrorAccumulator,
) -> Option<i64> {
    let value = map.get(key)?;
    let parsed = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_number)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    if parsed.is_none() {
        conversion_error(label, value, warnings);
    }
    parsed
}

/// `1500.0` is accepted as `1500`; fractions and out-of-range values are not.
fn whole_number(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
    (f.fract() == 0.0 && f.abs() <= LIMIT).then_some(f as i64)
}

fn parse_player(
    players: Option<&Map<String, Value>>,
    side: &'static str,
    warnings: &mut ErrorAccumulator,
) -> Player {
    let Some(player) = players.and_then(|p| object_field(p, side, side, warnings)) else {
        return Player::default();
    };

    let name = object_field(player, "user", &format!("{side}.user"), warnings)
        .and_then(|user| string_field(user, "name", &format!("{side}.user.name"), warnings));
    let rating = integer_field(player, "rating", &format!("{side}.rating"), warnings);

    Player { name, rating }
}

fn parse_winner(game: &Map<String, Value>, warnings: &mut ErrorAccumulator) -> Option<Color> {
    match string_field(game, "winner", "winner", warnings)?.as_str() {
        "white" => Some(Color::White),
        "black" => Some(Color::Black),
        other => {
            warnings.push(&format!("Conversion error: winner='{other}'"));
            None
        }
    }
}

fn parse_created_at(
    game: &Map<String, Value>,
    warnings: &mut ErrorAccumulator,
) -> Option<DateTime<FixedOffset>> {
    let value = game.get("createdAt")?;
    let parsed = match value {
        Value::Null => return None,
        // Lichess sends milliseconds since the Unix epoch.
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_number))
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.fixed_offset()),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    };

    if parsed.is_none() {
        conversion_error("createdAt", value, warnings);
    }
    parsed
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    // Naive timestamps are taken as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}
