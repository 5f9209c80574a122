use super::error::{GameError, SourceError};
use super::pgn;
use super::types::GameRecord;
use serde_json::Value;
use tracing::{debug, warn};

/// Lazily pulled sequence of raw (unvalidated) game values.
pub type RawGames<'a> = Box<dyn Iterator<Item = Result<Value, SourceError>> + 'a>;

/// Producer of game records for the pipeline.
///
/// Every call to `games` starts a fresh sequence; nothing is materialized up
/// front.
pub trait GameSource {
    fn games(&self) -> Result<RawGames<'_>, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedGame {
    pub id: String,
    pub pgn: String,
}

/// Formats each pulled record independently; a failing record becomes an
/// error item and the sequence continues.
pub struct PgnGames<I> {
    inner: I,
    index: usize,
}

pub fn pgn_games<I>(games: I) -> PgnGames<I::IntoIter>
where
    I: IntoIterator<Item = Result<Value, SourceError>>,
{
    PgnGames {
        inner: games.into_iter(),
        index: 0,
    }
}

impl<I> Iterator for PgnGames<I>
where
    I: Iterator<Item = Result<Value, SourceError>>,
{
    type Item = Result<FormattedGame, GameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        self.index += 1;

        Some(match item {
            Ok(value) => format_one(&value, self.index),
            Err(err) => Err(GameError::Source(err)),
        })
    }
}

fn format_one(value: &Value, index: usize) -> Result<FormattedGame, GameError> {
    let mut game = GameRecord::from_json(value).map_err(|source| GameError::Record {
        id: format!("#{index}"),
        source,
    })?;

    if let Some(diagnostics) = game.warnings.take() {
        warn!(game = %game.id, index, "{diagnostics}");
    }

    let pgn = pgn::format(&game);
    debug!(game = %game.id, index, bytes = pgn.len(), "formatted game");

    Ok(FormattedGame { id: game.id, pgn })
}

/// Outcome counts of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub formatted: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn record<T, E>(&mut self, item: &Result<T, E>) {
        match item {
            Ok(_) => self.formatted += 1,
            Err(_) => self.failed += 1,
        }
    }
}
