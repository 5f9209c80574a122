pub mod commentary;
pub mod config;
pub mod error;
pub mod lichess;
pub mod log;
pub mod pgn;
pub mod reader;
pub mod source;
pub mod types;

pub use commentary::{CommentaryService, OpenAiClient, Tutor};
pub use config::Config;
pub use error::{ConfigError, ErrorAccumulator, GameError, RecordError, ServiceError, SourceError};
pub use lichess::{LichessClient, Session};
pub use pgn::{GameResult, PgnWriter, format, format_json, format_json_str};
pub use reader::{CompressionMode, NdjsonFileSource};
pub use source::{BatchStats, FormattedGame, GameSource, PgnGames, RawGames, pgn_games};
pub use types::{Clock, GameRecord, Player};
