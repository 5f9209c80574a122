//! Turns Lichess game records into PGN, pulls them from the Lichess export
//! API or from NDJSON export files, and optionally asks a chat completion
//! service for tutor-style commentary on each game.

pub mod chess;

pub use chess::{GameRecord, GameSource, format};
