use super::error::RecordError;
use super::types::GameRecord;
use chrono::{DateTime, Datelike, FixedOffset};
use serde_json::Value;
use shakmaty::Color;
use smallvec::SmallVec;
use std::fmt::{self, Display, Write as _};
use std::io::{self, Write};

type MoveList<'a> = SmallVec<[&'a str; 128]>;

pub const UNKNOWN_DATE: &str = "????.??.??";
pub const UNKNOWN_ELO: &str = "?";
pub const SITE_PREFIX: &str = "https://lichess.org/";

/// Final result marker. Anything but a decisive winner is scored as a draw,
/// including unfinished games.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameResult {
    pub fn from_winner(winner: Option<Color>) -> Self {
        match winner {
            Some(Color::White) => Self::WhiteWins,
            Some(Color::Black) => Self::BlackWins,
            None => Self::Draw,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
        }
    }
}

impl Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders one game as PGN: twelve tag pairs in fixed order, a blank line,
/// then the numbered move text followed by the result.
pub fn format(game: &GameRecord) -> String {
    let result = GameResult::from_winner(game.winner);
    let mut pgn = String::with_capacity(384 + game.moves.len() * 2);

    write_tag(&mut pgn, "Event", format_args!("Lichess {}", game.speed()));
    write_tag(&mut pgn, "Site", format_args!("{SITE_PREFIX}{}", game.id));
    write_tag(&mut pgn, "Date", pgn_date(game.created_at));
    write_tag(&mut pgn, "Round", "?");
    write_tag(&mut pgn, "White", game.players.white.display_name());
    write_tag(&mut pgn, "Black", game.players.black.display_name());
    write_tag(&mut pgn, "Result", result);
    write_tag(&mut pgn, "WhiteElo", Elo(game.players.white.rating));
    write_tag(&mut pgn, "BlackElo", Elo(game.players.black.rating));
    write_tag(&mut pgn, "TimeControl", game.clock);
    write_tag(&mut pgn, "Variant", game.variant());
    write_tag(&mut pgn, "Termination", capitalize_first(game.status()));
    pgn.push('\n');

    write_movetext(&mut pgn, &game.moves, result);
    pgn
}

/// Validates `value` as a game record and renders it.
pub fn format_json(value: &Value) -> Result<String, RecordError> {
    let game = GameRecord::from_json(value)?;
    Ok(format(&game))
}

pub fn format_json_str(raw: &str) -> Result<String, RecordError> {
    let value: Value = serde_json::from_str(raw)?;
    format_json(&value)
}

// Values are written verbatim; embedded quotes are not escaped.
fn write_tag(out: &mut String, name: &str, value: impl Display) {
    let _ = writeln!(out, "[{name} \"{value}\"]");
}

struct Elo(Option<i64>);

impl Display for Elo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rating) => write!(f, "{rating}"),
            None => f.write_str(UNKNOWN_ELO),
        }
    }
}

/// `YYYY.MM.DD` in the timestamp's own offset. Years that do not fit in
/// four digits are written as unknown.
pub fn pgn_date(created_at: Option<DateTime<FixedOffset>>) -> String {
    match created_at {
        Some(dt) if (0..=9999).contains(&dt.year()) => dt.format("%Y.%m.%d").to_string(),
        _ => UNKNOWN_DATE.to_string(),
    }
}

/// Uppercases the first character only; `noStart` becomes `NoStart`.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Builds the move-text line: `1. e4 e5 2. Nf3 1-0`.
///
/// With no moves at all the line is the bare result token.
pub fn movetext(moves: &str, result: GameResult) -> String {
    let mut out = String::with_capacity(moves.len() * 2 + 8);
    write_movetext(&mut out, moves, result);
    out
}

fn write_movetext(out: &mut String, moves: &str, result: GameResult) {
    let tokens: MoveList<'_> = moves.split_whitespace().collect();

    for (idx, pair) in tokens.chunks(2).enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}. {}", idx + 1, pair[0]);
        if let Some(black) = pair.get(1) {
            out.push(' ');
            out.push_str(black);
        }
    }

    if !tokens.is_empty() {
        out.push(' ');
    }
    out.push_str(result.as_str());
}

/// Writes several games as one PGN stream, games separated by a blank line.
pub struct PgnWriter<W: Write> {
    inner: W,
    games_written: usize,
}

impl<W: Write> PgnWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            games_written: 0,
        }
    }

    pub fn write_game(&mut self, pgn: &str) -> io::Result<()> {
        if self.games_written > 0 {
            self.inner.write_all(b"\n")?;
        }
        self.inner.write_all(pgn.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.games_written += 1;
        Ok(())
    }

    pub fn games_written(&self) -> usize {
        self.games_written
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::{Clock, Player};
    use chrono::{TimeZone, Utc};
    use pgn_reader::{Outcome, RawTag, Reader, SanPlus, Visitor};
    use proptest::prelude::*;
    use serde_json::json;
    use shakmaty::ByColor;
    use std::ops::ControlFlow;

    fn sample_game() -> GameRecord {
        GameRecord {
            id: "q7ZvsdUF".to_string(),
            players: ByColor {
                white: Player {
                    name: Some("Alice".to_string()),
                    rating: Some(1500),
                },
                black: Player {
                    name: Some("Bob".to_string()),
                    rating: Some(1480),
                },
            },
            winner: Some(Color::White),
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 5, 14, 2, 11).unwrap().fixed_offset()),
            clock: Clock {
                initial: 300,
                increment: 3,
            },
            variant: Some("standard".to_string()),
            speed: Some("blitz".to_string()),
            status: Some("mate".to_string()),
            moves: "e4 e5 Qh5 Nc6 Bc4 Nf6 Qxf7#".to_string(),
            ..GameRecord::default()
        }
    }

    fn header_lines(pgn: &str) -> Vec<&str> {
        pgn.lines().take_while(|line| !line.is_empty()).collect()
    }

    fn movetext_line(pgn: &str) -> &str {
        pgn.split_once("\n\n").map(|(_, moves)| moves).unwrap_or("")
    }

    #[test]
    fn test_full_game_is_byte_exact() {
        let expected = r#"[Event "Lichess blitz"]
[Site "https://lichess.org/q7ZvsdUF"]
[Date "2024.03.05"]
[Round "?"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]
[WhiteElo "1500"]
[BlackElo "1480"]
[TimeControl "300+3"]
[Variant "standard"]
[Termination "Mate"]

1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0"#;

        assert_eq!(format(&sample_game()), expected);
    }

    #[test]
    fn test_white_win_movetext() {
        let pgn = format_json(&json!({"winner": "white", "moves": "e4 e5 Nf3 Nc6"})).unwrap();
        assert!(pgn.contains("[Result \"1-0\"]\n"));
        assert_eq!(movetext_line(&pgn), "1. e4 e5 2. Nf3 Nc6 1-0");
    }

    #[test]
    fn test_black_win_result() {
        let pgn = format_json(&json!({"winner": "black", "moves": "f3 e5 g4 Qh4#"})).unwrap();
        assert!(pgn.contains("[Result \"0-1\"]\n"));
        assert_eq!(movetext_line(&pgn), "1. f3 e5 2. g4 Qh4# 0-1");
    }

    #[test]
    fn test_odd_move_count_leaves_last_group_without_black_move() {
        let pgn = format_json(&json!({"winner": null, "moves": "e4 e5 Nf3"})).unwrap();
        assert_eq!(movetext_line(&pgn), "1. e4 e5 2. Nf3 1/2-1/2");
    }

    #[test]
    fn test_empty_moves_render_bare_result() {
        let pgn = format_json(&json!({"winner": "white"})).unwrap();
        assert_eq!(movetext_line(&pgn), "1-0");
        assert!(pgn.ends_with("]\n\n1-0"));

        assert_eq!(movetext("", GameResult::Draw), "1/2-1/2");
        assert_eq!(movetext("   \n\t ", GameResult::Draw), "1/2-1/2");
    }

    #[test]
    fn test_irregular_whitespace_in_moves_is_collapsed() {
        assert_eq!(
            movetext("  d4\td5\n\nc4  ", GameResult::BlackWins),
            "1. d4 d5 2. c4 0-1"
        );
    }

    #[test]
    fn test_termination_capitalizes_first_character_only() {
        let pgn = format_json(&json!({"status": "mate"})).unwrap();
        assert!(pgn.contains("[Termination \"Mate\"]"));

        let pgn = format_json(&json!({"status": "noStart"})).unwrap();
        assert!(pgn.contains("[Termination \"NoStart\"]"));

        assert_eq!(capitalize_first("outoftime"), "Outoftime");
        assert_eq!(capitalize_first(""), "");
        assert_eq!(capitalize_first("échec"), "Échec");
    }

    #[test]
    fn test_created_at_renders_padded_date() {
        let pgn = format_json(&json!({"createdAt": "2024-03-05T00:00:00"})).unwrap();
        assert!(pgn.contains("[Date \"2024.03.05\"]"));

        let early = Utc.with_ymd_and_hms(987, 1, 9, 0, 0, 0).unwrap();
        assert_eq!(pgn_date(Some(early.fixed_offset())), "0987.01.09");
        assert_eq!(pgn_date(None), "????.??.??");
    }

    #[test]
    fn test_offset_timestamp_keeps_its_own_calendar_date() {
        let pgn = format_json(&json!({"createdAt": "2024-03-05T23:30:00-02:00"})).unwrap();
        assert!(pgn.contains("[Date \"2024.03.05\"]"));

        let pgn = format_json(&json!({"createdAt": "2024-03-06T00:30:00+01:00"})).unwrap();
        assert!(pgn.contains("[Date \"2024.03.06\"]"));
    }

    #[test]
    fn test_year_beyond_four_digits_is_unknown_date() {
        // 10000-01-01T00:00:00Z
        let pgn = format_json(&json!({"createdAt": 253402300800000i64})).unwrap();
        assert!(pgn.contains("[Date \"????.??.??\"]"));

        let last = format_json(&json!({"createdAt": 253402300799999i64})).unwrap();
        assert!(last.contains("[Date \"9999.12.31\"]"));
    }

    #[test]
    fn test_defaults_for_sparse_record() {
        let pgn = format_json(&json!({"id": "abcd1234"})).unwrap();
        let expected = r#"[Event "Lichess game"]
[Site "https://lichess.org/abcd1234"]
[Date "????.??.??"]
[Round "?"]
[White "Unknown"]
[Black "Unknown"]
[Result "1/2-1/2"]
[WhiteElo "?"]
[BlackElo "?"]
[TimeControl "0+0"]
[Variant "standard"]
[Termination "Unknown"]

1/2-1/2"#;
        assert_eq!(pgn, expected);
    }

    #[test]
    fn test_quotes_in_names_are_not_escaped() {
        let pgn = format_json(&json!({
            "players": {"white": {"user": {"name": "a\"b"}}}
        }))
        .unwrap();
        assert!(pgn.contains("[White \"a\"b\"]"));
    }

    #[test]
    fn test_format_json_rejects_non_object() {
        assert!(matches!(
            format_json(&json!(["e4", "e5"])),
            Err(RecordError::InvalidRecord { found: "array" })
        ));
        assert!(matches!(
            format_json_str("not json"),
            Err(RecordError::Json(_))
        ));
        assert!(matches!(
            format_json_str("\"just a string\""),
            Err(RecordError::InvalidRecord { found: "string" })
        ));
    }

    #[test]
    fn test_writer_separates_games_with_blank_line() {
        let mut writer = PgnWriter::new(Vec::new());
        writer.write_game("[Event \"a\"]\n\n1-0").unwrap();
        writer.write_game("[Event \"b\"]\n\n0-1").unwrap();
        assert_eq!(writer.games_written(), 2);

        let bytes = writer.finish().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "[Event \"a\"]\n\n1-0\n\n[Event \"b\"]\n\n0-1\n"
        );
    }

    #[derive(Default)]
    struct ReadBack {
        tags: Vec<(String, String)>,
        sans: Vec<String>,
        outcome: Option<String>,
    }

    impl Visitor for ReadBack {
        type Tags = ();
        type Movetext = ();
        type Output = ();

        fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
            ControlFlow::Continue(())
        }

        fn tag(
            &mut self,
            _: &mut Self::Tags,
            key: &[u8],
            value: RawTag<'_>,
        ) -> ControlFlow<Self::Output> {
            self.tags.push((
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ));
            ControlFlow::Continue(())
        }

        fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
            ControlFlow::Continue(())
        }

        fn san(&mut self, _: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
            self.sans.push(san.to_string());
            ControlFlow::Continue(())
        }

        fn outcome(&mut self, _: &mut Self::Movetext, outcome: Outcome) -> ControlFlow<Self::Output> {
            self.outcome = Some(outcome.to_string());
            ControlFlow::Continue(())
        }

        fn end_game(&mut self, _: Self::Movetext) -> Self::Output {}
    }

    #[test]
    fn test_output_reads_back_with_pgn_reader() {
        let pgn = format(&sample_game());

        let mut reader = Reader::new(pgn.as_bytes());
        let mut visitor = ReadBack::default();
        reader.read_game(&mut visitor).unwrap();

        let tag_names: Vec<&str> = visitor.tags.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            tag_names,
            [
                "Event",
                "Site",
                "Date",
                "Round",
                "White",
                "Black",
                "Result",
                "WhiteElo",
                "BlackElo",
                "TimeControl",
                "Variant",
                "Termination"
            ]
        );
        assert_eq!(visitor.tags[4], ("White".to_string(), "Alice".to_string()));
        assert_eq!(
            visitor.sans,
            ["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]
        );
        assert_eq!(visitor.outcome.as_deref(), Some("1-0"));
    }

    fn arb_moves() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-h][1-8]|N[a-h][1-8]|O-O|Qxf7#", 0..40)
    }

    fn arb_winner() -> impl Strategy<Value = Option<&'static str>> {
        prop_oneof![
            Just(None),
            Just(Some("white")),
            Just(Some("black")),
            Just(Some("draw")),
        ]
    }

    proptest! {
        #[test]
        fn prop_format_is_deterministic(moves in arb_moves(), winner in arb_winner()) {
            let value = json!({"id": "x", "winner": winner, "moves": moves.join(" ")});
            prop_assert_eq!(format_json(&value).unwrap(), format_json(&value).unwrap());
        }

        #[test]
        fn prop_twelve_headers_then_blank_line(moves in arb_moves(), winner in arb_winner()) {
            let value = json!({"winner": winner, "moves": moves.join(" ")});
            let pgn = format_json(&value).unwrap();
            let lines: Vec<&str> = pgn.lines().collect();

            prop_assert_eq!(header_lines(&pgn).len(), 12);
            prop_assert!(lines[..12].iter().all(|l| l.starts_with('[') && l.ends_with("\"]")));
            prop_assert_eq!(lines[12], "");
            prop_assert_eq!(lines.len(), 14);
        }

        #[test]
        fn prop_move_number_groups_are_half_the_tokens_rounded_up(moves in arb_moves()) {
            let text = movetext(&moves.join(" "), GameResult::Draw);
            let groups = text.split(' ').filter(|t| t.ends_with('.')).count();
            prop_assert_eq!(groups, moves.len().div_ceil(2));
        }

        #[test]
        fn prop_result_header_matches_trailing_token(moves in arb_moves(), winner in arb_winner()) {
            let value = json!({"winner": winner, "moves": moves.join(" ")});
            let pgn = format_json(&value).unwrap();

            let header = header_lines(&pgn)
                .into_iter()
                .find_map(|l| l.strip_prefix("[Result \"")?.strip_suffix("\"]"))
                .unwrap();
            let trailing = movetext_line(&pgn).rsplit(' ').next().unwrap();
            prop_assert_eq!(header, trailing);
        }
    }
}
