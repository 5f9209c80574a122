use checkmate::chess::lichess::DEFAULT_PAGE_SIZE;
use checkmate::chess::{
    BatchStats, CompressionMode, Config, FormattedGame, GameError, GameSource, LichessClient,
    NdjsonFileSource, OpenAiClient, PgnWriter, Session, Tutor, log, pgn_games,
};
use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "checkmate", version)]
#[command(about = "Export Lichess games as PGN and ask a chat model for commentary")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export the authenticated user's games as PGN
    Export {
        /// Stop after this many games
        #[arg(long)]
        max: Option<usize>,

        /// Games requested per export page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert NDJSON export files (glob pattern) to PGN
    Convert {
        pattern: String,

        /// Input compression: zstd or none
        #[arg(long, default_value = "none")]
        compression: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export recent games and print tutor commentary for each
    Analyze {
        /// Number of most recent games to analyze
        #[arg(long, default_value_t = 1)]
        max: usize,

        /// Completion model, overrides CHECKMATE_MODEL
        #[arg(long)]
        model: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    log::init(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Export {
            max,
            page_size,
            output,
        } => {
            let config = Config::from_env()?;
            let client = lichess_client(&config)?
                .with_page_size(page_size)
                .with_limit(max);
            write_pgn(&client, open_output(output.as_ref())?)
        }
        Command::Convert {
            pattern,
            compression,
            output,
        } => {
            let source = NdjsonFileSource::new(&pattern, CompressionMode::parse(&compression)?)?;
            write_pgn(&source, open_output(output.as_ref())?)
        }
        Command::Analyze { max, model } => {
            let config = Config::from_env()?;
            let client = lichess_client(&config)?
                .with_page_size(max.clamp(1, DEFAULT_PAGE_SIZE))
                .with_limit(Some(max));
            let service = OpenAiClient::with_base_url(config.openai_key()?, &config.openai_url)?;
            let tutor = Tutor::new(service).with_model(model.unwrap_or(config.model));
            analyze(&client, &tutor)
        }
    }
}

fn lichess_client(config: &Config) -> Result<LichessClient, Box<dyn Error>> {
    let session = Session::with_base_url(config.lichess_token()?, &config.lichess_url)?;
    Ok(LichessClient::new(session))
}

fn open_output(path: Option<&PathBuf>) -> io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// Passes formatted games through, logging per-record failures and
/// stopping on the first fatal one.
fn next_game(
    item: Result<FormattedGame, GameError>,
    stats: &mut BatchStats,
) -> Result<Option<FormattedGame>, GameError> {
    stats.record(&item);
    match item {
        Ok(game) => Ok(Some(game)),
        Err(GameError::Source(err)) if err.is_fatal() => Err(GameError::Source(err)),
        Err(err) => {
            warn!("skipping game: {err}");
            Ok(None)
        }
    }
}

fn write_pgn(source: &dyn GameSource, out: Box<dyn Write>) -> Result<(), Box<dyn Error>> {
    let mut writer = PgnWriter::new(out);
    let mut stats = BatchStats::default();

    for item in pgn_games(source.games()?) {
        if let Some(game) = next_game(item, &mut stats)? {
            writer.write_game(&game.pgn)?;
        }
    }
    let written = writer.games_written();
    writer.finish()?;

    info!(
        written,
        formatted = stats.formatted,
        failed = stats.failed,
        "export finished"
    );
    Ok(())
}

fn analyze(source: &dyn GameSource, tutor: &Tutor<OpenAiClient>) -> Result<(), Box<dyn Error>> {
    let mut writer = PgnWriter::new(BufWriter::new(io::stdout().lock()));
    let mut stats = BatchStats::default();

    for item in pgn_games(source.games()?) {
        let Some(game) = next_game(item, &mut stats)? else {
            continue;
        };
        info!(game = %game.id, model = tutor.model(), "analyzing game");
        let annotated = tutor.analyze(&game.pgn)?;
        writer.write_game(&annotated)?;
    }
    writer.finish()?;

    if stats.formatted == 0 {
        warn!("no games to analyze");
    }
    Ok(())
}
