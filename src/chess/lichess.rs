//! Lichess API client: token session, cached account lookup and the
//! paginated NDJSON game export.

use super::error::SourceError;
use super::source::{GameSource, RawGames};
use once_cell::unsync::OnceCell;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://lichess.org";
pub const DEFAULT_PAGE_SIZE: usize = 100;

const NDJSON: &str = "application/x-ndjson";
const USER_AGENT: &str = concat!("checkmate/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated connection to the Lichess API.
pub struct Session {
    http: Client,
    token: String,
    base_url: String,
}

impl Session {
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, SourceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SourceError::Auth("empty API token".to_string()));
        }

        // Exports are long-lived streams, so only connecting is bounded.
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self {
            http,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    fn export_page(
        &self,
        username: &str,
        max: usize,
        until: Option<i64>,
    ) -> Result<PageLines, SourceError> {
        debug!(username, max, until = ?until, "requesting game export page");
        let response = self
            .get(&format!("/api/games/user/{username}"))
            .header(ACCEPT, NDJSON)
            .query(&export_query(max, until))
            .send()?
            .error_for_status()?;

        Ok(Box::new(BufReader::new(response).lines()))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

pub struct LichessClient {
    session: Session,
    page_size: usize,
    limit: Option<usize>,
    account: OnceCell<Account>,
}

impl LichessClient {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
            account: OnceCell::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Caps the number of games any export yields.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// The authenticated account, fetched on first use and then cached for
    /// the lifetime of this client.
    pub fn account(&self) -> Result<&Account, SourceError> {
        self.account.get_or_try_init(|| {
            let response = self.session.get("/api/account").send()?.error_for_status()?;
            let account: Account = response.json()?;
            info!(username = %account.username, "authenticated with lichess");
            Ok(account)
        })
    }

    pub fn username(&self) -> Result<&str, SourceError> {
        Ok(self.account()?.username.as_str())
    }

    /// Lazily exports the games of `username`, newest first.
    pub fn export_games(&self, username: &str) -> GameExport<'_> {
        let session = &self.session;
        let user = username.to_string();
        GameExport::new(
            username,
            self.page_size,
            self.limit,
            Box::new(move |max, until| session.export_page(&user, max, until)),
        )
    }
}

impl GameSource for LichessClient {
    fn games(&self) -> Result<RawGames<'_>, SourceError> {
        let username = self.username()?;
        Ok(Box::new(self.export_games(username)))
    }
}

/// Raw NDJSON lines of one export page.
type PageLines = Box<dyn Iterator<Item = io::Result<String>>>;

/// Requests one page given `max` and the optional `until` bound.
type FetchPage<'a> = Box<dyn FnMut(usize, Option<i64>) -> Result<PageLines, SourceError> + 'a>;

struct Page {
    lines: PageLines,
    requested: usize,
    received: usize,
    line_no: usize,
    last_created_at: Option<i64>,
}

/// Streaming export. Each page is read line by line as the consumer pulls;
/// the next page is requested only once the current one is exhausted.
pub struct GameExport<'a> {
    fetch: FetchPage<'a>,
    username: String,
    page_size: usize,
    limit: Option<usize>,
    until: Option<i64>,
    page: Option<Page>,
    yielded: usize,
    finished: bool,
}

impl<'a> GameExport<'a> {
    fn new(username: &str, page_size: usize, limit: Option<usize>, fetch: FetchPage<'a>) -> Self {
        Self {
            fetch,
            username: username.to_string(),
            page_size,
            limit,
            until: None,
            page: None,
            yielded: 0,
            finished: false,
        }
    }

    fn remaining(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    fn fetch_page(&mut self) -> Result<Page, SourceError> {
        let requested = self
            .remaining()
            .map_or(self.page_size, |left| left.min(self.page_size));

        Ok(Page {
            lines: (self.fetch)(requested, self.until)?,
            requested,
            received: 0,
            line_no: 0,
            last_created_at: None,
        })
    }
}

impl Iterator for GameExport<'_> {
    type Item = Result<Value, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished || self.remaining() == Some(0) {
                self.finished = true;
                return None;
            }

            if self.page.is_none() {
                match self.fetch_page() {
                    Ok(page) => self.page = Some(page),
                    Err(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                }
            }
            let Some(page) = self.page.as_mut() else {
                continue;
            };

            match page.lines.next() {
                Some(Ok(line)) => {
                    page.line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    page.received += 1;
                    self.yielded += 1;

                    return Some(match serde_json::from_str::<Value>(&line) {
                        Ok(value) => {
                            page.last_created_at = value.get("createdAt").and_then(Value::as_i64);
                            Ok(value)
                        }
                        Err(source) => Err(SourceError::Decode {
                            origin: format!("lichess export of {}", self.username),
                            line: page.line_no,
                            source,
                        }),
                    });
                }
                Some(Err(err)) => {
                    self.page = None;
                    self.finished = true;
                    return Some(Err(SourceError::Network(err.to_string())));
                }
                None => {
                    let Some(page) = self.page.take() else {
                        continue;
                    };
                    match next_until(page.requested, page.received, page.last_created_at) {
                        Some(until) => self.until = Some(until),
                        None => self.finished = true,
                    }
                }
            }
        }
    }
}

/// Query parameters for one export page. Only the move list is needed, so
/// the heavier optional payloads are switched off.
pub fn export_query(max: usize, until: Option<i64>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("max", max.to_string()),
        ("moves", "true".to_string()),
        ("pgnInJson", "false".to_string()),
        ("clocks", "false".to_string()),
        ("evals", "false".to_string()),
        ("opening", "false".to_string()),
    ];
    if let Some(until) = until {
        query.push(("until", until.to_string()));
    }
    query
}

/// The `until` bound for the page after a full one, or `None` when the
/// export is exhausted.
pub fn next_until(requested: usize, received: usize, last_created_at: Option<i64>) -> Option<i64> {
    if received < requested {
        return None;
    }
    last_created_at.map(|created_at| created_at - 1)
}
