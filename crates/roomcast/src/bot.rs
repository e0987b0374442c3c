//! The chat bot: answers `/` commands sent in a room.

use std::time::Duration;

use async_trait::async_trait;
use roomcast_protocol::{BOT_SENDER, RenderedMessage, RoomName};

/// Help text sent for `/help` and appended to unknown commands.
pub const HELP_MENU: &str = "These are the available commands:\n\
/help: shows this help menu\n\
/stock: fetches the value of a given stock using the format '/stock=APPL.US'";

/// Errors from fetching or reading a stock quote.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("quote request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("quote service answered with status {0}")]
    Status(u16),

    #[error("malformed quote response: {0}")]
    Malformed(String),
}

/// Turns a command into the bot's reply.
///
/// An `Err` suppresses the reply; the user's own message is still
/// delivered.
#[async_trait]
pub trait CommandProcessor: Send + Sync {
    async fn process(
        &self,
        room: &RoomName,
        command: &str,
    ) -> Result<RenderedMessage, BotError>;
}

/// Where stock prices come from.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Returns the raw close price for `code`, exactly as the source
    /// reports it (`"N/D"` for an unknown symbol).
    async fn close_price(&self, code: &str) -> Result<String, BotError>;
}

/// The default bot: `/help` and `/stock=<CODE>`.
pub struct StockBot<Q> {
    quotes: Q,
}

impl<Q: QuoteSource> StockBot<Q> {
    pub fn new(quotes: Q) -> Self {
        Self { quotes }
    }

    async fn reply_text(&self, command: &str) -> String {
        if command.starts_with("/help") {
            return HELP_MENU.to_string();
        }
        if command.starts_with("/stock") {
            return self.stock_reply(&stock_code(command)).await;
        }
        format!("invalid command;\n{HELP_MENU}")
    }

    async fn stock_reply(&self, code: &str) -> String {
        match self.quotes.close_price(code).await {
            Ok(price) if price == "N/D" => {
                format!("{code} stock not found; do you want to try another one?")
            }
            Ok(price) => format!("{code} value is ${price} per unit"),
            Err(BotError::Malformed(reason)) => {
                tracing::warn!(code, reason = %reason, "unreadable stock quote");
                format!(
                    "failed to fetch {code} stock value; please contact system admin."
                )
            }
            Err(e) => {
                tracing::warn!(code, error = %e, "stock quote fetch failed");
                format!("failed to fetch {code} stock value; please try again.")
            }
        }
    }
}

#[async_trait]
impl<Q: QuoteSource> CommandProcessor for StockBot<Q> {
    async fn process(
        &self,
        room: &RoomName,
        command: &str,
    ) -> Result<RenderedMessage, BotError> {
        let text = self.reply_text(command.trim()).await;
        Ok(RenderedMessage::now(room.clone(), BOT_SENDER, text))
    }
}

/// `/stock=aapl.us extra` becomes `AAPL.US`.
fn stock_code(command: &str) -> String {
    let first = command.split(' ').next().unwrap_or_default();
    first.trim_start_matches("/stock=").to_uppercase()
}

// ---------------------------------------------------------------------------
// Stooq
// ---------------------------------------------------------------------------

/// Quotes from stooq.com's CSV endpoint.
pub struct StooqQuotes {
    client: reqwest::Client,
    base_url: String,
}

impl StooqQuotes {
    pub const DEFAULT_BASE_URL: &'static str = "https://stooq.com";
    const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Result<Self, BotError> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Points the source at another host serving the same CSV format.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, BotError> {
        let client = reqwest::Client::builder().timeout(Self::TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for StooqQuotes {
    async fn close_price(&self, code: &str) -> Result<String, BotError> {
        let url = format!("{}/q/l/", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("s", code), ("f", "sd2t2ohlcv"), ("h", ""), ("e", "csv")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_close_price(&body)
    }
}

/// Reads the close column from stooq's CSV: a header line, then
/// `Symbol,Date,Time,Open,High,Low,Close,Volume`.
fn parse_close_price(body: &str) -> Result<String, BotError> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    lines
        .next()
        .ok_or_else(|| BotError::Malformed("empty response".into()))?;
    let record = lines
        .next()
        .ok_or_else(|| BotError::Malformed("missing quote row".into()))?;

    record
        .split(',')
        .nth(6)
        .map(|price| price.trim().to_string())
        .ok_or_else(|| {
            BotError::Malformed(format!("quote row has too few columns: {record}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers with a fixed result and remembers the codes asked for.
    struct FixedQuotes {
        answer: fn() -> Result<String, BotError>,
        asked: Mutex<Vec<String>>,
    }

    impl FixedQuotes {
        fn new(answer: fn() -> Result<String, BotError>) -> Self {
            Self {
                answer,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn close_price(&self, code: &str) -> Result<String, BotError> {
            self.asked.lock().unwrap().push(code.to_string());
            (self.answer)()
        }
    }

    fn room() -> RoomName {
        RoomName::try_from("r1").unwrap()
    }

    async fn reply(bot: &StockBot<FixedQuotes>, command: &str) -> String {
        bot.process(&room(), command)
            .await
            .unwrap()
            .content()
            .to_string()
    }

    #[tokio::test]
    async fn test_help_returns_menu_from_bot() {
        let bot = StockBot::new(FixedQuotes::new(|| Ok("1".into())));
        let msg = bot.process(&room(), "/help").await.unwrap();
        assert_eq!(msg.sender(), BOT_SENDER);
        assert_eq!(msg.content(), HELP_MENU);
    }

    #[tokio::test]
    async fn test_stock_reports_price_for_uppercased_code() {
        let bot = StockBot::new(FixedQuotes::new(|| Ok("189.5".into())));
        assert_eq!(
            reply(&bot, "/stock=aapl.us").await,
            "AAPL.US value is $189.5 per unit"
        );
        assert_eq!(*bot.quotes.asked.lock().unwrap(), vec!["AAPL.US"]);
    }

    #[tokio::test]
    async fn test_stock_not_found() {
        let bot = StockBot::new(FixedQuotes::new(|| Ok("N/D".into())));
        assert_eq!(
            reply(&bot, "/stock=NOPE").await,
            "NOPE stock not found; do you want to try another one?"
        );
    }

    #[tokio::test]
    async fn test_stock_fetch_failure_asks_to_retry() {
        let bot = StockBot::new(FixedQuotes::new(|| Err(BotError::Status(502))));
        assert_eq!(
            reply(&bot, "/stock=AAPL.US").await,
            "failed to fetch AAPL.US stock value; please try again."
        );
    }

    #[tokio::test]
    async fn test_stock_malformed_response_points_to_admin() {
        let bot = StockBot::new(FixedQuotes::new(|| {
            Err(BotError::Malformed("junk".into()))
        }));
        assert_eq!(
            reply(&bot, "/stock=AAPL.US").await,
            "failed to fetch AAPL.US stock value; please contact system admin."
        );
    }

    #[tokio::test]
    async fn test_unknown_command_includes_help() {
        let bot = StockBot::new(FixedQuotes::new(|| Ok("1".into())));
        assert_eq!(
            reply(&bot, "/dance").await,
            format!("invalid command;\n{HELP_MENU}")
        );
    }

    #[test]
    fn test_stock_code_ignores_trailing_words() {
        assert_eq!(stock_code("/stock=msft.us please"), "MSFT.US");
        assert_eq!(stock_code("/stock=GOOG.US"), "GOOG.US");
    }

    #[test]
    fn test_parse_close_price() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
                    AAPL.US,2024-05-01,22:00:09,169.58,172.71,169.11,169.3,50383147\n";
        assert_eq!(parse_close_price(body).unwrap(), "169.3");
    }

    #[test]
    fn test_parse_close_price_unknown_symbol() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\r\n\
                    NOPE,N/D,N/D,N/D,N/D,N/D,N/D,N/D\r\n";
        assert_eq!(parse_close_price(body).unwrap(), "N/D");
    }

    #[test]
    fn test_parse_close_price_rejects_short_bodies() {
        assert!(matches!(
            parse_close_price("Symbol,Date\n"),
            Err(BotError::Malformed(_))
        ));
        assert!(matches!(
            parse_close_price("h\nA,B,C\n"),
            Err(BotError::Malformed(_))
        ));
    }
}
