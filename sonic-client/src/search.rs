//! # Search Channel
//!
//! Purpose: Query the index and auto-complete words.
//!
//! Both commands are two-phase: the server first acknowledges with
//! `PENDING <id>`, then delivers `EVENT QUERY|SUGGEST <id> <results...>` on the
//! same connection.

use sonic_common::{
    check_lang, check_word, parse_event, parse_pending, Arg, Channel, EventKind, Lang, SonicResult,
};
use tracing::debug;

use crate::client::{ClientConfig, PooledClient};
use crate::driver::Driver;

/// Client for the `search` channel.
#[derive(Clone)]
pub struct SearchClient {
    client: PooledClient,
}

impl SearchClient {
    /// Opens a search pool using `config`.
    pub fn connect(config: &ClientConfig) -> SonicResult<Self> {
        let client = PooledClient::connect(config, Channel::Search)?;
        Ok(SearchClient { client })
    }

    /// Returns object identifiers matching `terms`.
    pub fn query(
        &self,
        collection: &str,
        bucket: &str,
        terms: &str,
        limit: u32,
        offset: u32,
        lang: &Lang,
    ) -> SonicResult<Vec<String>> {
        check_word("collection", collection)?;
        check_word("bucket", bucket)?;
        check_lang(lang)?;

        let args = [
            Arg::Word(collection),
            Arg::Word(bucket),
            Arg::Quoted(terms),
            Arg::limit(limit),
            Arg::offset(offset),
            Arg::lang(lang.as_str()),
        ];
        let used = if lang.is_auto_detect() { args.len() - 1 } else { args.len() };

        let mut driver = self.client.driver()?;
        await_event(&mut driver, "QUERY", &args[..used], EventKind::Query)
    }

    /// Returns words completing `word`.
    pub fn suggest(
        &self,
        collection: &str,
        bucket: &str,
        word: &str,
        limit: u32,
    ) -> SonicResult<Vec<String>> {
        check_word("collection", collection)?;
        check_word("bucket", bucket)?;

        let mut driver = self.client.driver()?;
        await_event(
            &mut driver,
            "SUGGEST",
            &[
                Arg::Word(collection),
                Arg::Word(bucket),
                Arg::Quoted(word),
                Arg::limit(limit),
            ],
            EventKind::Suggest,
        )
    }

    pub fn ping(&self) -> SonicResult<()> {
        self.client.ping()
    }

    /// Quits all pooled connections.
    pub fn quit(&self) -> SonicResult<()> {
        self.client.quit()
    }

    pub fn client(&self) -> &PooledClient {
        &self.client
    }
}

fn await_event(
    driver: &mut Driver,
    command: &str,
    args: &[Arg<'_>],
    kind: EventKind,
) -> SonicResult<Vec<String>> {
    let pending = driver.exec(command, args)?;
    let event = driver.read_reply()?;
    debug!(event_id = ?parse_pending(&pending), kind = kind.as_str(), "sonic event received");
    Ok(parse_event(&event, kind))
}
