//! # Ingest Channel
//!
//! Purpose: Alter the search index: push and pop object text, count indexed
//! words and flush collections, buckets or objects.
//!
//! Text payloads larger than half the server buffer are split into several
//! `PUSH`/`POP` commands for the same object, cut only on character
//! boundaries. The first failing chunk stops the remaining ones.

use sonic_common::{
    check_lang, check_word, expect_reply, parse_result, split_text, Arg, Channel, IngestBulkError,
    IngestBulkRecord, Lang, SonicError, SonicResult,
};

use crate::bulk;
use crate::client::{ClientConfig, PooledClient};
use crate::driver::Driver;

/// Client for the `ingest` channel.
#[derive(Clone)]
pub struct IngestClient {
    client: PooledClient,
}

impl IngestClient {
    /// Opens an ingest pool using `config`.
    pub fn connect(config: &ClientConfig) -> SonicResult<Self> {
        let client = PooledClient::connect(config, Channel::Ingest)?;
        Ok(IngestClient { client })
    }

    /// Indexes `text` for `object`, optionally tagged with a language.
    pub fn push(
        &self,
        collection: &str,
        bucket: &str,
        object: &str,
        text: &str,
        lang: &Lang,
    ) -> SonicResult<()> {
        let mut driver = self.client.driver()?;
        push_text(&mut driver, collection, bucket, object, text, lang)
    }

    /// Removes `text` from `object`. Returns the number of words removed.
    pub fn pop(&self, collection: &str, bucket: &str, object: &str, text: &str) -> SonicResult<u64> {
        let mut driver = self.client.driver()?;
        pop_text(&mut driver, collection, bucket, object, text)
    }

    /// Counts indexed terms in a collection, bucket or object.
    ///
    /// `object` requires `bucket`.
    pub fn count(
        &self,
        collection: &str,
        bucket: Option<&str>,
        object: Option<&str>,
    ) -> SonicResult<u64> {
        check_word("collection", collection)?;
        let mut args = vec![Arg::Word(collection)];
        match (bucket, object) {
            (None, None) => {}
            (Some(bucket), None) => {
                check_word("bucket", bucket)?;
                args.push(Arg::Word(bucket));
            }
            (Some(bucket), Some(object)) => {
                check_word("bucket", bucket)?;
                check_word("object", object)?;
                args.push(Arg::Word(bucket));
                args.push(Arg::Word(object));
            }
            (None, Some(_)) => {
                return Err(SonicError::invalid_argument("COUNT with an object requires a bucket"));
            }
        }

        let mut driver = self.client.driver()?;
        let reply = driver.exec("COUNT", &args)?;
        parse_result(&reply)
    }

    /// Flushes a whole collection. Returns the number of flushed entries.
    pub fn flush_collection(&self, collection: &str) -> SonicResult<u64> {
        check_word("collection", collection)?;
        self.flush("FLUSHC", &[Arg::Word(collection)])
    }

    /// Flushes one bucket of a collection.
    pub fn flush_bucket(&self, collection: &str, bucket: &str) -> SonicResult<u64> {
        check_word("collection", collection)?;
        check_word("bucket", bucket)?;
        self.flush("FLUSHB", &[Arg::Word(collection), Arg::Word(bucket)])
    }

    /// Flushes one object of a bucket.
    pub fn flush_object(&self, collection: &str, bucket: &str, object: &str) -> SonicResult<u64> {
        check_word("collection", collection)?;
        check_word("bucket", bucket)?;
        check_word("object", object)?;
        self.flush(
            "FLUSHO",
            &[Arg::Word(collection), Arg::Word(bucket), Arg::Word(object)],
        )
    }

    fn flush(&self, command: &str, args: &[Arg<'_>]) -> SonicResult<u64> {
        let mut driver = self.client.driver()?;
        let reply = driver.exec(command, args)?;
        parse_result(&reply)
    }

    /// Pushes every record across `parallelism` connections.
    ///
    /// Returns one entry per failed record; an empty list means every record
    /// was indexed.
    pub fn bulk_push(
        &self,
        collection: &str,
        bucket: &str,
        parallelism: usize,
        records: &[IngestBulkRecord],
        lang: &Lang,
    ) -> Vec<IngestBulkError> {
        bulk::dispatch(self.client.pool(), records, parallelism, |driver, record| {
            push_text(driver, collection, bucket, &record.object, &record.text, lang)
        })
    }

    /// Pops every record across `parallelism` connections.
    pub fn bulk_pop(
        &self,
        collection: &str,
        bucket: &str,
        parallelism: usize,
        records: &[IngestBulkRecord],
    ) -> Vec<IngestBulkError> {
        bulk::dispatch(self.client.pool(), records, parallelism, |driver, record| {
            pop_text(driver, collection, bucket, &record.object, &record.text).map(|_| ())
        })
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

/// Sends one `PUSH` per text chunk on `driver`, each expecting `OK`.
pub fn push_text(
    driver: &mut Driver,
    collection: &str,
    bucket: &str,
    object: &str,
    text: &str,
    lang: &Lang,
) -> SonicResult<()> {
    check_word("collection", collection)?;
    check_word("bucket", bucket)?;
    check_word("object", object)?;
    check_lang(lang)?;

    let with_lang = !lang.is_auto_detect();
    for chunk in split_text(text, driver.max_command_bytes()) {
        let args = [
            Arg::Word(collection),
            Arg::Word(bucket),
            Arg::Word(object),
            Arg::Quoted(chunk),
            Arg::lang(lang.as_str()),
        ];
        let used = if with_lang { args.len() } else { args.len() - 1 };
        let reply = driver.exec("PUSH", &args[..used])?;
        expect_reply(&reply, "OK")?;
    }
    Ok(())
}

/// Sends one `POP` per text chunk on `driver` and sums the `RESULT` counts.
pub fn pop_text(
    driver: &mut Driver,
    collection: &str,
    bucket: &str,
    object: &str,
    text: &str,
) -> SonicResult<u64> {
    check_word("collection", collection)?;
    check_word("bucket", bucket)?;
    check_word("object", object)?;

    let mut removed = 0u64;
    for chunk in split_text(text, driver.max_command_bytes()) {
        let reply = driver.exec(
            "POP",
            &[
                Arg::Word(collection),
                Arg::Word(bucket),
                Arg::Word(object),
                Arg::Quoted(chunk),
            ],
        )?;
        removed += parse_result(&reply)?;
    }
    Ok(removed)
}
