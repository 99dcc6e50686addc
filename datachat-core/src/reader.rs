//! Long-poll message reader.
//!
//! A poll request moves through `Idle → Waiting → Returning`: it queries the
//! store, and while the page is empty it sleeps for the poll interval and
//! queries again.  It returns on the first non-empty page, when `max_wait`
//! elapses, or when the shared switch is cancelled.  The wait is a plain
//! `select!` over a timer and the switch, so dropping the future (the client
//! went away) stops it at the next await point.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::PollConfig;
use crate::store::{MessageFilter, MessagePage, MessageStore};

pub struct LongPollReader<S> {
    store: Arc<S>,
    config: PollConfig,
    switch: CancellationToken,
}

impl<S> Clone for LongPollReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            switch: self.switch.clone(),
        }
    }
}

impl<S: MessageStore> LongPollReader<S> {
    pub fn new(store: Arc<S>, config: PollConfig) -> Self {
        Self {
            store,
            config,
            switch: CancellationToken::new(),
        }
    }

    /// Token that, once cancelled, makes every waiting and future poll return
    /// immediately.  Cancelled on shutdown.
    pub fn switch(&self) -> &CancellationToken {
        &self.switch
    }

    /// Disable polling for this reader and its clones.
    pub fn disable(&self) {
        self.switch.cancel();
    }

    pub fn polling_enabled(&self) -> bool {
        self.config.enabled && !self.switch.is_cancelled()
    }

    /// List messages of a chat, optionally blocking until one matches.
    pub async fn list(
        &self,
        chat_id: Uuid,
        filter: &MessageFilter,
        poll: bool,
    ) -> Result<MessagePage, sqlx::Error> {
        let page = self.store.list(chat_id, filter).await?;
        if !poll || !self.polling_enabled() || !page.messages.is_empty() {
            return Ok(page);
        }

        let deadline = Instant::now() + self.config.max_wait;
        let mut polls = 1u32;
        let mut page = page;
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(%chat_id, polls, "long poll reached max wait");
                return Ok(page);
            }
            let nap = self.config.interval.min(deadline - now);

            tokio::select! {
                _ = self.switch.cancelled() => {
                    debug!(%chat_id, polls, "long poll interrupted");
                    return Ok(page);
                }
                _ = tokio::time::sleep(nap) => {}
            }

            page = self.store.list(chat_id, filter).await?;
            polls += 1;
            if !page.messages.is_empty() {
                debug!(%chat_id, polls, count = page.messages.len(), "long poll found messages");
                return Ok(page);
            }
        }
    }
}
