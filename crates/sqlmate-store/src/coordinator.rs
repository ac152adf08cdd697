//! Retry loop that frees space whenever a write hits the storage quota.

use crate::error::StoreError;
use crate::eviction::EvictionPolicy;
use log::{debug, info, warn};
use sqlmate_config::EvictionConfig;
use std::future::Future;
use tokio::sync::{Mutex, MutexGuard};

/// How the coordinator is currently trying to make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Other chats are still candidates for eviction.
    EvictChats,
    /// Only the protected chat is left; its oldest messages are pruned.
    PruneMessages,
}

/// Result of one recovery step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    EvictedChats(usize),
    PrunedMessages(usize),
    Exhausted,
}

/// Runs writes, evicting old chats or pruning old messages on quota failure.
///
/// The protected chat (the one being written) is never evicted, only pruned.
/// Coordinated writes are serialized by an async gate, so concurrent callers
/// on the same coordinator never evict from a stale chat listing.
pub struct SaveCoordinator {
    policy: EvictionPolicy,
    limits: EvictionConfig,
    gate: Mutex<()>,
}

impl SaveCoordinator {
    pub fn new(policy: EvictionPolicy, limits: EvictionConfig) -> Self {
        Self {
            policy,
            limits,
            gate: Mutex::new(()),
        }
    }

    /// Limits in effect.
    pub fn limits(&self) -> EvictionConfig {
        self.limits
    }

    /// Policy used to free space.
    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Hold the write gate so no coordinated write runs until the guard drops.
    pub async fn hold(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Run `write` until it succeeds, fails with a non-quota error, or no
    /// more space can be freed.
    ///
    /// `write` is invoked once per attempt and must be safe to repeat.
    /// Eviction and pruning write through the stores directly and never
    /// re-enter this loop.
    pub async fn run<T, F, Fut>(&self, protected: Option<&str>, mut write: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let _gate = self.hold().await;
        let mut phase = Phase::EvictChats;
        let mut attempts = 0;
        let mut budget = None;
        loop {
            attempts += 1;
            let err = match write().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!("write succeeded after freeing space (attempts={attempts})");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };
            if !err.is_capacity_exceeded() {
                return Err(err);
            }
            debug!("write hit storage quota (attempt={attempts}, protected={protected:?}): {err}");
            let cap = match budget {
                Some(cap) => cap,
                None => *budget.insert(self.attempt_budget(protected).await?),
            };
            if attempts >= cap {
                warn!("giving up after attempt cap (attempts={attempts}, cap={cap}, protected={protected:?})");
                return Err(StoreError::StorageExhausted { attempts });
            }
            match self.recover(protected, &mut phase).await? {
                Recovery::EvictedChats(count) => {
                    debug!("retrying after evicting chats (count={count})");
                }
                Recovery::PrunedMessages(count) => {
                    debug!("retrying after pruning messages (count={count})");
                }
                Recovery::Exhausted => {
                    warn!(
                        "storage exhausted; nothing left to evict (attempts={attempts}, protected={protected:?})"
                    );
                    return Err(StoreError::StorageExhausted { attempts });
                }
            }
        }
    }

    /// Attempts allowed for one write: `max_attempts` on top of the rounds
    /// needed to evict every other chat and prune the protected one empty.
    async fn attempt_budget(&self, protected: Option<&str>) -> Result<usize, StoreError> {
        let chats = self.policy.evictable_chat_count(protected).await?;
        let messages = match protected {
            Some(chat_id) => self.policy.prunable_message_count(chat_id).await?,
            None => 0,
        };
        let rounds = chats.div_ceil(self.limits.chat_batch.max(1))
            + messages.div_ceil(self.limits.prune_batch.max(1));
        debug!("attempt budget (rounds={rounds}, chats={chats}, messages={messages})");
        Ok(self.limits.max_attempts.saturating_add(rounds))
    }

    /// Free space for the next attempt.
    async fn recover(
        &self,
        protected: Option<&str>,
        phase: &mut Phase,
    ) -> Result<Recovery, StoreError> {
        if *phase == Phase::EvictChats {
            let evicted = self
                .policy
                .evict_oldest_chats(self.limits.chat_batch, protected)
                .await?;
            if evicted > 0 {
                return Ok(Recovery::EvictedChats(evicted));
            }
            *phase = Phase::PruneMessages;
        }
        let Some(chat_id) = protected else {
            return Ok(Recovery::Exhausted);
        };
        let pruned = self
            .policy
            .prune_oldest_messages(chat_id, self.limits.prune_batch)
            .await?;
        if pruned == 0 {
            return Ok(Recovery::Exhausted);
        }
        Ok(Recovery::PrunedMessages(pruned))
    }
}
