use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sqlmate_store::{KvError, KvStore, KvUsage, MemoryKvStore};

/// When a [`ScriptedKvStore`] should fail a `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureRule {
    /// Never inject failures.
    Never,
    /// Quota failure on every write that grows the given key.
    GrowingKey(String),
    /// Quota failure on the first `n` writes to the given key.
    FirstWrites { key: String, count: usize },
    /// Quota failure on writes to `key` for as long as `blocker` is stored.
    WhileStored { key: String, blocker: String },
    /// Non-quota failure on every write to the given key.
    Broken(String),
}

/// Substrate wrapper that injects failures and records writes.
///
/// Writes that pass the rule are forwarded to an inner [`MemoryKvStore`],
/// which still enforces its own capacity.
pub struct ScriptedKvStore {
    inner: MemoryKvStore,
    rule: Mutex<FailureRule>,
    writes: Mutex<Vec<String>>,
    failures: Mutex<usize>,
}

impl ScriptedKvStore {
    pub fn new(rule: FailureRule) -> Self {
        Self::wrap(MemoryKvStore::new(), rule)
    }

    pub fn wrap(inner: MemoryKvStore, rule: FailureRule) -> Self {
        Self {
            inner,
            rule: Mutex::new(rule),
            writes: Mutex::new(Vec::new()),
            failures: Mutex::new(0),
        }
    }

    /// Replace the failure rule.
    pub fn set_rule(&self, rule: FailureRule) {
        *self.rule.lock() = rule;
    }

    /// Keys of every successful `set`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Successful writes to one key.
    pub fn writes_to(&self, key: &str) -> usize {
        self.writes.lock().iter().filter(|written| *written == key).count()
    }

    /// Forget recorded writes.
    pub fn reset_writes(&self) {
        self.writes.lock().clear();
    }

    /// Number of injected failures so far.
    pub fn injected_failures(&self) -> usize {
        *self.failures.lock()
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryKvStore {
        &self.inner
    }

    async fn injected(&self, key: &str, value: &Value) -> Result<Option<KvError>, KvError> {
        let rule = self.rule.lock().clone();
        let quota = || KvError::CapacityExceeded {
            key: key.to_string(),
            required: 1,
            capacity: 0,
        };
        let failure = match rule {
            FailureRule::Never => None,
            FailureRule::GrowingKey(target) if target == key => {
                let previous = match self.inner.get(key).await? {
                    Some(previous) => serde_json::to_vec(&previous)?.len(),
                    None => 0,
                };
                (serde_json::to_vec(value)?.len() > previous).then(quota)
            }
            FailureRule::FirstWrites { key: target, count } if target == key => {
                (count > 0).then(|| {
                    self.set_rule(FailureRule::FirstWrites {
                        key: target,
                        count: count - 1,
                    });
                    quota()
                })
            }
            FailureRule::WhileStored {
                key: target,
                blocker,
            } if target == key => self.inner.get(&blocker).await?.is_some().then(quota),
            FailureRule::Broken(target) if target == key => {
                Some(KvError::Backend(format!("injected failure for {key}")))
            }
            _ => None,
        };
        if failure.is_some() {
            *self.failures.lock() += 1;
        }
        Ok(failure)
    }
}

#[async_trait]
impl KvStore for ScriptedKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KvError> {
        if let Some(err) = self.injected(key, &value).await? {
            return Err(err);
        }
        self.inner.set(key, value).await?;
        self.writes.lock().push(key.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        self.inner.remove(key).await
    }

    async fn list_children(&self, namespace: &str) -> Result<Vec<String>, KvError> {
        self.inner.list_children(namespace).await
    }

    async fn usage(&self) -> Result<KvUsage, KvError> {
        self.inner.usage().await
    }
}
