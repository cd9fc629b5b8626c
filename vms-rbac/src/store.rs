//! Shared rule store
//!
//! Readers get an immutable `Arc<RuleSet>` snapshot; writers serialize on a
//! single writer lock, build the next set from the current one and swap it in
//! whole. A reader therefore never sees a partially applied write, and a
//! caller always observes its own completed writes on the next read.
//!
//! When a [`RuleRepository`] backs the store, the snapshot is refreshed from
//! it periodically. A snapshot older than `max_staleness` is refreshed
//! synchronously before use; if that refresh fails the store serves an empty
//! rule set so every non-admin check denies. Repository calls are bounded by
//! `fetch_timeout`, so a hung backend turns into a denial rather than a stall.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::{
    adapter::RuleRepository,
    config::{RbacConfig, SnapshotSettings},
    error::{RbacError, RbacResult},
    models::{NewRule, Resource, Role, Rule, RuleId, RulePatch},
    rules::RuleSet,
};

/// Cloneable handle to the shared rule set
#[derive(Clone)]
pub struct RuleStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    current: RwLock<Snapshot>,
    writer: Mutex<()>,
    repository: Option<Arc<dyn RuleRepository>>,
    settings: SnapshotSettings,
}

struct Snapshot {
    rules: Arc<RuleSet>,
    loaded_at: Instant,
    /// Bumped by every completed repository load
    generation: u64,
}

/// Await a repository call, failing as a backend error after `limit`
async fn bounded<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = RbacResult<T>>,
) -> RbacResult<T> {
    timeout(limit, call).await.map_err(|_| {
        RbacError::backend(format!(
            "rule repository {} timed out after {}ms",
            operation,
            limit.as_millis()
        ))
    })?
}

impl RuleStore {
    /// Create a store that lives purely in memory and never goes stale
    pub fn in_memory(rules: RuleSet) -> Self {
        Self::build(rules, None, SnapshotSettings::default())
    }

    /// Create an in-memory store holding the configured seed rules
    pub fn from_config(config: &RbacConfig) -> RbacResult<Self> {
        Ok(Self::in_memory(config.seed_rule_set()?))
    }

    /// Create a store backed by a repository, loading its current rules
    pub async fn with_repository(
        repository: Arc<dyn RuleRepository>,
        settings: SnapshotSettings,
    ) -> RbacResult<Self> {
        let loaded = bounded(settings.fetch_timeout, "load", repository.load_all()).await?;
        let rules = RuleSet::from_rules(loaded)?;
        info!(rules = rules.len(), "Loaded access rules from repository");
        Ok(Self::build(rules, Some(repository), settings))
    }

    /// Create a repository-backed store, writing the seed rules first if the
    /// repository holds none
    pub async fn seeded(
        repository: Arc<dyn RuleRepository>,
        config: &RbacConfig,
    ) -> RbacResult<Self> {
        let limit = config.snapshot.fetch_timeout;
        if bounded(limit, "load", repository.load_all()).await?.is_empty() {
            let seed = config.seed_rule_set()?;
            for rule in seed.iter() {
                bounded(limit, "insert", repository.insert(rule)).await?;
            }
            info!(rules = seed.len(), "Seeded empty rule repository");
        }
        Self::with_repository(repository, config.snapshot).await
    }

    fn build(
        rules: RuleSet,
        repository: Option<Arc<dyn RuleRepository>>,
        settings: SnapshotSettings,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(Snapshot {
                    rules: Arc::new(rules),
                    loaded_at: Instant::now(),
                    generation: 0,
                }),
                writer: Mutex::new(()),
                repository,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> SnapshotSettings {
        self.inner.settings
    }

    /// Current rule set for evaluation.
    ///
    /// Never fails: an unusable snapshot degrades to an empty rule set.
    pub async fn snapshot(&self) -> Arc<RuleSet> {
        let seen = {
            let current = self.inner.current.read().await;
            if !self.is_stale(&current) {
                return current.rules.clone();
            }
            current.generation
        };

        // Covers waiting for the writer lock as well as the load itself
        let limit = self.inner.settings.fetch_timeout;
        match bounded(limit, "refresh", self.reload(seen)).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Rule snapshot is stale and refresh failed; denying by default");
                Arc::new(RuleSet::new())
            }
        }
    }

    /// Reload the rule set from the repository, if there is one
    pub async fn refresh(&self) -> RbacResult<Arc<RuleSet>> {
        let seen = self.inner.current.read().await.generation;
        self.reload(seen).await
    }

    /// Load from the repository unless another load completed after
    /// generation `seen` was observed
    async fn reload(&self, seen: u64) -> RbacResult<Arc<RuleSet>> {
        let Some(repository) = &self.inner.repository else {
            return Ok(self.current_rules().await);
        };

        // Hold the writer lock so a refresh cannot overwrite a newer write
        let _writer = self.inner.writer.lock().await;
        {
            let current = self.inner.current.read().await;
            if current.generation != seen {
                debug!("Rule snapshot reloaded while waiting; reusing it");
                return Ok(current.rules.clone());
            }
        }

        let limit = self.inner.settings.fetch_timeout;
        let loaded = bounded(limit, "load", repository.load_all()).await?;
        let loaded = Arc::new(RuleSet::from_rules(loaded)?);

        let mut current = self.inner.current.write().await;
        current.rules = loaded.clone();
        current.loaded_at = Instant::now();
        current.generation += 1;
        debug!(rules = loaded.len(), "Refreshed rule snapshot");
        Ok(loaded)
    }

    /// Refresh the snapshot every `refresh_interval` until the store is dropped
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let period = self.inner.settings.refresh_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let store = RuleStore { inner };
                if let Err(e) = store.refresh().await {
                    warn!(error = %e, "Periodic rule refresh failed");
                }
            }
        })
    }

    /// Insert a new rule. A rule already governing the same role and
    /// resource is a conflict; it is never replaced.
    pub async fn upsert(&self, rule: NewRule) -> RbacResult<Rule> {
        let _writer = self.inner.writer.lock().await;
        let base = self.current_rules().await;
        base.check_new(&rule)?;

        let rule = rule.into_rule();
        if let Some(repository) = &self.inner.repository {
            bounded(self.inner.settings.fetch_timeout, "insert", repository.insert(&rule)).await?;
        }

        let mut next = (*base).clone();
        next.insert(rule.clone())?;
        self.publish(next).await;

        info!(rule_id = %rule.id, role = %rule.role, resource = %rule.resource, actions = %rule.actions, "Created access rule");
        Ok(rule)
    }

    /// Apply a patch to an existing rule
    pub async fn update(&self, id: RuleId, patch: RulePatch) -> RbacResult<Rule> {
        let _writer = self.inner.writer.lock().await;
        let base = self.current_rules().await;
        let updated = base.patched(id, &patch)?;

        if let Some(repository) = &self.inner.repository {
            bounded(self.inner.settings.fetch_timeout, "update", repository.update(&updated))
                .await?;
        }

        let mut next = (*base).clone();
        next.replace(updated.clone())?;
        self.publish(next).await;

        info!(rule_id = %updated.id, role = %updated.role, resource = %updated.resource, actions = %updated.actions, "Updated access rule");
        Ok(updated)
    }

    /// Delete a rule
    pub async fn remove(&self, id: RuleId) -> RbacResult<Rule> {
        let _writer = self.inner.writer.lock().await;
        let base = self.current_rules().await;
        if base.get(id).is_none() {
            return Err(RbacError::RuleNotFound { rule_id: id });
        }

        if let Some(repository) = &self.inner.repository {
            bounded(self.inner.settings.fetch_timeout, "delete", repository.delete(id)).await?;
        }

        let mut next = (*base).clone();
        let removed = next.remove(id)?;
        self.publish(next).await;

        info!(rule_id = %removed.id, role = %removed.role, resource = %removed.resource, "Deleted access rule");
        Ok(removed)
    }

    /// Rule governing `role` on `resource`, if any
    pub async fn find(&self, role: Role, resource: Resource) -> Option<Rule> {
        self.snapshot().await.find(role, resource).cloned()
    }

    /// All rules in insertion order
    pub async fn list(&self) -> Vec<Rule> {
        self.snapshot().await.to_vec()
    }

    async fn current_rules(&self) -> Arc<RuleSet> {
        self.inner.current.read().await.rules.clone()
    }

    async fn publish(&self, next: RuleSet) {
        let mut current = self.inner.current.write().await;
        current.rules = Arc::new(next);
    }

    fn is_stale(&self, snapshot: &Snapshot) -> bool {
        self.inner.repository.is_some()
            && snapshot.loaded_at.elapsed() >= self.inner.settings.max_staleness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryRuleRepository;
    use crate::models::{Action, Principal};
    use crate::policy::PolicyEvaluator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Repository whose availability can be toggled
    struct FlakyRepository {
        inner: InMemoryRuleRepository,
        available: AtomicBool,
    }

    impl FlakyRepository {
        fn new() -> Self {
            Self {
                inner: InMemoryRuleRepository::new(),
                available: AtomicBool::new(true),
            }
        }

        fn check(&self) -> RbacResult<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RbacError::backend("connection refused"))
            }
        }
    }

    #[async_trait]
    impl RuleRepository for FlakyRepository {
        async fn load_all(&self) -> RbacResult<Vec<Rule>> {
            self.check()?;
            self.inner.load_all().await
        }

        async fn insert(&self, rule: &Rule) -> RbacResult<()> {
            self.check()?;
            self.inner.insert(rule).await
        }

        async fn update(&self, rule: &Rule) -> RbacResult<()> {
            self.check()?;
            self.inner.update(rule).await
        }

        async fn delete(&self, id: RuleId) -> RbacResult<()> {
            self.check()?;
            self.inner.delete(id).await
        }
    }

    /// Repository that answers the first load and then never responds
    struct HangingRepository {
        rules: Vec<Rule>,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl RuleRepository for HangingRepository {
        async fn load_all(&self) -> RbacResult<Vec<Rule>> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(self.rules.clone());
            }
            std::future::pending::<RbacResult<Vec<Rule>>>().await
        }

        async fn insert(&self, _rule: &Rule) -> RbacResult<()> {
            std::future::pending::<RbacResult<()>>().await
        }

        async fn update(&self, _rule: &Rule) -> RbacResult<()> {
            std::future::pending::<RbacResult<()>>().await
        }

        async fn delete(&self, _id: RuleId) -> RbacResult<()> {
            std::future::pending::<RbacResult<()>>().await
        }
    }

    /// Repository whose loads take a second and are counted
    struct SlowRepository {
        inner: InMemoryRuleRepository,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl RuleRepository for SlowRepository {
        async fn load_all(&self) -> RbacResult<Vec<Rule>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.inner.load_all().await
        }

        async fn insert(&self, rule: &Rule) -> RbacResult<()> {
            self.inner.insert(rule).await
        }

        async fn update(&self, rule: &Rule) -> RbacResult<()> {
            self.inner.update(rule).await
        }

        async fn delete(&self, id: RuleId) -> RbacResult<()> {
            self.inner.delete(id).await
        }
    }

    fn always_stale() -> SnapshotSettings {
        SnapshotSettings {
            refresh_interval: Duration::from_secs(1),
            max_staleness: Duration::ZERO,
            fetch_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_read_your_write() {
        let store = RuleStore::in_memory(RuleSet::new());
        let rule = store
            .upsert(NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]))
            .await
            .unwrap();

        assert_eq!(store.find(Role::Company, Resource::Visitors).await, Some(rule));
    }

    #[tokio::test]
    async fn test_conflict_leaves_existing_rule() {
        let store = RuleStore::in_memory(RuleSet::new());
        let original = store
            .upsert(NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]))
            .await
            .unwrap();

        let err = store
            .upsert(NewRule::new(Role::Company, Resource::Visitors, vec![Action::Write]))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::RuleConflict { .. }));
        assert_eq!(store.find(Role::Company, Resource::Visitors).await, Some(original));
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = RuleStore::in_memory(RuleSet::new());
        let rule = store
            .upsert(NewRule::new(Role::Receptionist, Resource::Visitors, vec![Action::Read]))
            .await
            .unwrap();

        let updated = store
            .update(rule.id, RulePatch::actions(vec![Action::Read, Action::Write]))
            .await
            .unwrap();
        assert!(updated.allows(Action::Write));

        store.remove(rule.id).await.unwrap();
        assert!(store.find(Role::Receptionist, Resource::Visitors).await.is_none());
        assert!(store.remove(rule.id).await.unwrap_err().is_not_found());
        assert!(store
            .update(rule.id, RulePatch::actions(vec![Action::Read]))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_empty_actions_rejected_without_write() {
        let store = RuleStore::in_memory(RuleSet::new());
        let err = store
            .upsert(NewRule::new(Role::Company, Resource::Users, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::Validation { .. }));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_writes_reach_repository() {
        let repository = Arc::new(InMemoryRuleRepository::new());
        let store = RuleStore::with_repository(repository.clone(), SnapshotSettings::default())
            .await
            .unwrap();

        let rule = store
            .upsert(NewRule::new(Role::Company, Resource::Analytics, vec![Action::Read]))
            .await
            .unwrap();
        assert_eq!(repository.load_all().await.unwrap(), vec![rule.clone()]);

        store.remove(rule.id).await.unwrap();
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_backend_write_leaves_snapshot_unchanged() {
        let repository = Arc::new(FlakyRepository::new());
        let store = RuleStore::with_repository(repository.clone(), SnapshotSettings::default())
            .await
            .unwrap();

        repository.available.store(false, Ordering::SeqCst);
        let err = store
            .upsert(NewRule::new(Role::Company, Resource::Analytics, vec![Action::Read]))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::Backend { .. }));

        repository.available.store(true, Ordering::SeqCst);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_snapshot_fails_safe() {
        let repository = Arc::new(FlakyRepository::new());
        repository
            .inner
            .insert(&NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]).into_rule())
            .await
            .unwrap();

        let store = RuleStore::with_repository(repository.clone(), always_stale())
            .await
            .unwrap();
        assert_eq!(store.snapshot().await.len(), 1);

        repository.available.store(false, Ordering::SeqCst);
        assert!(store.snapshot().await.is_empty());

        repository.available.store(true, Ordering::SeqCst);
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_remote_changes() {
        let repository = Arc::new(InMemoryRuleRepository::new());
        let store = RuleStore::with_repository(repository.clone(), SnapshotSettings::default())
            .await
            .unwrap();

        let remote = NewRule::new(Role::Receptionist, Resource::Dashboard, vec![Action::Read]).into_rule();
        repository.insert(&remote).await.unwrap();
        assert!(store.find(Role::Receptionist, Resource::Dashboard).await.is_none());

        store.refresh().await.unwrap();
        assert_eq!(
            store.find(Role::Receptionist, Resource::Dashboard).await,
            Some(remote)
        );
    }

    #[tokio::test]
    async fn test_seeded_repository() {
        let repository = Arc::new(InMemoryRuleRepository::new());
        let config = RbacConfig::default();
        let store = RuleStore::seeded(repository.clone(), &config).await.unwrap();

        assert_eq!(store.list().await.len(), config.seed_rules.len());
        assert_eq!(repository.len().await, config.seed_rules.len());

        // A second start does not seed again
        let again = RuleStore::seeded(repository.clone(), &config).await.unwrap();
        assert_eq!(again.list().await.len(), config.seed_rules.len());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_rule_per_key() {
        let store = RuleStore::in_memory(RuleSet::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(NewRule::new(Role::Company, Resource::Users, vec![Action::Read]))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_update_and_remove_on_one_rule() {
        let repository = Arc::new(InMemoryRuleRepository::new());
        let store = RuleStore::with_repository(repository.clone(), SnapshotSettings::default())
            .await
            .unwrap();
        let id = store
            .upsert(NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]))
            .await
            .unwrap()
            .id;

        let mut updates = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            updates.push(tokio::spawn(async move {
                store
                    .update(id, RulePatch::actions(vec![Action::Read, Action::Write]))
                    .await
            }));
        }
        let remover = {
            let store = store.clone();
            tokio::spawn(async move { store.remove(id).await })
        };

        for handle in updates {
            match handle.await.unwrap() {
                Ok(updated) => assert_eq!(updated.id, id),
                Err(e) => assert!(e.is_not_found()),
            }
        }
        assert_eq!(remover.await.unwrap().unwrap().id, id);

        // Whatever the interleaving, the removal is final everywhere
        assert!(store.list().await.is_empty());
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_store_and_repository_in_step() {
        let repository = Arc::new(InMemoryRuleRepository::new());
        let store = RuleStore::with_repository(repository.clone(), SnapshotSettings::default())
            .await
            .unwrap();
        let id = store
            .upsert(NewRule::new(Role::Receptionist, Resource::Visitors, vec![Action::Read]))
            .await
            .unwrap()
            .id;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let actions = if i % 2 == 0 {
                vec![Action::Read]
            } else {
                vec![Action::Read, Action::Write]
            };
            handles.push(tokio::spawn(async move {
                store.update(id, RulePatch::actions(actions)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let local = store.list().await;
        assert_eq!(local.len(), 1);
        assert_eq!(repository.load_all().await.unwrap(), local);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_backend_denies_within_fetch_timeout() {
        let rule = NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]).into_rule();
        let repository = Arc::new(HangingRepository {
            rules: vec![rule],
            loads: AtomicUsize::new(0),
        });
        let store = RuleStore::with_repository(repository.clone(), always_stale())
            .await
            .unwrap();
        let evaluator = PolicyEvaluator::new(store.clone());
        let company = Principal::company("C1");

        let started = Instant::now();
        let (first, second, allowed) = tokio::join!(
            store.snapshot(),
            store.snapshot(),
            evaluator.can(&company, "visitors", Action::Read)
        );
        assert!(first.is_empty());
        assert!(second.is_empty());
        assert!(!allowed);
        assert!(started.elapsed() < Duration::from_secs(3));

        let err = store
            .upsert(NewRule::new(Role::Company, Resource::Users, vec![Action::Read]))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::Backend { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stale_reads_share_one_reload() {
        let repository = Arc::new(SlowRepository {
            inner: InMemoryRuleRepository::new(),
            loads: AtomicUsize::new(0),
        });
        repository
            .inner
            .insert(&NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]).into_rule())
            .await
            .unwrap();
        let store = RuleStore::with_repository(repository.clone(), always_stale())
            .await
            .unwrap();
        assert_eq!(repository.loads.load(Ordering::SeqCst), 1);

        let (first, second) = tokio::join!(store.snapshot(), store.snapshot());
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(repository.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh() {
        let repository = Arc::new(InMemoryRuleRepository::new());
        let settings = SnapshotSettings {
            refresh_interval: Duration::from_secs(5),
            max_staleness: Duration::from_secs(3600),
            ..SnapshotSettings::default()
        };
        let store = RuleStore::with_repository(repository.clone(), settings)
            .await
            .unwrap();
        let handle = store.spawn_refresh();

        repository
            .insert(&NewRule::new(Role::Company, Resource::Settings, vec![Action::Read]).into_rule())
            .await
            .unwrap();
        assert!(store.find(Role::Company, Resource::Settings).await.is_none());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(store.find(Role::Company, Resource::Settings).await.is_some());

        handle.abort();
    }
}
