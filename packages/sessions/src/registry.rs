// ABOUTME: Registry mapping session ids to their actors
// ABOUTME: Creates actors lazily with a double-checked lock and evicts idle ones on request

use chrono::Utc;
use shellbox_sandbox::CommandBridge;
use shellbox_storage::SessionStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::actor::Actor;
use crate::error::{RegistryError, Result};

pub const DEFAULT_WORKING_DIR: &str = "/workspace";

pub struct ActorRegistry {
    store: SessionStore,
    bridge: CommandBridge,
    container: String,
    default_working_dir: String,
    actors: RwLock<HashMap<String, Arc<Actor>>>,
}

impl ActorRegistry {
    pub fn new(store: SessionStore, bridge: CommandBridge, container: impl Into<String>) -> Self {
        Self {
            store,
            bridge,
            container: container.into(),
            default_working_dir: DEFAULT_WORKING_DIR.to_string(),
            actors: RwLock::new(HashMap::new()),
        }
    }

    /// Working directory assigned to sessions that have never set one
    pub fn with_default_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.default_working_dir = dir.into();
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Get the actor for `session_id`, creating it on first use.
    ///
    /// Concurrent callers for the same id always receive the same instance.
    /// Ids are opaque and used exactly as given; only blank ids are rejected.
    pub async fn resolve(&self, session_id: &str) -> Result<Arc<Actor>> {
        if session_id.trim().is_empty() {
            return Err(RegistryError::InvalidSessionId(session_id.to_string()));
        }

        {
            let actors = self.actors.read().await;
            if let Some(actor) = actors.get(session_id) {
                actor.touch().await;
                return Ok(actor.clone());
            }
        }

        let mut actors = self.actors.write().await;
        // Another caller may have won the race while we waited for the write lock
        if let Some(actor) = actors.get(session_id) {
            actor.touch().await;
            return Ok(actor.clone());
        }

        let state = self.store.session(session_id);
        if state.init_working_directory(&self.default_working_dir).await? {
            debug!(
                "Session {} starts in {}",
                session_id, self.default_working_dir
            );
        }

        let actor = Arc::new(Actor::new(
            state,
            self.bridge.clone(),
            self.container.clone(),
            self.default_working_dir.clone(),
        ));
        actors.insert(session_id.to_string(), actor.clone());
        info!("Created actor for session {}", session_id);
        Ok(actor)
    }

    pub async fn len(&self) -> usize {
        self.actors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actors.read().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.actors.read().await.contains_key(session_id)
    }

    /// Drop the in-memory actor for a session. Stored state is untouched.
    pub async fn evict(&self, session_id: &str) -> bool {
        let removed = self.actors.write().await.remove(session_id).is_some();
        if removed {
            debug!("Evicted actor for session {}", session_id);
        }
        removed
    }

    /// Evict every actor unused for longer than `max_idle`, returning their session ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let cutoff = match chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        {
            Some(cutoff) => cutoff,
            None => return Vec::new(),
        };
        let mut stale = Vec::new();

        {
            let actors = self.actors.read().await;
            for (id, actor) in actors.iter() {
                if actor.last_used().await <= cutoff {
                    stale.push(id.clone());
                }
            }
        }

        if !stale.is_empty() {
            let mut actors = self.actors.write().await;
            let mut evicted = Vec::with_capacity(stale.len());
            for id in stale {
                // Skip actors resolved again since the scan
                let still_idle = match actors.get(&id) {
                    Some(actor) => actor.last_used().await <= cutoff,
                    None => false,
                };
                if still_idle {
                    actors.remove(&id);
                    evicted.push(id);
                }
            }
            if !evicted.is_empty() {
                info!("Evicted {} idle actor(s)", evicted.len());
            }
            stale = evicted;
        }
        stale
    }

    /// Periodically evict actors idle longer than `max_idle`.
    pub fn spawn_idle_reaper(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (max_idle / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.evict_idle(max_idle).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use shellbox_sandbox::testing::FakeProvider;

    const CONTAINER: &str = "agent-execution-container";

    async fn setup() -> (Arc<FakeProvider>, Arc<ActorRegistry>) {
        let provider = Arc::new(FakeProvider::new());
        provider.add_running_container(CONTAINER);
        let store = SessionStore::open_in_memory().await.unwrap();
        let bridge = CommandBridge::new(provider.clone());
        let registry = Arc::new(ActorRegistry::new(store, bridge, CONTAINER));
        (provider, registry)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolve_yields_one_actor() {
        let (_provider, registry) = setup().await;

        let handles = (0..16).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.resolve("s1").await.unwrap() })
        });
        let actors: Vec<Arc<Actor>> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(actors.iter().all(|a| Arc::ptr_eq(a, &actors[0])));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_first_resolve_sets_default_working_dir() {
        let (_provider, registry) = setup().await;

        let actor = registry.resolve("s1").await.unwrap();

        assert_eq!(
            actor.state().working_directory().await.unwrap().as_deref(),
            Some(DEFAULT_WORKING_DIR)
        );
    }

    #[tokio::test]
    async fn test_resolve_keeps_existing_working_dir() {
        let (_provider, registry) = setup().await;
        registry
            .store()
            .set_working_directory("s1", "/tmp")
            .await
            .unwrap();

        let actor = registry.resolve("s1").await.unwrap();

        assert_eq!(actor.working_directory().await.unwrap(), "/tmp");
    }

    #[tokio::test]
    async fn test_resolve_rejects_blank_session_id() {
        let (_provider, registry) = setup().await;

        let err = registry.resolve("  ").await.unwrap_err();

        assert!(matches!(err, RegistryError::InvalidSessionId(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_padded_session_id_is_its_own_key() {
        let (_provider, registry) = setup().await;

        let padded = registry.resolve(" s1").await.unwrap();
        padded.state().set_goal("g").await.unwrap();
        let plain = registry.resolve("s1").await.unwrap();

        assert!(!Arc::ptr_eq(&padded, &plain));
        assert_eq!(padded.session_id(), " s1");
        assert_eq!(registry.store().get_goal(" s1").await.unwrap().as_deref(), Some("g"));
        assert_eq!(registry.store().get_goal("s1").await.unwrap(), None);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_evict_keeps_state() {
        let (_provider, registry) = setup().await;
        let actor = registry.resolve("s1").await.unwrap();
        actor.state().set_goal("ship it").await.unwrap();
        actor.state().set_working_directory("/tmp").await.unwrap();

        assert!(registry.evict("s1").await);
        assert!(!registry.evict("s1").await);
        assert!(!registry.contains("s1").await);

        let actor = registry.resolve("s1").await.unwrap();
        assert_eq!(actor.state().goal().await.unwrap().as_deref(), Some("ship it"));
        assert_eq!(actor.working_directory().await.unwrap(), "/tmp");
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let (_provider, registry) = setup().await;
        registry.resolve("s1").await.unwrap();
        registry.resolve("s2").await.unwrap();

        assert!(registry.evict_idle(Duration::from_secs(3600)).await.is_empty());

        let mut evicted = registry.evict_idle(Duration::ZERO).await;
        evicted.sort();
        assert_eq!(evicted, vec!["s1".to_string(), "s2".to_string()]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_idle_spares_actor_touched_after_scan() {
        let (_provider, registry) = setup().await;
        let actor = registry.resolve("s1").await.unwrap();
        let cutoff_idle = Duration::from_secs(60);

        // Idle long enough to be stale, then used again before the write lock is taken
        actor
            .set_last_used(Utc::now() - chrono::Duration::seconds(120))
            .await;
        let actors = registry.actors.read().await;
        let reaper = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.evict_idle(cutoff_idle).await })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        actor.touch().await;
        drop(actors);

        let evicted = reaper.await.unwrap();

        assert!(evicted.is_empty());
        assert!(registry.contains("s1").await);
    }

    #[tokio::test]
    async fn test_sessions_share_the_container() {
        let (provider, registry) = setup().await;

        registry.resolve("s1").await.unwrap().run("true").await.unwrap();
        registry.resolve("s2").await.unwrap().run("true").await.unwrap();

        let executed = provider.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed.iter().all(|e| e.container == CONTAINER));
        assert_eq!(provider.count_named(CONTAINER), 1);
    }
}
