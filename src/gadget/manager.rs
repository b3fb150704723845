/// Gadget lifecycle engine
use crate::{
    config::GadgetConfig,
    db::{
        models::{Gadget, SelfDestructCode},
        ConfirmOutcome, GadgetChanges, GadgetStore,
    },
    error::{ApiError, ApiResult},
    gadget::{codename, non_blank, CodenameGenerator, GadgetStatus},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a self-destruct call
#[derive(Debug, Clone, PartialEq)]
pub enum SelfDestructOutcome {
    /// Phase 1: a fresh confirmation code was issued
    Initiated { code: String },
    /// Phase 2: the code was consumed and the gadget destroyed
    Destroyed(Gadget),
}

/// Gadget manager service
pub struct GadgetManager {
    store: Arc<dyn GadgetStore>,
    codenames: CodenameGenerator,
    lock_terminal_status: bool,
}

impl GadgetManager {
    pub fn new(store: Arc<dyn GadgetStore>, config: &GadgetConfig) -> Self {
        Self {
            store,
            codenames: CodenameGenerator::new(config.codename_max_attempts),
            lock_terminal_status: config.lock_terminal_status,
        }
    }

    /// List gadgets newest first, optionally by status
    pub async fn list(&self, status: Option<GadgetStatus>) -> ApiResult<Vec<Gadget>> {
        self.store.list_gadgets(status).await
    }

    /// Get a gadget by id
    pub async fn get(&self, id: &str) -> ApiResult<Gadget> {
        self.store
            .find_gadget(id)
            .await?
            .ok_or_else(not_found)
    }

    /// Create a gadget in `Available` with a freshly allocated codename
    pub async fn create(&self, name: &str) -> ApiResult<Gadget> {
        let name = non_blank(Some(name))
            .ok_or_else(|| ApiError::Validation("Gadget name is required".to_string()))?;

        for _ in 0..self.codenames.max_attempts() {
            let codename = self.codenames.generate_unique(self.store.as_ref()).await?;

            let gadget = Gadget {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                codename,
                status: GadgetStatus::Available,
                created_at: Utc::now(),
                decommissioned_at: None,
            };

            match self.store.insert_gadget(&gadget).await {
                Ok(()) => {
                    tracing::info!(id = %gadget.id, codename = %gadget.codename, "Gadget created");
                    return Ok(gadget);
                }
                // Another request took the codename between the lookup and the insert
                Err(ApiError::Conflict(_)) => {
                    tracing::warn!(codename = %gadget.codename, "Codename claimed concurrently, reallocating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ApiError::GenerationExhausted {
            attempts: self.codenames.max_attempts(),
        })
    }

    /// Apply a partial update; a blank name counts as no name
    pub async fn update(&self, id: &str, changes: GadgetChanges) -> ApiResult<Gadget> {
        let changes = GadgetChanges {
            name: non_blank(changes.name.as_deref()).map(str::to_string),
            status: changes.status,
        };
        let current = self.get(id).await?;

        if let Some(next) = changes.status {
            current
                .status
                .ensure_can_update_to(next, self.lock_terminal_status)?;
        }

        if changes.is_empty() {
            return Ok(current);
        }

        let updated = self
            .store
            .update_gadget(id, &changes)
            .await?
            .ok_or_else(not_found)?;

        if updated.status != current.status {
            tracing::info!(
                id,
                from = %current.status,
                to = %updated.status,
                "Gadget status updated"
            );
        }

        Ok(updated)
    }

    /// Soft delete: always lands in `Decommissioned`, whatever the current status
    pub async fn decommission(&self, id: &str) -> ApiResult<Gadget> {
        let gadget = self
            .store
            .decommission_gadget(id, Utc::now())
            .await?
            .ok_or_else(not_found)?;

        tracing::info!(id, "Gadget decommissioned");

        Ok(gadget)
    }

    /// Two-phase self-destruct: without a code, issue one; with a code,
    /// consume it and destroy the gadget.
    pub async fn self_destruct(
        &self,
        id: &str,
        confirmation_code: Option<&str>,
    ) -> ApiResult<SelfDestructOutcome> {
        let gadget = self.get(id).await?;
        gadget.status.ensure_can_self_destruct()?;

        match confirmation_code {
            None => self.initiate_self_destruct(&gadget).await,
            Some(code) => self.confirm_self_destruct(&gadget, code).await,
        }
    }

    async fn initiate_self_destruct(&self, gadget: &Gadget) -> ApiResult<SelfDestructOutcome> {
        let code = codename::generate_self_destruct_code(&mut rand::thread_rng());

        self.store
            .insert_code(&SelfDestructCode {
                id: Uuid::new_v4().to_string(),
                gadget_id: gadget.id.clone(),
                code: code.clone(),
                used: false,
                used_at: None,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(id = %gadget.id, "Self-destruct sequence initiated");

        Ok(SelfDestructOutcome::Initiated { code })
    }

    async fn confirm_self_destruct(
        &self,
        gadget: &Gadget,
        code: &str,
    ) -> ApiResult<SelfDestructOutcome> {
        match self
            .store
            .consume_code_and_destroy(&gadget.id, code, Utc::now())
            .await?
        {
            ConfirmOutcome::Destroyed(destroyed) => {
                tracing::warn!(id = %destroyed.id, codename = %destroyed.codename, "Gadget destroyed");
                Ok(SelfDestructOutcome::Destroyed(destroyed))
            }
            ConfirmOutcome::CodeRejected => {
                tracing::debug!(id = %gadget.id, "Self-destruct confirmation rejected");
                Err(ApiError::InvalidCode(
                    "Invalid or expired confirmation code".to_string(),
                ))
            }
            ConfirmOutcome::GadgetUnavailable => {
                // Lost a race with another terminal transition
                let current = self.get(&gadget.id).await?;
                current.status.ensure_can_self_destruct()?;
                Err(ApiError::Internal(
                    "Self-destruct transition was not applied".to_string(),
                ))
            }
        }
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("Gadget not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, SqliteStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn setup() -> (Arc<SqliteStore>, GadgetManager) {
        setup_with(GadgetConfig::default()).await
    }

    async fn setup_with(config: GadgetConfig) -> (Arc<SqliteStore>, GadgetManager) {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let manager = GadgetManager::new(store.clone(), &config);
        (store, manager)
    }

    fn status_change(status: GadgetStatus) -> GadgetChanges {
        GadgetChanges {
            name: None,
            status: Some(status),
        }
    }

    async fn initiate(manager: &GadgetManager, id: &str) -> String {
        match manager.self_destruct(id, None).await.unwrap() {
            SelfDestructOutcome::Initiated { code } => code,
            other => panic!("expected phase 1, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_gadget() {
        let (_, manager) = setup().await;

        let gadget = manager.create("Falcon Drop").await.unwrap();
        assert_eq!(gadget.name, "Falcon Drop");
        assert_eq!(gadget.status, GadgetStatus::Available);
        assert!(!gadget.codename.is_empty());
        assert!(gadget.decommissioned_at.is_none());

        let fetched = manager.get(&gadget.id).await.unwrap();
        assert_eq!(fetched.codename, gadget.codename);
        assert_eq!(fetched.status, GadgetStatus::Available);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let (_, manager) = setup().await;
        assert!(matches!(
            manager.create("").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            manager.create("   ").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_created_codenames_are_unique() {
        let (_, manager) = setup().await;

        let mut seen = std::collections::HashSet::new();
        for i in 0..30 {
            let gadget = manager.create(&format!("Gadget {}", i)).await.unwrap();
            assert!(seen.insert(gadget.codename));
        }
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_share_codename() {
        let (_, manager) = setup().await;
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.create(&format!("Gadget {}", i)).await })
            })
            .collect();

        let mut codenames = std::collections::HashSet::new();
        for handle in handles {
            let gadget = handle.await.unwrap().unwrap();
            assert!(codenames.insert(gadget.codename));
        }
        assert_eq!(codenames.len(), 20);
    }

    /// Store whose codename lookup never sees a clash, so the UNIQUE
    /// constraint is the only thing standing between two creates.
    struct UncheckedCodenameStore {
        inner: Arc<SqliteStore>,
        /// The first N inserts are forced onto this already-taken codename
        collide_with: Option<(String, u32)>,
        inserts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl GadgetStore for UncheckedCodenameStore {
        async fn list_gadgets(&self, status: Option<GadgetStatus>) -> ApiResult<Vec<Gadget>> {
            self.inner.list_gadgets(status).await
        }

        async fn find_gadget(&self, id: &str) -> ApiResult<Option<Gadget>> {
            self.inner.find_gadget(id).await
        }

        async fn codename_exists(&self, _codename: &str) -> ApiResult<bool> {
            Ok(false)
        }

        async fn insert_gadget(&self, gadget: &Gadget) -> ApiResult<()> {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst);
            match &self.collide_with {
                Some((taken, times)) if n < *times => {
                    let clash = Gadget {
                        codename: taken.clone(),
                        ..gadget.clone()
                    };
                    self.inner.insert_gadget(&clash).await
                }
                _ => self.inner.insert_gadget(gadget).await,
            }
        }

        async fn update_gadget(
            &self,
            id: &str,
            changes: &GadgetChanges,
        ) -> ApiResult<Option<Gadget>> {
            self.inner.update_gadget(id, changes).await
        }

        async fn decommission_gadget(
            &self,
            id: &str,
            at: chrono::DateTime<Utc>,
        ) -> ApiResult<Option<Gadget>> {
            self.inner.decommission_gadget(id, at).await
        }

        async fn insert_code(&self, code: &SelfDestructCode) -> ApiResult<()> {
            self.inner.insert_code(code).await
        }

        async fn list_codes(&self, gadget_id: &str) -> ApiResult<Vec<SelfDestructCode>> {
            self.inner.list_codes(gadget_id).await
        }

        async fn consume_code_and_destroy(
            &self,
            gadget_id: &str,
            code: &str,
            at: chrono::DateTime<Utc>,
        ) -> ApiResult<ConfirmOutcome> {
            self.inner.consume_code_and_destroy(gadget_id, code, at).await
        }
    }

    async fn seed_codename(store: &SqliteStore, codename: &str) {
        store
            .insert_gadget(&Gadget {
                id: Uuid::new_v4().to_string(),
                name: "Seed".to_string(),
                codename: codename.to_string(),
                status: GadgetStatus::Available,
                created_at: Utc::now(),
                decommissioned_at: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_retries_after_codename_conflict() {
        let (store, _) = setup().await;
        seed_codename(&store, "Operation Quartz").await;

        let blind = Arc::new(UncheckedCodenameStore {
            inner: store.clone(),
            collide_with: Some(("Operation Quartz".to_string(), 2)),
            inserts: AtomicU32::new(0),
        });
        let manager = GadgetManager::new(blind.clone(), &GadgetConfig::default());

        let gadget = manager.create("Night Vision").await.unwrap();
        assert_ne!(gadget.codename, "Operation Quartz");
        assert_eq!(blind.inserts.load(Ordering::SeqCst), 3);

        let stored = store.list_gadgets(None).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_create_exhausts_after_repeated_conflicts() {
        let (store, _) = setup().await;
        for prefix in codename::CODENAME_PREFIXES {
            for name in codename::CODENAME_NAMES {
                seed_codename(&store, &format!("{} {}", prefix, name)).await;
            }
        }

        let blind = Arc::new(UncheckedCodenameStore {
            inner: store.clone(),
            collide_with: None,
            inserts: AtomicU32::new(0),
        });
        let config = GadgetConfig {
            codename_max_attempts: 5,
            ..GadgetConfig::default()
        };
        let manager = GadgetManager::new(blind.clone(), &config);

        let err = manager.create("Night Vision").await.unwrap_err();
        assert!(matches!(err, ApiError::GenerationExhausted { attempts: 5 }));
        assert_eq!(blind.inserts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_get_missing_gadget() {
        let (_, manager) = setup().await;
        assert!(matches!(
            manager.get("missing").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_name_and_status() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Laser Watch").await.unwrap();

        let updated = manager
            .update(
                &gadget.id,
                GadgetChanges {
                    name: Some("Laser Watch Mk II".to_string()),
                    status: Some(GadgetStatus::Deployed),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Laser Watch Mk II");
        assert_eq!(updated.status, GadgetStatus::Deployed);
        assert_eq!(updated.codename, gadget.codename);
    }

    #[tokio::test]
    async fn test_update_missing_gadget() {
        let (_, manager) = setup().await;
        assert!(matches!(
            manager
                .update("missing", status_change(GadgetStatus::Deployed))
                .await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_without_changes_returns_gadget() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Grappling Belt").await.unwrap();

        let same = manager
            .update(&gadget.id, GadgetChanges::default())
            .await
            .unwrap();
        assert_eq!(same.id, gadget.id);
        assert_eq!(same.name, gadget.name);
        assert_eq!(same.status, gadget.status);
    }

    #[tokio::test]
    async fn test_update_ignores_blank_name() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Grappling Belt").await.unwrap();

        let same = manager
            .update(
                &gadget.id,
                GadgetChanges {
                    name: Some("   ".to_string()),
                    status: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(same.name, "Grappling Belt");

        let renamed = manager
            .update(
                &gadget.id,
                GadgetChanges {
                    name: Some("  Grappling Belt II ".to_string()),
                    status: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Grappling Belt II");
    }

    #[tokio::test]
    async fn test_update_can_resurrect_destroyed_gadget_by_default() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Shoe Phone").await.unwrap();
        let code = initiate(&manager, &gadget.id).await;
        manager
            .self_destruct(&gadget.id, Some(&code))
            .await
            .unwrap();

        let revived = manager
            .update(&gadget.id, status_change(GadgetStatus::Available))
            .await
            .unwrap();
        assert_eq!(revived.status, GadgetStatus::Available);
    }

    #[tokio::test]
    async fn test_update_locked_terminal_status() {
        let (_, manager) = setup_with(GadgetConfig {
            lock_terminal_status: true,
            ..GadgetConfig::default()
        })
        .await;
        let gadget = manager.create("Shoe Phone").await.unwrap();
        manager.decommission(&gadget.id).await.unwrap();

        let err = manager
            .update(&gadget.id, status_change(GadgetStatus::Available))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));

        // Renaming a terminal gadget is still allowed
        let renamed = manager
            .update(
                &gadget.id,
                GadgetChanges {
                    name: Some("Retired Shoe Phone".to_string()),
                    status: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.status, GadgetStatus::Decommissioned);
    }

    #[tokio::test]
    async fn test_decommission_is_idempotent() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Cufflink Camera").await.unwrap();

        let first = manager.decommission(&gadget.id).await.unwrap();
        assert_eq!(first.status, GadgetStatus::Decommissioned);
        assert!(first.decommissioned_at.is_some());

        let second = manager.decommission(&gadget.id).await.unwrap();
        assert_eq!(second.status, GadgetStatus::Decommissioned);
        assert!(second.decommissioned_at.is_some());
    }

    #[tokio::test]
    async fn test_decommission_overrides_destroyed() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Umbrella Gun").await.unwrap();
        let code = initiate(&manager, &gadget.id).await;
        manager
            .self_destruct(&gadget.id, Some(&code))
            .await
            .unwrap();

        let decommissioned = manager.decommission(&gadget.id).await.unwrap();
        assert_eq!(decommissioned.status, GadgetStatus::Decommissioned);
    }

    #[tokio::test]
    async fn test_decommission_missing_gadget() {
        let (_, manager) = setup().await;
        assert!(matches!(
            manager.decommission("missing").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_phase_one_only_inserts_code() {
        let (store, manager) = setup().await;
        let gadget = manager.create("Falcon Drop").await.unwrap();

        let first = initiate(&manager, &gadget.id).await;
        let second = initiate(&manager, &gadget.id).await;
        assert_eq!(first.len(), 6);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let unchanged = manager.get(&gadget.id).await.unwrap();
        assert_eq!(unchanged.status, GadgetStatus::Available);

        // Earlier codes stay valid
        let codes = store.list_codes(&gadget.id).await.unwrap();
        assert_eq!(codes.len(), 2);
        assert!(codes.iter().all(|c| !c.used));
        assert_eq!(codes[0].code, first);
        assert_eq!(codes[1].code, second);
    }

    #[tokio::test]
    async fn test_full_self_destruct_sequence() {
        let (store, manager) = setup().await;
        let gadget = manager.create("Falcon Drop").await.unwrap();
        let code = initiate(&manager, &gadget.id).await;

        let outcome = manager
            .self_destruct(&gadget.id, Some(&code))
            .await
            .unwrap();
        let destroyed = match outcome {
            SelfDestructOutcome::Destroyed(g) => g,
            other => panic!("expected phase 2, got {:?}", other),
        };
        assert_eq!(destroyed.status, GadgetStatus::Destroyed);

        let codes = store.list_codes(&gadget.id).await.unwrap();
        assert!(codes[0].used);
        assert!(codes[0].used_at.is_some());

        // The gadget is now terminal, so any further attempt is InvalidState
        let again = manager.self_destruct(&gadget.id, Some(&code)).await;
        assert!(matches!(again, Err(ApiError::InvalidState(_))));
        let phase_one = manager.self_destruct(&gadget.id, None).await;
        assert!(matches!(phase_one, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_reused_code_is_rejected_after_resurrection() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Falcon Drop").await.unwrap();
        let code = initiate(&manager, &gadget.id).await;
        manager
            .self_destruct(&gadget.id, Some(&code))
            .await
            .unwrap();

        manager
            .update(&gadget.id, status_change(GadgetStatus::Available))
            .await
            .unwrap();

        let err = manager
            .self_destruct(&gadget.id, Some(&code))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCode(_)));
    }

    #[tokio::test]
    async fn test_wrong_code_is_rejected() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Falcon Drop").await.unwrap();
        let code = initiate(&manager, &gadget.id).await;
        let wrong = if code == "AAAAAA" { "BBBBBB" } else { "AAAAAA" };

        let err = manager
            .self_destruct(&gadget.id, Some(wrong))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCode(_)));

        let unchanged = manager.get(&gadget.id).await.unwrap();
        assert_eq!(unchanged.status, GadgetStatus::Available);
    }

    #[tokio::test]
    async fn test_code_is_scoped_to_its_gadget() {
        let (_, manager) = setup().await;
        let a = manager.create("Gadget A").await.unwrap();
        let b = manager.create("Gadget B").await.unwrap();
        let code = initiate(&manager, &a.id).await;

        let err = manager.self_destruct(&b.id, Some(&code)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCode(_)));
    }

    #[tokio::test]
    async fn test_self_destruct_on_decommissioned_gadget() {
        let (_, manager) = setup().await;
        let gadget = manager.create("Pen Grenade").await.unwrap();
        manager.decommission(&gadget.id).await.unwrap();

        assert!(matches!(
            manager.self_destruct(&gadget.id, None).await,
            Err(ApiError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_self_destruct_missing_gadget() {
        let (_, manager) = setup().await;
        assert!(matches!(
            manager.self_destruct("missing", None).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            manager.self_destruct("missing", Some("ABC123")).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_confirmations_destroy_once() {
        let (store, manager) = setup().await;
        let manager = Arc::new(manager);
        let gadget = manager.create("Falcon Drop").await.unwrap();
        let code = initiate(&manager, &gadget.id).await;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let id = gadget.id.clone();
                let code = code.clone();
                tokio::spawn(async move { manager.self_destruct(&id, Some(&code)).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(SelfDestructOutcome::Destroyed(_)) => successes += 1,
                Err(ApiError::InvalidCode(_)) | Err(ApiError::InvalidState(_)) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert_eq!(successes, 1);

        let codes = store.list_codes(&gadget.id).await.unwrap();
        assert_eq!(codes.iter().filter(|c| c.used).count(), 1);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let (_, manager) = setup().await;
        let a = manager.create("A").await.unwrap();
        manager.create("B").await.unwrap();
        manager
            .update(&a.id, status_change(GadgetStatus::Deployed))
            .await
            .unwrap();

        assert_eq!(manager.list(None).await.unwrap().len(), 2);
        let deployed = manager.list(Some(GadgetStatus::Deployed)).await.unwrap();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].id, a.id);
        assert!(manager
            .list(Some(GadgetStatus::Destroyed))
            .await
            .unwrap()
            .is_empty());
    }
}
