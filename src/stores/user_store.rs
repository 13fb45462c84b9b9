use crate::core::error::StoreError;
use crate::models::user::UserAccount;
use crate::wal::wal::{Wal, WalOperation};
use anyhow::Context;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Durable user records: in-memory map backed by the record log.
///
/// Every mutation is logged before the in-memory copy changes, so a failed
/// write leaves both sides untouched.
///
/// Lock order: compaction gate, then map entries, then the log file.
pub struct UserStore {
    users: DashMap<u64, UserAccount>,
    usernames: DashMap<String, u64>,
    next_id: AtomicU64,
    wal: Wal,
    /// Mutations share it, compaction holds it exclusively
    gate: RwLock<()>,
    /// UPDATE lines appended since the log was last compacted
    updates_since_compaction: AtomicU64,
}

fn update_op(user: &UserAccount) -> WalOperation {
    WalOperation::UpdateUser {
        id: user.id,
        coins: user.coins,
        equipment_level: user.equipment_level,
        resets: user.resets,
        reset_bonus_multiplier: user.reset_bonus_multiplier,
    }
}

impl UserStore {
    pub fn new(wal: Wal) -> Self {
        Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
            next_id: AtomicU64::new(1),
            wal,
            gate: RwLock::new(()),
            updates_since_compaction: AtomicU64::new(0),
        }
    }

    // The gate guards no data, so a poisoned one is still usable
    fn mutation_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn compaction_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new account. Fails if the username is already in use.
    pub fn create(&self, username: &str, password_hash: String) -> Result<UserAccount, StoreError> {
        let _gate = self.mutation_gate();

        // Holding the index entry reserves the name until the record exists
        let slot = match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => return Err(StoreError::UsernameTaken(username.to_string())),
            Entry::Vacant(slot) => slot,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let user = UserAccount::new(id, username.to_string(), password_hash);

        self.wal
            .log_operation(&WalOperation::CreateUser {
                id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
            })
            .context("Failed to log user creation")?;

        self.users.insert(id, user.clone());
        slot.insert(id);

        Ok(user)
    }

    pub fn load(&self, id: u64) -> Result<UserAccount, StoreError> {
        self.users
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    pub fn load_by_username(&self, username: &str) -> Option<UserAccount> {
        let id = *self.usernames.get(username)?;
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    /// Overwrite the progression of an existing account
    pub fn save(&self, user: &UserAccount) -> Result<(), StoreError> {
        let _gate = self.mutation_gate();
        let mut entry = self.users.get_mut(&user.id).ok_or(StoreError::NotFound(user.id))?;

        self.wal
            .log_operation(&update_op(user))
            .context("Failed to log user update")?;
        self.updates_since_compaction.fetch_add(1, Ordering::Relaxed);

        // Identity fields are immutable after creation
        let stored = entry.value_mut();
        stored.coins = user.coins;
        stored.equipment_level = user.equipment_level;
        stored.resets = user.resets;
        stored.reset_bonus_multiplier = user.reset_bonus_multiplier;

        Ok(())
    }

    /// Read-modify-write one account while holding its entry lock.
    ///
    /// `f` runs against a copy. If it fails nothing is written; if it
    /// succeeds the new state is logged and then installed. Concurrent
    /// updates for the same id serialize on the entry lock.
    pub fn update<T, E, F>(&self, id: u64, f: F) -> Result<(T, UserAccount), E>
    where
        F: FnOnce(&mut UserAccount) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _gate = self.mutation_gate();
        let mut entry = self.users.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let mut working = entry.value().clone();
        let output = f(&mut working)?;

        self.wal
            .log_operation(&update_op(&working))
            .context("Failed to log user update")
            .map_err(StoreError::from)?;
        self.updates_since_compaction.fetch_add(1, Ordering::Relaxed);

        *entry.value_mut() = working.clone();

        Ok((output, working))
    }

    /// Rebuild the in-memory state from replayed log operations
    pub fn apply_operations(&self, operations: &[WalOperation]) {
        for op in operations {
            match op {
                WalOperation::CreateUser {
                    id,
                    username,
                    password_hash,
                } => {
                    if self.usernames.contains_key(username) {
                        warn!(user_id = id, username = %username, "Duplicate username in WAL, skipping");
                        continue;
                    }
                    let user = UserAccount::new(*id, username.clone(), password_hash.clone());
                    self.users.insert(*id, user);
                    self.usernames.insert(username.clone(), *id);
                    self.next_id.fetch_max(id + 1, Ordering::Relaxed);
                }
                WalOperation::UpdateUser {
                    id,
                    coins,
                    equipment_level,
                    resets,
                    reset_bonus_multiplier,
                } => match self.users.get_mut(id) {
                    Some(mut entry) => {
                        let user = entry.value_mut();
                        user.coins = *coins;
                        user.equipment_level = *equipment_level;
                        user.resets = *resets;
                        user.reset_bonus_multiplier = *reset_bonus_multiplier;
                    }
                    None => {
                        warn!(user_id = id, "WAL update for unknown user, skipping");
                    }
                },
            }
        }
    }

    /// Operations that recreate the current state, one create and one
    /// update per account, ordered by id
    pub fn snapshot(&self) -> Vec<WalOperation> {
        let mut users: Vec<UserAccount> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);

        let mut operations = Vec::with_capacity(users.len() * 2);
        for user in &users {
            operations.push(WalOperation::CreateUser {
                id: user.id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
            });
            operations.push(update_op(user));
        }
        operations
    }

    /// Rewrite the log as the current snapshot, returning the number of
    /// operations kept. Mutations wait until the rewrite is done, so none
    /// can land in the old log after the snapshot was taken.
    pub fn compact(&self) -> Result<usize, StoreError> {
        let _gate = self.compaction_gate();

        let snapshot = self.snapshot();
        self.wal
            .compact(&snapshot)
            .context("Failed to compact WAL")?;
        self.updates_since_compaction.store(0, Ordering::Relaxed);

        Ok(snapshot.len())
    }

    pub fn updates_since_compaction(&self) -> u64 {
        self.updates_since_compaction.load(Ordering::Relaxed)
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GameError;
    use crate::game::engine;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug)]
    enum TestError {
        Store(StoreError),
        Game(GameError),
    }

    impl From<StoreError> for TestError {
        fn from(err: StoreError) -> Self {
            TestError::Store(err)
        }
    }

    impl From<GameError> for TestError {
        fn from(err: GameError) -> Self {
            TestError::Game(err)
        }
    }

    fn create_test_store(temp_dir: &TempDir) -> UserStore {
        let wal = Wal::new(temp_dir.path().join("users.wal")).unwrap();
        UserStore::new(wal)
    }

    #[test]
    fn test_create_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let user = store.create("alice", "hash".to_string()).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.coins, 0);
        assert_eq!(user.equipment_level, 1);

        let loaded = store.load(user.id).unwrap();
        assert_eq!(loaded, user);
        assert_eq!(store.load_by_username("alice").unwrap().id, user.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_username_taken() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        store.create("alice", "hash".to_string()).unwrap();
        let result = store.create("alice", "other".to_string());

        assert!(matches!(result, Err(StoreError::UsernameTaken(name)) if name == "alice"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        assert!(matches!(store.load(42), Err(StoreError::NotFound(42))));
        assert!(store.load_by_username("nobody").is_none());
    }

    #[test]
    fn test_save_keeps_identity() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let mut user = store.create("alice", "hash".to_string()).unwrap();
        user.coins = 500;
        user.username = "mallory".to_string();
        store.save(&user).unwrap();

        let loaded = store.load(user.id).unwrap();
        assert_eq!(loaded.coins, 500);
        assert_eq!(loaded.username, "alice");
    }

    #[test]
    fn test_update_error_leaves_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let user = store.create("alice", "hash".to_string()).unwrap();

        let result: Result<_, TestError> = store.update(user.id, |u| {
            u.coins = 42;
            Ok(engine::apply_upgrade(u)?)
        });

        assert!(matches!(result, Err(TestError::Game(GameError::InsufficientFunds { .. }))));
        assert_eq!(store.load(user.id).unwrap().coins, 0);
        // Only the create line was written
        assert_eq!(store.wal().replay().unwrap().len(), 1);
    }

    #[test]
    fn test_update_missing_user() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let result: Result<_, TestError> = store.update(9, |u| Ok(engine::apply_click(u, false)));

        assert!(matches!(result, Err(TestError::Store(StoreError::NotFound(9)))));
    }

    #[test]
    fn test_replay_restores_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let alice = store.create("alice", "hash-a".to_string()).unwrap();
        let bob = store.create("bob", "hash-b".to_string()).unwrap();
        for _ in 0..5 {
            let _: Result<_, TestError> = store.update(alice.id, |u| Ok(engine::apply_click(u, true)));
        }

        let restored = create_test_store(&temp_dir);
        restored.apply_operations(&restored.wal().replay().unwrap());

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.load(alice.id).unwrap().coins, 10);
        assert_eq!(restored.load(bob.id).unwrap().password_hash, "hash-b");

        // Fresh ids continue after the highest replayed id
        let carol = restored.create("carol", "hash-c".to_string()).unwrap();
        assert_eq!(carol.id, 3);
    }

    #[test]
    fn test_snapshot_compaction_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let alice = store.create("alice", "hash".to_string()).unwrap();
        for _ in 0..20 {
            let _: Result<_, TestError> = store.update(alice.id, |u| Ok(engine::apply_click(u, false)));
        }
        assert_eq!(store.wal().replay().unwrap().len(), 21);

        assert_eq!(store.updates_since_compaction(), 20);
        assert_eq!(store.compact().unwrap(), 2);
        assert_eq!(store.wal().replay().unwrap().len(), 2);
        assert_eq!(store.updates_since_compaction(), 0);

        let restored = create_test_store(&temp_dir);
        restored.apply_operations(&restored.wal().replay().unwrap());
        assert_eq!(restored.load(alice.id).unwrap(), store.load(alice.id).unwrap());
    }

    #[test]
    fn test_concurrent_updates_same_user() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(create_test_store(&temp_dir));
        let user_id = store.create("alice", "hash".to_string()).unwrap().id;

        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    let result: Result<_, TestError> =
                        store.update(user_id, |u| Ok(engine::apply_click(u, false)));
                    result.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load(user_id).unwrap().coins, 200);
    }

    #[test]
    fn test_compaction_during_updates_loses_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(create_test_store(&temp_dir));
        let user_id = store.create("alice", "hash".to_string()).unwrap().id;

        let mut handles = vec![];
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let result: Result<_, TestError> =
                        store.update(user_id, |u| Ok(engine::apply_click(u, false)));
                    result.unwrap();
                }
            }));
        }
        let compactor = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    store.compact().unwrap();
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        compactor.join().unwrap();

        let restored = create_test_store(&temp_dir);
        restored.apply_operations(&restored.wal().replay().unwrap());
        assert_eq!(store.load(user_id).unwrap().coins, 200);
        assert_eq!(restored.load(user_id).unwrap().coins, 200);
    }
}
