use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::auth::responses::Role;
use crate::store::{NewUser, StoreError, StoreResult, UserRecord, UserStore};

/// In-memory credential store backed by sharded maps. The email index is
/// keyed by the lowercased address and doubles as the write-time
/// uniqueness check.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<Uuid, UserRecord>,
    email_index: DashMap<String, Uuid>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let key = email.trim().to_lowercase();
        // copy the id out so no shard guard is held across the lookup
        let id = self.email_index.get(&key).map(|entry| *entry.value());
        match id {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn insert(&self, user: NewUser) -> StoreResult<UserRecord> {
        let email = user.email.trim().to_lowercase();

        // The vacant entry is held while the record is written, so two
        // concurrent registrations for the same address cannot both win.
        match self.email_index.entry(email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    id: Uuid::new_v4(),
                    first_name: user.first_name,
                    last_name: user.last_name,
                    email,
                    password_hash: user.password_hash,
                    role: user.role,
                    is_active: true,
                    created_at: Utc::now(),
                    last_login_at: None,
                };
                self.users.insert(record.id, record.clone());
                slot.insert(record.id);
                Ok(record)
            }
        }
    }

    async fn update_role(&self, id: Uuid, role: Role) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get_mut(&id).map(|mut entry| {
            entry.role = role;
            entry.value().clone()
        }))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get_mut(&id).map(|mut entry| {
            entry.is_active = active;
            entry.value().clone()
        }))
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(mut entry) = self.users.get_mut(&id) {
            entry.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        match self.users.remove(&id) {
            Some((_, record)) => {
                self.email_index.remove(&record.email);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> StoreResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|user| user.created_at);
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Test".into(),
            last_name: "User".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn inserts_and_finds_users() {
        let store = MemoryUserStore::new();
        let record = store.insert(new_user("a@example.com")).await.expect("insert");

        let by_id = store.find_by_id(record.id).await.expect("find by id");
        assert!(by_id.is_some());

        let by_email = store
            .find_by_email("a@example.com")
            .await
            .expect("find by email");
        assert_eq!(by_email.map(|u| u.id), Some(record.id));
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@example.com")).await.expect("insert");

        let err = store
            .insert(new_user("A@Example.COM"))
            .await
            .expect_err("duplicate email must be rejected");
        assert!(matches!(err, StoreError::DuplicateEmail));

        let found = store
            .find_by_email("  A@EXAMPLE.com ")
            .await
            .expect("lookup");
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn updates_role_and_active_flag() {
        let store = MemoryUserStore::new();
        let record = store.insert(new_user("a@example.com")).await.expect("insert");

        let updated = store
            .update_role(record.id, Role::Admin)
            .await
            .expect("update role")
            .expect("user exists");
        assert_eq!(updated.role, Role::Admin);

        let updated = store
            .set_active(record.id, false)
            .await
            .expect("set active")
            .expect("user exists");
        assert!(!updated.is_active);

        let missing = store
            .update_role(Uuid::new_v4(), Role::Admin)
            .await
            .expect("update role");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_frees_the_email_for_reuse() {
        let store = MemoryUserStore::new();
        let record = store.insert(new_user("a@example.com")).await.expect("insert");

        assert!(store.delete(record.id).await.expect("delete"));
        assert!(!store.delete(record.id).await.expect("second delete"));

        store
            .insert(new_user("a@example.com"))
            .await
            .expect("email is reusable after deletion");
    }

    #[tokio::test]
    async fn records_last_login() {
        let store = MemoryUserStore::new();
        let record = store.insert(new_user("a@example.com")).await.expect("insert");
        assert!(record.last_login_at.is_none());

        let now = Utc::now();
        store.record_login(record.id, now).await.expect("record login");

        let reloaded = store
            .find_by_id(record.id)
            .await
            .expect("find")
            .expect("user exists");
        assert_eq!(reloaded.last_login_at, Some(now));
    }
}
