//! Blocking in-memory store standing in for the ORM layer.
//!
//! Every operation sleeps for the configured latency before touching the
//! tables, so calling it from the reactor thread would stall other
//! connections exactly like a real database round trip. It must only be
//! called from dispatched handlers.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    thread,
    time::Duration,
};

pub type AcronymId = u64;
pub type CategoryId = u64;
pub type UserId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acronym {
    pub id: AcronymId,
    pub short: String,
    pub long: String,
    pub user_id: UserId,
}

/// Public view of an account. Credentials are never stored here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Domain errors surfaced by store operations.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid input: {reason}")]
    Invalid { reason: String },

    #[error("conflict: {reason}")]
    Conflict { reason: String },
}

impl StoreError {
    fn acronym(id: AcronymId) -> Self {
        Self::NotFound {
            what: format!("acronym {id}"),
        }
    }

    fn category(id: CategoryId) -> Self {
        Self::NotFound {
            what: format!("category {id}"),
        }
    }

    fn user(id: UserId) -> Self {
        Self::NotFound {
            what: format!("user {id}"),
        }
    }

    fn unknown_owner(id: UserId) -> Self {
        Self::Invalid {
            reason: format!("user {id} does not exist"),
        }
    }
}

#[derive(Default)]
struct Tables {
    acronyms: BTreeMap<AcronymId, Acronym>,
    categories: BTreeMap<CategoryId, Category>,
    users: BTreeMap<UserId, User>,
    // (acronym, category) pivot rows.
    links: BTreeSet<(AcronymId, CategoryId)>,
    next_acronym_id: AcronymId,
    next_category_id: CategoryId,
    next_user_id: UserId,
}

/// Shared handle to the tables. Cloning is cheap.
#[derive(Clone)]
pub struct Store {
    tables: Arc<RwLock<Tables>>,
    latency: Duration,
}

impl Store {
    pub fn new(latency: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables {
                next_acronym_id: 1,
                next_category_id: 1,
                next_user_id: 1,
                ..Tables::default()
            })),
            latency,
        }
    }

    fn round_trip(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }

    pub fn all_acronyms(&self) -> Vec<Acronym> {
        self.round_trip();
        self.tables.read().acronyms.values().cloned().collect()
    }

    pub fn acronym(&self, id: AcronymId) -> Result<Acronym, StoreError> {
        self.round_trip();
        self.tables
            .read()
            .acronyms
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::acronym(id))
    }

    /// Fails with [`StoreError::Invalid`] if `user_id` names no user.
    pub fn insert_acronym(
        &self,
        short: String,
        long: String,
        user_id: UserId,
    ) -> Result<Acronym, StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::unknown_owner(user_id));
        }
        let id = tables.next_acronym_id;
        tables.next_acronym_id += 1;
        let acronym = Acronym {
            id,
            short,
            long,
            user_id,
        };
        tables.acronyms.insert(id, acronym.clone());
        Ok(acronym)
    }

    pub fn update_acronym(
        &self,
        id: AcronymId,
        short: String,
        long: String,
        user_id: UserId,
    ) -> Result<Acronym, StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        let owner_exists = tables.users.contains_key(&user_id);
        let acronym = tables
            .acronyms
            .get_mut(&id)
            .ok_or_else(|| StoreError::acronym(id))?;
        if !owner_exists {
            return Err(StoreError::unknown_owner(user_id));
        }
        acronym.short = short;
        acronym.long = long;
        acronym.user_id = user_id;
        Ok(acronym.clone())
    }

    /// The user owning acronym `id`.
    pub fn owner_of(&self, id: AcronymId) -> Result<User, StoreError> {
        self.round_trip();
        let tables = self.tables.read();
        let acronym = tables
            .acronyms
            .get(&id)
            .ok_or_else(|| StoreError::acronym(id))?;
        tables
            .users
            .get(&acronym.user_id)
            .cloned()
            .ok_or_else(|| StoreError::user(acronym.user_id))
    }

    pub fn delete_acronym(&self, id: AcronymId) -> Result<(), StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        tables
            .acronyms
            .remove(&id)
            .ok_or_else(|| StoreError::acronym(id))?;
        tables.links.retain(|(acronym, _)| *acronym != id);
        Ok(())
    }

    /// Acronyms whose short or long form equals `term` exactly.
    pub fn search_acronyms(&self, term: &str) -> Vec<Acronym> {
        self.round_trip();
        self.tables
            .read()
            .acronyms
            .values()
            .filter(|a| a.short == term || a.long == term)
            .cloned()
            .collect()
    }

    pub fn first_acronym(&self) -> Option<Acronym> {
        self.round_trip();
        self.tables.read().acronyms.values().next().cloned()
    }

    /// All acronyms ordered by their short form.
    pub fn sorted_acronyms(&self) -> Vec<Acronym> {
        let mut acronyms = self.all_acronyms();
        acronyms.sort_by(|a, b| a.short.cmp(&b.short));
        acronyms
    }

    pub fn categories_of(&self, id: AcronymId) -> Result<Vec<Category>, StoreError> {
        self.round_trip();
        let tables = self.tables.read();
        if !tables.acronyms.contains_key(&id) {
            return Err(StoreError::acronym(id));
        }
        Ok(tables
            .links
            .range((id, CategoryId::MIN)..=(id, CategoryId::MAX))
            .filter_map(|(_, category)| tables.categories.get(category).cloned())
            .collect())
    }

    /// Links an acronym to a category. Linking twice is a no-op.
    pub fn attach(&self, acronym: AcronymId, category: CategoryId) -> Result<(), StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        Self::ensure_both(&tables, acronym, category)?;
        tables.links.insert((acronym, category));
        Ok(())
    }

    pub fn detach(&self, acronym: AcronymId, category: CategoryId) -> Result<(), StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        Self::ensure_both(&tables, acronym, category)?;
        tables.links.remove(&(acronym, category));
        Ok(())
    }

    fn ensure_both(
        tables: &Tables,
        acronym: AcronymId,
        category: CategoryId,
    ) -> Result<(), StoreError> {
        if !tables.acronyms.contains_key(&acronym) {
            return Err(StoreError::acronym(acronym));
        }
        if !tables.categories.contains_key(&category) {
            return Err(StoreError::category(category));
        }
        Ok(())
    }

    pub fn all_categories(&self) -> Vec<Category> {
        self.round_trip();
        self.tables.read().categories.values().cloned().collect()
    }

    pub fn category(&self, id: CategoryId) -> Result<Category, StoreError> {
        self.round_trip();
        self.tables
            .read()
            .categories
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::category(id))
    }

    /// Category names are unique.
    pub fn insert_category(&self, name: String) -> Result<Category, StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        if tables.categories.values().any(|c| c.name == name) {
            return Err(StoreError::Conflict {
                reason: format!("category `{name}` already exists"),
            });
        }
        let id = tables.next_category_id;
        tables.next_category_id += 1;
        let category = Category { id, name };
        tables.categories.insert(id, category.clone());
        Ok(category)
    }

    pub fn acronyms_in(&self, id: CategoryId) -> Result<Vec<Acronym>, StoreError> {
        self.round_trip();
        let tables = self.tables.read();
        if !tables.categories.contains_key(&id) {
            return Err(StoreError::category(id));
        }
        Ok(tables
            .links
            .iter()
            .filter(|(_, category)| *category == id)
            .filter_map(|(acronym, _)| tables.acronyms.get(acronym).cloned())
            .collect())
    }

    pub fn all_users(&self) -> Vec<User> {
        self.round_trip();
        self.tables.read().users.values().cloned().collect()
    }

    pub fn user(&self, id: UserId) -> Result<User, StoreError> {
        self.round_trip();
        self.tables
            .read()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::user(id))
    }

    /// Usernames are unique.
    pub fn insert_user(&self, name: String, username: String) -> Result<User, StoreError> {
        self.round_trip();
        let mut tables = self.tables.write();
        if tables.users.values().any(|u| u.username == username) {
            return Err(StoreError::Conflict {
                reason: format!("username `{username}` is taken"),
            });
        }
        let id = tables.next_user_id;
        tables.next_user_id += 1;
        let user = User { id, name, username };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    pub fn acronyms_of_user(&self, id: UserId) -> Result<Vec<Acronym>, StoreError> {
        self.round_trip();
        let tables = self.tables.read();
        if !tables.users.contains_key(&id) {
            return Err(StoreError::user(id));
        }
        Ok(tables
            .acronyms
            .values()
            .filter(|a| a.user_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::new(Duration::ZERO)
    }

    fn with_user() -> (Store, User) {
        let store = store();
        let user = store.insert_user("Alice".into(), "alice".into()).unwrap();
        (store, user)
    }

    #[test]
    fn acronym_crud() {
        let (store, alice) = with_user();
        let omg = store
            .insert_acronym("OMG".into(), "Oh My God".into(), alice.id)
            .unwrap();
        assert_eq!(omg.id, 1);
        assert_eq!(store.acronym(1), Ok(omg.clone()));

        let updated = store
            .update_acronym(1, "OMG".into(), "Oh My Gosh".into(), alice.id)
            .unwrap();
        assert_eq!(updated.long, "Oh My Gosh");

        store.delete_acronym(1).unwrap();
        assert_eq!(
            store.acronym(1),
            Err(StoreError::NotFound {
                what: "acronym 1".into()
            })
        );
        assert!(store.delete_acronym(1).is_err());
    }

    #[test]
    fn acronym_owner_must_exist() {
        let (store, alice) = with_user();
        assert_eq!(
            store.insert_acronym("LOL".into(), "Laugh Out Loud".into(), 42),
            Err(StoreError::Invalid {
                reason: "user 42 does not exist".into()
            })
        );
        store
            .insert_acronym("LOL".into(), "Laugh Out Loud".into(), alice.id)
            .unwrap();
        assert!(matches!(
            store.update_acronym(1, "LOL".into(), "Lots Of Love".into(), 42),
            Err(StoreError::Invalid { .. })
        ));
        // Unknown rows win over unknown owners.
        assert!(matches!(
            store.update_acronym(9, "LOL".into(), "Lots Of Love".into(), 42),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn users_and_ownership() {
        let (store, alice) = with_user();
        let bob = store.insert_user("Bob".into(), "bob".into()).unwrap();
        assert!(matches!(
            store.insert_user("Alice Again".into(), "alice".into()),
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.all_users(), vec![alice.clone(), bob.clone()]);

        let ikr = store
            .insert_acronym("IKR".into(), "I Know Right".into(), bob.id)
            .unwrap();
        assert_eq!(store.owner_of(ikr.id), Ok(bob.clone()));
        assert_eq!(store.acronyms_of_user(bob.id).unwrap(), vec![ikr.clone()]);
        assert!(store.acronyms_of_user(alice.id).unwrap().is_empty());

        store
            .update_acronym(ikr.id, "IKR".into(), "I Know Right".into(), alice.id)
            .unwrap();
        assert_eq!(store.owner_of(ikr.id), Ok(alice));
        assert!(store.acronyms_of_user(bob.id).unwrap().is_empty());
        assert!(store.acronyms_of_user(99).is_err());
    }

    #[test]
    fn search_first_and_sorted() {
        let (store, alice) = with_user();
        assert_eq!(store.first_acronym(), None);
        store
            .insert_acronym("WTF".into(), "What The Fudge".into(), alice.id)
            .unwrap();
        store
            .insert_acronym("BRB".into(), "Be Right Back".into(), alice.id)
            .unwrap();

        assert_eq!(store.first_acronym().unwrap().short, "WTF");
        let sorted: Vec<_> = store.sorted_acronyms().into_iter().map(|a| a.short).collect();
        assert_eq!(sorted, ["BRB", "WTF"]);

        assert_eq!(store.search_acronyms("Be Right Back").len(), 1);
        assert_eq!(store.search_acronyms("BRB").len(), 1);
        assert!(store.search_acronyms("brb").is_empty());
    }

    #[test]
    fn category_links() {
        let (store, alice) = with_user();
        let til = store
            .insert_acronym("TIL".into(), "Today I Learned".into(), alice.id)
            .unwrap();
        let funny = store.insert_category("Funny".into()).unwrap();
        assert!(matches!(
            store.insert_category("Funny".into()),
            Err(StoreError::Conflict { .. })
        ));

        store.attach(til.id, funny.id).unwrap();
        store.attach(til.id, funny.id).unwrap();
        assert_eq!(store.categories_of(til.id).unwrap(), vec![funny.clone()]);
        assert_eq!(store.acronyms_in(funny.id).unwrap(), vec![til.clone()]);

        assert!(store.attach(til.id, 99).is_err());
        store.detach(til.id, funny.id).unwrap();
        assert!(store.categories_of(til.id).unwrap().is_empty());
    }

    #[test]
    fn deleting_acronym_removes_links() {
        let (store, alice) = with_user();
        let afk = store
            .insert_acronym("AFK".into(), "Away From Keyboard".into(), alice.id)
            .unwrap();
        let chat = store.insert_category("Chat".into()).unwrap();
        store.attach(afk.id, chat.id).unwrap();

        store.delete_acronym(afk.id).unwrap();
        assert!(store.acronyms_in(chat.id).unwrap().is_empty());
    }
}
