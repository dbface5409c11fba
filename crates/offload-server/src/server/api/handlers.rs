//! Blocking request handlers.
//!
//! Each handler is plain synchronous code: it takes the [`Store`] as its
//! context, optionally one payload, and talks to the store directly. None of
//! them may run on the reactor; the router only ever calls them through
//! adapters produced by [`offload::Dispatcher`].

use crate::server::store::{
    Acronym, AcronymId, Category, CategoryId, Store, StoreError, User, UserId,
};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AcronymInput {
    pub short: String,
    pub long: String,
    pub user_id: UserId,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserInput {
    pub name: String,
    pub username: String,
}

fn require(field: &str, value: String) -> Result<String, StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Invalid {
            reason: format!("`{field}` must not be empty"),
        });
    }
    Ok(value)
}

pub fn list_acronyms(store: Store) -> Result<Vec<Acronym>, StoreError> {
    Ok(store.all_acronyms())
}

pub fn get_acronym(store: Store, id: AcronymId) -> Result<Acronym, StoreError> {
    store.acronym(id)
}

pub fn create_acronym(store: Store, input: AcronymInput) -> Result<Acronym, StoreError> {
    let short = require("short", input.short)?;
    let long = require("long", input.long)?;
    store.insert_acronym(short, long, input.user_id)
}

pub fn update_acronym(
    store: Store,
    (id, input): (AcronymId, AcronymInput),
) -> Result<Acronym, StoreError> {
    // An unknown row is reported before anything about the payload.
    store.acronym(id)?;
    let short = require("short", input.short)?;
    let long = require("long", input.long)?;
    store.update_acronym(id, short, long, input.user_id)
}

pub fn delete_acronym(store: Store, id: AcronymId) -> Result<(), StoreError> {
    store.delete_acronym(id)
}

pub fn search_acronyms(store: Store, term: Option<String>) -> Result<Vec<Acronym>, StoreError> {
    let term = term.ok_or_else(|| StoreError::Invalid {
        reason: "missing `term` query parameter".into(),
    })?;
    Ok(store.search_acronyms(&term))
}

pub fn first_acronym(store: Store) -> Result<Acronym, StoreError> {
    store.first_acronym().ok_or_else(|| StoreError::NotFound {
        what: "acronym".into(),
    })
}

pub fn sorted_acronyms(store: Store) -> Result<Vec<Acronym>, StoreError> {
    Ok(store.sorted_acronyms())
}

pub fn owner_of(store: Store, id: AcronymId) -> Result<User, StoreError> {
    store.owner_of(id)
}

pub fn categories_of(store: Store, id: AcronymId) -> Result<Vec<Category>, StoreError> {
    store.categories_of(id)
}

pub fn attach_category(
    store: Store,
    (acronym, category): (AcronymId, CategoryId),
) -> Result<(), StoreError> {
    store.attach(acronym, category)
}

pub fn detach_category(
    store: Store,
    (acronym, category): (AcronymId, CategoryId),
) -> Result<(), StoreError> {
    store.detach(acronym, category)
}

pub fn list_categories(store: Store) -> Result<Vec<Category>, StoreError> {
    Ok(store.all_categories())
}

pub fn get_category(store: Store, id: CategoryId) -> Result<Category, StoreError> {
    store.category(id)
}

pub fn create_category(store: Store, input: CategoryInput) -> Result<Category, StoreError> {
    let name = require("name", input.name)?;
    store.insert_category(name)
}

pub fn acronyms_in(store: Store, id: CategoryId) -> Result<Vec<Acronym>, StoreError> {
    store.acronyms_in(id)
}

pub fn list_users(store: Store) -> Result<Vec<User>, StoreError> {
    Ok(store.all_users())
}

pub fn get_user(store: Store, id: UserId) -> Result<User, StoreError> {
    store.user(id)
}

pub fn create_user(store: Store, input: UserInput) -> Result<User, StoreError> {
    let name = require("name", input.name)?;
    let username = require("username", input.username)?;
    store.insert_user(name, username)
}

pub fn acronyms_of_user(store: Store, id: UserId) -> Result<Vec<Acronym>, StoreError> {
    store.acronyms_of_user(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn blank_fields_are_invalid() {
        let store = Store::new(Duration::ZERO);
        let err = create_acronym(
            store.clone(),
            AcronymInput {
                short: "  ".into(),
                long: "Laughing Out Loud".into(),
                user_id: 1,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            StoreError::Invalid {
                reason: "`short` must not be empty".into()
            }
        );
        assert!(list_acronyms(store.clone()).unwrap().is_empty());

        assert!(create_category(store.clone(), CategoryInput { name: "".into() }).is_err());
        assert!(
            create_user(
                store,
                UserInput {
                    name: "Alice".into(),
                    username: " ".into(),
                },
            )
            .is_err()
        );
    }

    #[test]
    fn update_of_unknown_acronym_is_not_found_before_invalid() {
        let store = Store::new(Duration::ZERO);
        let err = update_acronym(
            store,
            (
                999,
                AcronymInput {
                    short: "".into(),
                    long: "".into(),
                    user_id: 1,
                },
            ),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                what: "acronym 999".into()
            }
        );
    }

    #[test]
    fn search_requires_term() {
        let store = Store::new(Duration::ZERO);
        assert!(matches!(
            search_acronyms(store.clone(), None),
            Err(StoreError::Invalid { .. })
        ));
        assert_eq!(search_acronyms(store, Some("LOL".into())), Ok(vec![]));
    }

    #[test]
    fn first_on_empty_store_is_not_found() {
        let store = Store::new(Duration::ZERO);
        assert!(matches!(
            first_acronym(store),
            Err(StoreError::NotFound { .. })
        ));
    }
}
