use super::{
    error::ApiError,
    handlers::{self, AcronymInput, CategoryInput, UserInput},
};
use crate::server::store::{
    Acronym, AcronymId, Category, CategoryId, Store, StoreError, User, UserId,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use offload::{Dispatcher, PendingResult, WorkerPool};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Adapted<T> = Arc<dyn Fn(Store) -> PendingResult<T, StoreError> + Send + Sync>;
type AdaptedWith<P, T> = Arc<dyn Fn(Store, P) -> PendingResult<T, StoreError> + Send + Sync>;

/// Every blocking handler, adapted once at startup.
struct Adapters {
    list_acronyms: Adapted<Vec<Acronym>>,
    get_acronym: AdaptedWith<AcronymId, Acronym>,
    create_acronym: AdaptedWith<AcronymInput, Acronym>,
    update_acronym: AdaptedWith<(AcronymId, AcronymInput), Acronym>,
    delete_acronym: AdaptedWith<AcronymId, ()>,
    search_acronyms: AdaptedWith<Option<String>, Vec<Acronym>>,
    first_acronym: Adapted<Acronym>,
    sorted_acronyms: Adapted<Vec<Acronym>>,
    owner_of: AdaptedWith<AcronymId, User>,
    categories_of: AdaptedWith<AcronymId, Vec<Category>>,
    attach_category: AdaptedWith<(AcronymId, CategoryId), ()>,
    detach_category: AdaptedWith<(AcronymId, CategoryId), ()>,
    list_categories: Adapted<Vec<Category>>,
    get_category: AdaptedWith<CategoryId, Category>,
    create_category: AdaptedWith<CategoryInput, Category>,
    acronyms_in: AdaptedWith<CategoryId, Vec<Acronym>>,
    list_users: Adapted<Vec<User>>,
    get_user: AdaptedWith<UserId, User>,
    create_user: AdaptedWith<UserInput, User>,
    acronyms_of_user: AdaptedWith<UserId, Vec<Acronym>>,
}

impl Adapters {
    fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            list_acronyms: Arc::new(dispatcher.adapt(handlers::list_acronyms)),
            get_acronym: Arc::new(dispatcher.adapt_with(handlers::get_acronym)),
            create_acronym: Arc::new(dispatcher.adapt_with(handlers::create_acronym)),
            update_acronym: Arc::new(dispatcher.adapt_with(handlers::update_acronym)),
            delete_acronym: Arc::new(dispatcher.adapt_with(handlers::delete_acronym)),
            search_acronyms: Arc::new(dispatcher.adapt_with(handlers::search_acronyms)),
            first_acronym: Arc::new(dispatcher.adapt(handlers::first_acronym)),
            sorted_acronyms: Arc::new(dispatcher.adapt(handlers::sorted_acronyms)),
            owner_of: Arc::new(dispatcher.adapt_with(handlers::owner_of)),
            categories_of: Arc::new(dispatcher.adapt_with(handlers::categories_of)),
            attach_category: Arc::new(dispatcher.adapt_with(handlers::attach_category)),
            detach_category: Arc::new(dispatcher.adapt_with(handlers::detach_category)),
            list_categories: Arc::new(dispatcher.adapt(handlers::list_categories)),
            get_category: Arc::new(dispatcher.adapt_with(handlers::get_category)),
            create_category: Arc::new(dispatcher.adapt_with(handlers::create_category)),
            acronyms_in: Arc::new(dispatcher.adapt_with(handlers::acronyms_in)),
            list_users: Arc::new(dispatcher.adapt(handlers::list_users)),
            get_user: Arc::new(dispatcher.adapt_with(handlers::get_user)),
            create_user: Arc::new(dispatcher.adapt_with(handlers::create_user)),
            acronyms_of_user: Arc::new(dispatcher.adapt_with(handlers::acronyms_of_user)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    store: Store,
    pool: WorkerPool,
    adapters: Arc<Adapters>,
}

impl AppState {
    pub fn new(store: Store, dispatcher: &Dispatcher) -> Self {
        Self {
            store,
            pool: dispatcher.pool().clone(),
            adapters: Arc::new(Adapters::new(dispatcher)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let acronyms = Router::new()
        .route("/", get(list_acronyms).post(create_acronym))
        .route("/search", get(search_acronyms))
        .route("/first", get(first_acronym))
        .route("/sorted", get(sorted_acronyms))
        .route(
            "/{id}",
            get(get_acronym).put(update_acronym).delete(delete_acronym),
        )
        .route("/{id}/user", get(owner_of))
        .route("/{id}/categories", get(categories_of))
        .route(
            "/{id}/categories/{category_id}",
            post(attach_category).delete(detach_category),
        );

    let categories = Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/{id}", get(get_category))
        .route("/{id}/acronyms", get(acronyms_in));

    let users = Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user))
        .route("/{id}/acronyms", get(acronyms_of_user));

    Router::new()
        .route("/health", get(health))
        .nest("/api/acronyms", acronyms)
        .nest("/api/categories", categories)
        .nest("/api/users", users)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    workers: usize,
    queued: usize,
    active: usize,
    submitted: u64,
    completed: u64,
    rejected: u64,
    panicked: u64,
}

// Answered on the reactor; reading counters never blocks.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let stats = state.pool.stats();
    let (code, status) = if state.pool.is_shutdown() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    } else {
        (StatusCode::OK, "serving")
    };
    let health = Health {
        status,
        workers: stats.workers,
        queued: stats.queued,
        active: stats.active,
        submitted: stats.submitted,
        completed: stats.completed,
        rejected: stats.rejected,
        panicked: stats.panicked,
    };
    (code, Json(health))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    term: Option<String>,
}

#[tracing::instrument(skip_all)]
async fn list_acronyms(State(state): State<AppState>) -> Result<Json<Vec<Acronym>>, ApiError> {
    let acronyms = (state.adapters.list_acronyms)(state.store.clone()).await?;
    Ok(Json(acronyms))
}

#[tracing::instrument(skip(state))]
async fn get_acronym(
    State(state): State<AppState>,
    Path(id): Path<AcronymId>,
) -> Result<Json<Acronym>, ApiError> {
    let acronym = (state.adapters.get_acronym)(state.store.clone(), id).await?;
    Ok(Json(acronym))
}

#[tracing::instrument(skip_all)]
async fn create_acronym(
    State(state): State<AppState>,
    Json(input): Json<AcronymInput>,
) -> Result<Json<Acronym>, ApiError> {
    let acronym = (state.adapters.create_acronym)(state.store.clone(), input).await?;
    Ok(Json(acronym))
}

#[tracing::instrument(skip(state, input))]
async fn update_acronym(
    State(state): State<AppState>,
    Path(id): Path<AcronymId>,
    Json(input): Json<AcronymInput>,
) -> Result<Json<Acronym>, ApiError> {
    let acronym = (state.adapters.update_acronym)(state.store.clone(), (id, input)).await?;
    Ok(Json(acronym))
}

#[tracing::instrument(skip(state))]
async fn delete_acronym(
    State(state): State<AppState>,
    Path(id): Path<AcronymId>,
) -> Result<StatusCode, ApiError> {
    (state.adapters.delete_acronym)(state.store.clone(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state))]
async fn search_acronyms(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Acronym>>, ApiError> {
    let acronyms = (state.adapters.search_acronyms)(state.store.clone(), params.term).await?;
    Ok(Json(acronyms))
}

#[tracing::instrument(skip_all)]
async fn first_acronym(State(state): State<AppState>) -> Result<Json<Acronym>, ApiError> {
    let acronym = (state.adapters.first_acronym)(state.store.clone()).await?;
    Ok(Json(acronym))
}

#[tracing::instrument(skip_all)]
async fn sorted_acronyms(State(state): State<AppState>) -> Result<Json<Vec<Acronym>>, ApiError> {
    let acronyms = (state.adapters.sorted_acronyms)(state.store.clone()).await?;
    Ok(Json(acronyms))
}

#[tracing::instrument(skip(state))]
async fn owner_of(
    State(state): State<AppState>,
    Path(id): Path<AcronymId>,
) -> Result<Json<User>, ApiError> {
    let user = (state.adapters.owner_of)(state.store.clone(), id).await?;
    Ok(Json(user))
}

#[tracing::instrument(skip(state))]
async fn categories_of(
    State(state): State<AppState>,
    Path(id): Path<AcronymId>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = (state.adapters.categories_of)(state.store.clone(), id).await?;
    Ok(Json(categories))
}

#[tracing::instrument(skip(state))]
async fn attach_category(
    State(state): State<AppState>,
    Path(ids): Path<(AcronymId, CategoryId)>,
) -> Result<StatusCode, ApiError> {
    (state.adapters.attach_category)(state.store.clone(), ids).await?;
    Ok(StatusCode::CREATED)
}

#[tracing::instrument(skip(state))]
async fn detach_category(
    State(state): State<AppState>,
    Path(ids): Path<(AcronymId, CategoryId)>,
) -> Result<StatusCode, ApiError> {
    (state.adapters.detach_category)(state.store.clone(), ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip_all)]
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = (state.adapters.list_categories)(state.store.clone()).await?;
    Ok(Json(categories))
}

#[tracing::instrument(skip(state))]
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Category>, ApiError> {
    let category = (state.adapters.get_category)(state.store.clone(), id).await?;
    Ok(Json(category))
}

#[tracing::instrument(skip_all)]
async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let category = (state.adapters.create_category)(state.store.clone(), input).await?;
    Ok(Json(category))
}

#[tracing::instrument(skip(state))]
async fn acronyms_in(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Vec<Acronym>>, ApiError> {
    let acronyms = (state.adapters.acronyms_in)(state.store.clone(), id).await?;
    Ok(Json(acronyms))
}

#[tracing::instrument(skip_all)]
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = (state.adapters.list_users)(state.store.clone()).await?;
    Ok(Json(users))
}

#[tracing::instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    let user = (state.adapters.get_user)(state.store.clone(), id).await?;
    Ok(Json(user))
}

#[tracing::instrument(skip_all)]
async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<UserInput>,
) -> Result<Json<User>, ApiError> {
    let user = (state.adapters.create_user)(state.store.clone(), input).await?;
    Ok(Json(user))
}

#[tracing::instrument(skip(state))]
async fn acronyms_of_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<Acronym>>, ApiError> {
    let acronyms = (state.adapters.acronyms_of_user)(state.store.clone(), id).await?;
    Ok(Json(acronyms))
}
