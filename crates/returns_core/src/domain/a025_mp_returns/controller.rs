//! Фасад экрана возвратов: связывает фильтры, загрузку, снимок и пометки
//! и публикует готовое представление через `watch`.

use contracts::domain::a025_mp_returns::{FilterCriteria, FilterPatch, ReturnRecord};
use contracts::enums::review_status::ReviewStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::annotations::{Annotation, AnnotationStore};
use super::api::ReturnsApi;
use super::error::FetchError;
use super::fetcher::{FetchOutcome, FetchSettings, ReturnsFetcher, ReturnsPage};
use super::hierarchy::{aggregate, ReturnGroup};
use super::query::{CacheKey, ReturnsQuery};
use super::query_controller::QueryController;
use super::snapshot::{PersistedSnapshot, SnapshotPatch, SnapshotStore};
use crate::shared::clock::Clock;
use crate::shared::config::FetchConfig;
use crate::shared::storage::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Idle,
    Fetching,
    Success,
    Error,
}

/// Состояние экрана для слоя представления
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsView {
    pub phase: LoadPhase,
    /// Ключ запроса, к которому относится `phase`
    #[serde(skip)]
    pub key: Option<CacheKey>,
    pub groups: Vec<ReturnGroup>,
    pub independents: Vec<ReturnRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub error: Option<String>,
    pub annotations: HashMap<String, ReviewStatus>,
    pub restored_from_snapshot: bool,
}

impl ReturnsView {
    fn empty(page_size: usize) -> Self {
        Self {
            phase: LoadPhase::Idle,
            key: None,
            groups: Vec::new(),
            independents: Vec::new(),
            total: 0,
            page: 1,
            page_size,
            error: None,
            annotations: HashMap::new(),
            restored_from_snapshot: false,
        }
    }

    pub fn loading(&self) -> bool {
        self.phase == LoadPhase::Fetching
    }

    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum::<usize>() + self.independents.len()
    }

    fn show_records(&mut self, records: &[ReturnRecord], total: usize) {
        let hierarchy = aggregate(records);
        self.groups = hierarchy.groups;
        self.independents = hierarchy.independents;
        self.total = total;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ReturnsController {
    queries: QueryController,
    fetcher: ReturnsFetcher,
    snapshots: SnapshotStore,
    annotations: Mutex<AnnotationStore>,
    view: watch::Sender<ReturnsView>,
    /// Ключ последнего опубликованного запроса; ответы по другим ключам
    /// в представление не попадают
    active_key: Mutex<Option<CacheKey>>,
    /// Ключ запроса, под которым записан снимок
    persisted_key: Mutex<Option<CacheKey>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReturnsController {
    /// Собрать контроллер: почистить пометки, поднять снимок и сразу
    /// показать его, восстановить фильтры и выбор аккаунтов.
    pub fn new(
        api: Arc<dyn ReturnsApi>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &FetchConfig,
    ) -> Arc<Self> {
        let annotations = AnnotationStore::load(store.clone(), clock.clone());
        let snapshots = SnapshotStore::new(store, clock.clone());
        let fetcher = ReturnsFetcher::new(api, clock, FetchSettings::from(config));
        let queries = QueryController::new(config.page_size, config.debounce_delay());

        let mut view = ReturnsView::empty(config.page_size.max(1));
        view.annotations = annotations.statuses();

        let mut persisted_key = None;
        if let Some(snapshot) = snapshots.load() {
            Self::paint_snapshot(&mut view, &snapshot);
            queries.restore(
                snapshot.filters.clone(),
                snapshot.account_selection.clone(),
                snapshot.current_page,
            );
            persisted_key = Some(queries.current().cache_key());
            tracing::info!(
                "Restored returns snapshot: {} records, page {}",
                snapshot.records.len(),
                snapshot.current_page
            );
        }

        let (view, _rx) = watch::channel(view);
        Arc::new(Self {
            queries,
            fetcher,
            snapshots,
            annotations: Mutex::new(annotations),
            view,
            active_key: Mutex::new(None),
            persisted_key: Mutex::new(persisted_key),
            worker: Mutex::new(None),
        })
    }

    fn paint_snapshot(view: &mut ReturnsView, snapshot: &PersistedSnapshot) {
        view.show_records(&snapshot.records, snapshot.total);
        view.page = snapshot.current_page.max(1);
        view.restored_from_snapshot = true;
    }

    /// Запустить обработку запросов: текущий запрос загружается сразу,
    /// каждый следующий опубликованный запрос порождает новую загрузку.
    pub fn start(self: &Arc<Self>) {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return;
        }

        let mut rx = self.queries.subscribe();
        let weak = Arc::downgrade(self);
        *worker = Some(tokio::spawn(async move {
            loop {
                let query = rx.borrow_and_update().clone();
                let Some(this) = weak.upgrade() else { break };
                this.track_query(&query);
                tokio::spawn(async move {
                    if let Err(e) = this.load(&query, false).await {
                        tracing::debug!("Returns load for {} failed: {}", query.cache_key(), e);
                    }
                });
                if rx.changed().await.is_err() {
                    break;
                }
            }
            tracing::debug!("Returns query loop stopped");
        }));
    }

    pub fn subscribe(&self) -> watch::Receiver<ReturnsView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> ReturnsView {
        self.view.borrow().clone()
    }

    pub fn query(&self) -> ReturnsQuery {
        self.queries.current()
    }

    pub fn draft_filters(&self) -> FilterCriteria {
        self.queries.draft_filters()
    }

    pub fn fetcher(&self) -> &ReturnsFetcher {
        &self.fetcher
    }

    /// Принудительно перезапросить текущий запрос мимо окна свежести
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let query = self.queries.current();
        self.track_query(&query);
        self.load(&query, true).await
    }

    pub fn set_filters(&self, patch: FilterPatch) {
        self.queries.set_filters(patch);
    }

    pub fn replace_filters(&self, filters: FilterCriteria) {
        self.queries.replace_filters(filters);
    }

    pub fn clear_filters(&self) {
        self.queries.clear_filters();
    }

    /// Опубликовать отложенные правки фильтра без ожидания debounce
    pub fn flush_filters(&self) {
        self.queries.flush();
    }

    /// Смена аккаунтов сбрасывает кэш загрузок целиком
    pub fn set_account_selection(&self, ids: Vec<String>) {
        self.fetcher.clear();
        self.queries.set_account_selection(ids);
    }

    pub fn set_page(&self, page: usize) {
        self.queries.set_page(page);
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.queries.set_page_size(page_size);
    }

    pub fn set_annotation(&self, record_id: &str, status: ReviewStatus) -> Annotation {
        let (annotation, statuses) = {
            let mut annotations = lock(&self.annotations);
            let annotation = annotations.set_status(record_id, status);
            (annotation, annotations.statuses())
        };
        self.view.send_modify(|v| v.annotations = statuses);
        annotation
    }

    pub fn clear_annotations(&self) {
        lock(&self.annotations).clear();
        self.view.send_modify(|v| v.annotations.clear());
    }

    pub fn prune_annotations(&self) -> usize {
        let (pruned, statuses) = {
            let mut annotations = lock(&self.annotations);
            let pruned = annotations.prune_expired();
            (pruned, annotations.statuses())
        };
        if pruned > 0 {
            self.view.send_modify(|v| v.annotations = statuses);
        }
        pruned
    }

    /// Сделать запрос активным. При смене эффективного ключа в снимок
    /// пишутся новые параметры запроса, а записи из него удаляются.
    fn track_query(&self, query: &ReturnsQuery) {
        let key = query.cache_key();
        let mut active = lock(&self.active_key);
        *active = Some(key.clone());

        let mut persisted = lock(&self.persisted_key);
        if persisted.as_ref() != Some(&key) {
            self.snapshots.save(SnapshotPatch {
                records: Some(Vec::new()),
                total: Some(0),
                current_page: Some(query.page),
                filters: Some(query.filters.clone()),
                account_selection: Some(query.accounts.clone()),
            });
            *persisted = Some(key);
        }
    }

    /// Выполнить `apply`, только если `key` всё ещё активен.
    /// Проверка и изменение идут под одной блокировкой `active_key`,
    /// поэтому `track_query` нового ключа не вклинится между ними.
    fn if_active(&self, key: &CacheKey, apply: impl FnOnce()) -> bool {
        let active = lock(&self.active_key);
        if active.as_ref() != Some(key) {
            return false;
        }
        apply();
        true
    }

    async fn load(&self, query: &ReturnsQuery, force: bool) -> Result<(), FetchError> {
        let key = query.cache_key();
        let started = self.if_active(&key, || {
            self.view.send_modify(|v| {
                v.phase = LoadPhase::Fetching;
                v.key = Some(key.clone());
                v.page = query.page;
                v.page_size = query.page_size;
            });
        });
        if !started {
            return Ok(());
        }

        let result = if force {
            self.fetcher.revalidate(query).await
        } else {
            match self.fetcher.fetch(query).await {
                Ok(FetchOutcome::Cached(payload)) | Ok(FetchOutcome::Fetched(payload)) => Ok(payload),
                Ok(FetchOutcome::Stale {
                    payload,
                    revalidation,
                }) => {
                    self.apply_stale(query, &key, &payload);
                    revalidation.wait().await
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(payload) => {
                self.apply_success(query, &key, &payload);
                Ok(())
            }
            Err(e) => {
                self.apply_error(&key, &e);
                Err(e)
            }
        }
    }

    fn apply_stale(&self, query: &ReturnsQuery, key: &CacheKey, payload: &ReturnsPage) {
        self.if_active(key, || {
            self.view.send_modify(|v| {
                v.show_records(&payload.records, payload.total);
                v.page = query.page;
                v.restored_from_snapshot = false;
            });
        });
    }

    fn apply_success(&self, query: &ReturnsQuery, key: &CacheKey, payload: &ReturnsPage) {
        let applied = self.if_active(key, || {
            self.snapshots.save(SnapshotPatch {
                records: Some(payload.records.clone()),
                total: Some(payload.total),
                current_page: Some(query.page),
                filters: Some(query.filters.clone()),
                account_selection: Some(query.accounts.clone()),
            });
            *lock(&self.persisted_key) = Some(key.clone());

            self.view.send_modify(|v| {
                v.show_records(&payload.records, payload.total);
                v.phase = LoadPhase::Success;
                v.key = Some(key.clone());
                v.page = query.page;
                v.error = None;
                v.restored_from_snapshot = false;
            });
        });
        if !applied {
            tracing::debug!("Dropping returns response for inactive query: {}", key);
        }
    }

    /// Последние удачные данные остаются на экране
    fn apply_error(&self, key: &CacheKey, error: &FetchError) {
        let applied = self.if_active(key, || {
            let message = error.to_string();
            self.view.send_modify(|v| {
                v.phase = LoadPhase::Error;
                v.key = Some(key.clone());
                v.error = Some(message);
            });
        });
        if !applied {
            tracing::debug!("Dropping returns error for inactive query: {}", key);
        }
    }
}

impl Drop for ReturnsController {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.worker).take() {
            handle.abort();
        }
    }
}
