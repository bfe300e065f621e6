//! Оркестратор загрузки списка возвратов.
//!
//! - свежая запись кэша отдаётся без запроса;
//! - одинаковые одновременные запросы склеиваются в один вызов upstream;
//! - устаревшая запись отдаётся сразу, а обновление идёт в фоне
//!   (stale-while-revalidate);
//! - неудачный запрос повторяется `max_retries` раз без пауз, после чего
//!   возвращается `FetchError::Exhausted`, а прежняя запись остаётся в кэше.

use chrono::{DateTime, Utc};
use contracts::domain::a025_mp_returns::{ReturnRecord, ReturnsListRequest, ReturnsListResponse};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::ReturnsApi;
use super::error::FetchError;
use super::query::{CacheKey, ReturnsQuery};
use crate::shared::clock::Clock;
use crate::shared::config::FetchConfig;

/// Полезная нагрузка записи кэша: страница записей и общее количество
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnsPage {
    pub records: Vec<ReturnRecord>,
    pub total: usize,
}

impl From<ReturnsListResponse> for ReturnsPage {
    fn from(response: ReturnsListResponse) -> Self {
        Self {
            records: response.returns,
            total: response.total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Окно свежести: запись валидна, пока `now - fetched_at < freshness_window`
    pub freshness_window: chrono::Duration,
    /// Количество немедленных повторов после первой неудачи
    pub max_retries: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchSettings {
    fn from(config: &FetchConfig) -> Self {
        Self {
            freshness_window: config.freshness_window(),
            max_retries: config.max_retries,
        }
    }
}

/// Запись кэша
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Arc<ReturnsPage>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.fetched_at < window
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<ReturnsPage>, FetchError>>>;

struct InFlight {
    id: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct FetchState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    next_id: u64,
}

/// Результат `fetch`
pub enum FetchOutcome {
    /// Свежая запись кэша, запрос не выполнялся
    Cached(Arc<ReturnsPage>),
    /// Данные получены из upstream (возможно, через чужой запрос в полёте)
    Fetched(Arc<ReturnsPage>),
    /// Устаревшая запись; обновление уже запущено
    Stale {
        payload: Arc<ReturnsPage>,
        revalidation: Revalidation,
    },
}

impl FetchOutcome {
    pub fn payload(&self) -> &Arc<ReturnsPage> {
        match self {
            FetchOutcome::Cached(payload) | FetchOutcome::Fetched(payload) => payload,
            FetchOutcome::Stale { payload, .. } => payload,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FetchOutcome::Stale { .. })
    }
}

impl std::fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOutcome::Cached(p) => f.debug_tuple("Cached").field(&p.total).finish(),
            FetchOutcome::Fetched(p) => f.debug_tuple("Fetched").field(&p.total).finish(),
            FetchOutcome::Stale { payload, .. } => {
                f.debug_struct("Stale").field("total", &payload.total).finish()
            }
        }
    }
}

/// Фоновое обновление устаревшей записи.
///
/// Обновление выполняется независимо от того, ждёт ли его кто-нибудь.
pub struct Revalidation {
    future: SharedFetch,
}

impl Revalidation {
    pub async fn wait(self) -> Result<Arc<ReturnsPage>, FetchError> {
        self.future.await
    }
}

struct Inner {
    api: Arc<dyn ReturnsApi>,
    clock: Arc<dyn Clock>,
    settings: FetchSettings,
    state: Mutex<FetchState>,
}

/// Сервис кэша и загрузки. Клонирование дешёвое: клоны делят один кэш.
#[derive(Clone)]
pub struct ReturnsFetcher {
    inner: Arc<Inner>,
}

impl ReturnsFetcher {
    pub fn new(api: Arc<dyn ReturnsApi>, clock: Arc<dyn Clock>, settings: FetchSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                clock,
                settings,
                state: Mutex::new(FetchState::default()),
            }),
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.inner.settings
    }

    /// Получить данные по запросу с учётом кэша и запросов в полёте
    pub async fn fetch(&self, query: &ReturnsQuery) -> Result<FetchOutcome, FetchError> {
        let key = query.cache_key();
        let now = self.inner.clock.now();

        let (stale, future) = {
            let mut state = self.inner.lock();
            let window = self.inner.settings.freshness_window;
            match state.entries.get(&key) {
                Some(entry) if entry.is_fresh(now, window) => {
                    tracing::debug!("Returns cache hit: {}", key);
                    return Ok(FetchOutcome::Cached(entry.payload.clone()));
                }
                Some(entry) => {
                    let stale = entry.payload.clone();
                    (Some(stale), self.inner.join_or_start(&mut state, &key, query))
                }
                None => (None, self.inner.join_or_start(&mut state, &key, query)),
            }
        };

        match stale {
            Some(payload) => {
                tracing::debug!("Returns cache stale, revalidating: {}", key);
                Ok(FetchOutcome::Stale {
                    payload,
                    revalidation: Revalidation { future },
                })
            }
            None => future.await.map(FetchOutcome::Fetched),
        }
    }

    /// Принудительно запросить upstream (склеивается с запросом в полёте)
    pub async fn revalidate(&self, query: &ReturnsQuery) -> Result<Arc<ReturnsPage>, FetchError> {
        let key = query.cache_key();
        let future = {
            let mut state = self.inner.lock();
            self.inner.join_or_start(&mut state, &key, query)
        };
        future.await
    }

    /// Запись кэша (свежая или нет)
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if self.inner.lock().entries.remove(key).is_some() {
            tracing::debug!("Returns cache entry invalidated: {}", key);
        }
    }

    /// Сбросить все записи. Запросы в полёте не отменяются.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        let count = state.entries.len();
        state.entries.clear();
        tracing::debug!("Returns cache cleared ({} entries)", count);
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Присоединиться к запросу в полёте или запустить новый.
    /// Новый запрос сразу уходит в отдельную задачу, поэтому завершается,
    /// даже если все ожидающие отвалятся.
    fn join_or_start(
        self: &Arc<Self>,
        state: &mut FetchState,
        key: &CacheKey,
        query: &ReturnsQuery,
    ) -> SharedFetch {
        if let Some(in_flight) = state.in_flight.get(key) {
            tracing::debug!("Joining in-flight returns request: {}", key);
            return in_flight.future.clone();
        }

        let id = state.next_id;
        state.next_id += 1;

        let inner = Arc::clone(self);
        let task_key = key.clone();
        let request = query.to_request();
        let future: SharedFetch = async move {
            let result = inner.fetch_with_retry(&request).await;
            inner.complete(&task_key, id, &result);
            result
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key.clone(),
            InFlight {
                id,
                future: future.clone(),
            },
        );
        tokio::spawn(future.clone());
        future
    }

    async fn fetch_with_retry(
        &self,
        request: &ReturnsListRequest,
    ) -> Result<Arc<ReturnsPage>, FetchError> {
        let attempts = self.settings.max_retries + 1;
        let mut last_error = FetchError::Abandoned;

        for attempt in 1..=attempts {
            match self.api.list_returns(request).await {
                Ok(response) => {
                    tracing::info!(
                        "Fetched {} returns (total {}) for accounts {:?}",
                        response.returns.len(),
                        response.total,
                        request.account_ids
                    );
                    return Ok(Arc::new(ReturnsPage::from(response)));
                }
                Err(e) => {
                    tracing::warn!("Returns request attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
            }
        }

        tracing::error!("Returns request failed after {} attempts: {}", attempts, last_error);
        Err(FetchError::Exhausted {
            attempts,
            last: Box::new(last_error),
        })
    }

    fn complete(&self, key: &CacheKey, id: u64, result: &Result<Arc<ReturnsPage>, FetchError>) {
        let mut state = self.lock();
        if state.in_flight.get(key).map(|f| f.id) == Some(id) {
            state.in_flight.remove(key);
        }
        // При ошибке прежняя запись остаётся последним хорошим значением
        if let Ok(payload) = result {
            state.entries.insert(
                key.clone(),
                CacheEntry {
                    key: key.clone(),
                    payload: payload.clone(),
                    fetched_at: self.clock.now(),
                },
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::clock::ManualClock;
    use async_trait::async_trait;
    use contracts::domain::a025_mp_returns::{AccountSelection, FilterCriteria};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock upstream: считает вызовы, отвечает с задержкой,
    /// первые `failures` вызовов завершаются ошибкой.
    /// В `total` ответа кладётся номер вызова.
    pub(crate) struct MockApi {
        pub calls: AtomicUsize,
        pub failures: AtomicUsize,
        pub delay: Duration,
        pub records: Mutex<Vec<ReturnRecord>>,
    }

    impl MockApi {
        pub(crate) fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                delay,
                records: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn fail_next(&self, count: usize) {
            self.failures.store(count, Ordering::SeqCst);
        }

        pub(crate) fn set_records(&self, records: Vec<ReturnRecord>) {
            *self.records.lock().unwrap() = records;
        }
    }

    #[async_trait]
    impl ReturnsApi for MockApi {
        async fn list_returns(
            &self,
            _request: &ReturnsListRequest,
        ) -> Result<ReturnsListResponse, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(FetchError::Transport("connection reset".into()));
            }
            Ok(ReturnsListResponse {
                returns: self.records.lock().unwrap().clone(),
                total: call,
            })
        }
    }

    fn query(search: &str) -> ReturnsQuery {
        ReturnsQuery::new(
            AccountSelection::Single("acc-1".into()),
            FilterCriteria {
                search: Some(search.into()),
                ..Default::default()
            },
            1,
            50,
        )
    }

    fn fetcher(api: Arc<MockApi>, clock: ManualClock) -> ReturnsFetcher {
        ReturnsFetcher::new(
            api,
            Arc::new(clock),
            FetchSettings {
                freshness_window: chrono::Duration::seconds(300),
                max_retries: 2,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_requests_coalesce() {
        let api = MockApi::new(Duration::from_millis(100));
        let fetcher = fetcher(api.clone(), ManualClock::new(Utc::now()));
        let q = query("abc");

        let results = futures::future::join_all((0..10).map(|_| fetcher.fetch(&q))).await;

        assert_eq!(api.calls(), 1);
        let first = results[0].as_ref().unwrap().payload().clone();
        for result in &results {
            let outcome = result.as_ref().unwrap();
            assert!(matches!(outcome, FetchOutcome::Fetched(_)));
            assert!(Arc::ptr_eq(outcome.payload(), &first));
        }
        assert_eq!(fetcher.in_flight_count(), 0);
        assert_eq!(fetcher.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_are_fetched_separately() {
        let api = MockApi::new(Duration::from_millis(100));
        let fetcher = fetcher(api.clone(), ManualClock::new(Utc::now()));

        let (qa, qb) = (query("a"), query("b"));
        let (a, b) = tokio::join!(fetcher.fetch(&qa), fetcher.fetch(&qb));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_served_without_call() {
        let api = MockApi::new(Duration::from_millis(10));
        let clock = ManualClock::new(Utc::now());
        let fetcher = fetcher(api.clone(), clock.clone());
        let q = query("abc");

        fetcher.fetch(&q).await.unwrap();
        clock.advance(chrono::Duration::seconds(299));
        let outcome = fetcher.fetch(&q).await.unwrap();

        assert!(matches!(outcome, FetchOutcome::Cached(_)));
        assert_eq!(outcome.payload().total, 1);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_returned_while_revalidating() {
        let api = MockApi::new(Duration::from_millis(100));
        let clock = ManualClock::new(Utc::now());
        let fetcher = fetcher(api.clone(), clock.clone());
        let q = query("abc");

        fetcher.fetch(&q).await.unwrap();
        clock.advance(chrono::Duration::seconds(301));

        let outcome = fetcher.fetch(&q).await.unwrap();
        assert!(outcome.is_stale());
        assert_eq!(outcome.payload().total, 1);

        // Второе обращение во время обновления не порождает новый вызов
        let second = fetcher.fetch(&q).await.unwrap();
        assert_eq!(second.payload().total, 1);

        let FetchOutcome::Stale { revalidation, .. } = outcome else {
            panic!("expected stale outcome");
        };
        let fresh = revalidation.wait().await.unwrap();
        assert_eq!(fresh.total, 2);
        assert_eq!(api.calls(), 2);

        let cached = fetcher.fetch(&q).await.unwrap();
        assert!(matches!(cached, FetchOutcome::Cached(_)));
        assert_eq!(cached.payload().total, 2);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_completes_without_waiters() {
        let api = MockApi::new(Duration::from_millis(100));
        let clock = ManualClock::new(Utc::now());
        let fetcher = fetcher(api.clone(), clock.clone());
        let q = query("abc");

        fetcher.fetch(&q).await.unwrap();
        clock.advance(chrono::Duration::seconds(301));
        drop(fetcher.fetch(&q).await.unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fetcher.in_flight_count(), 0);
        assert_eq!(fetcher.entry(&q.cache_key()).unwrap().payload.total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let api = MockApi::new(Duration::from_millis(10));
        api.fail_next(2);
        let fetcher = fetcher(api.clone(), ManualClock::new(Utc::now()));

        let outcome = fetcher.fetch(&query("abc")).await.unwrap();
        assert_eq!(api.calls(), 3);
        assert_eq!(outcome.payload().total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_last_good_entry() {
        let api = MockApi::new(Duration::from_millis(10));
        let clock = ManualClock::new(Utc::now());
        let fetcher = fetcher(api.clone(), clock.clone());
        let q = query("abc");

        fetcher.fetch(&q).await.unwrap();
        clock.advance(chrono::Duration::seconds(600));
        api.fail_next(10);

        let err = fetcher.revalidate(&q).await.unwrap_err();
        match &err {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, FetchError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.root(), &FetchError::Transport("connection reset".into()));
        assert_eq!(api.calls(), 4);

        let entry = fetcher.entry(&q.cache_key()).unwrap();
        assert_eq!(entry.payload.total, 1);
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_new_call() {
        let api = MockApi::new(Duration::from_millis(10));
        let fetcher = fetcher(api.clone(), ManualClock::new(Utc::now()));
        let q = query("abc");

        fetcher.fetch(&q).await.unwrap();
        fetcher.invalidate(&q.cache_key());
        let outcome = fetcher.fetch(&q).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Fetched(_)));
        assert_eq!(api.calls(), 2);

        fetcher.clear();
        assert!(fetcher.is_empty());
    }
}
