//! Состояние фильтров, выбора аккаунтов и пагинации.
//!
//! Изменения фильтра уходят потребителям только после паузы debounce,
//! пагинация и выбор аккаунтов публикуются сразу. Публикуется только
//! смена эффективного ключа кэша.

use contracts::domain::a025_mp_returns::{AccountSelection, FilterCriteria, FilterPatch};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use super::query::ReturnsQuery;
use crate::shared::debounce::Debouncer;

#[derive(Debug, Clone)]
struct QueryState {
    /// Фильтр, который редактирует пользователь (до debounce)
    draft: FilterCriteria,
    /// Фильтр, видимый потребителям
    committed: FilterCriteria,
    accounts: AccountSelection,
    page: usize,
    page_size: usize,
}

impl QueryState {
    fn query(&self) -> ReturnsQuery {
        ReturnsQuery::new(
            self.accounts.clone(),
            self.committed.clone(),
            self.page,
            self.page_size,
        )
    }
}

fn lock(state: &Mutex<QueryState>) -> MutexGuard<'_, QueryState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Опубликовать запрос, если его ключ изменился
fn publish(state: &QueryState, tx: &watch::Sender<ReturnsQuery>) -> bool {
    let next = state.query();
    let next_key = next.cache_key();
    tx.send_if_modified(|current| {
        if current.cache_key() == next_key {
            false
        } else {
            tracing::debug!("Effective returns query changed: {}", next_key);
            *current = next;
            true
        }
    })
}

pub struct QueryController {
    state: Arc<Mutex<QueryState>>,
    tx: Arc<watch::Sender<ReturnsQuery>>,
    debouncer: Debouncer,
}

impl QueryController {
    pub fn new(page_size: usize, debounce_delay: Duration) -> Self {
        let state = QueryState {
            draft: FilterCriteria::default(),
            committed: FilterCriteria::default(),
            accounts: AccountSelection::default(),
            page: 1,
            page_size: page_size.max(1),
        };
        let (tx, _rx) = watch::channel(state.query());
        Self {
            state: Arc::new(Mutex::new(state)),
            tx: Arc::new(tx),
            debouncer: Debouncer::new(debounce_delay),
        }
    }

    /// Подписка на эффективный запрос
    pub fn subscribe(&self) -> watch::Receiver<ReturnsQuery> {
        self.tx.subscribe()
    }

    /// Текущий эффективный запрос
    pub fn current(&self) -> ReturnsQuery {
        self.tx.borrow().clone()
    }

    /// Фильтр с ещё не опубликованными правками
    pub fn draft_filters(&self) -> FilterCriteria {
        lock(&self.state).draft.clone()
    }

    pub fn has_pending_filters(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Влить частичное изменение фильтра. Страница сбрасывается на 1
    /// вместе с публикацией после debounce.
    pub fn set_filters(&self, patch: FilterPatch) {
        lock(&self.state).draft.merge(patch);
        self.schedule_commit();
    }

    pub fn replace_filters(&self, filters: FilterCriteria) {
        lock(&self.state).draft = filters;
        self.schedule_commit();
    }

    pub fn clear_filters(&self) {
        lock(&self.state).draft = FilterCriteria::default();
        self.schedule_commit();
    }

    /// Опубликовать отложенные правки фильтра немедленно
    pub fn flush(&self) -> bool {
        if !self.debouncer.is_pending() {
            return false;
        }
        self.debouncer.cancel();
        let mut state = lock(&self.state);
        Self::commit(&mut state);
        publish(&state, &self.tx)
    }

    /// Один id → одиночный режим, иначе множественный. Без debounce.
    pub fn set_account_selection(&self, ids: Vec<String>) -> bool {
        self.apply_selection(AccountSelection::from_ids(ids))
    }

    pub fn select_single(&self, id: impl Into<String>) -> bool {
        self.apply_selection(AccountSelection::Single(id.into()))
    }

    pub fn select_multi(&self, ids: Vec<String>) -> bool {
        self.apply_selection(AccountSelection::Multi(ids))
    }

    pub fn set_page(&self, page: usize) -> bool {
        let mut state = lock(&self.state);
        state.page = page.max(1);
        publish(&state, &self.tx)
    }

    pub fn set_page_size(&self, page_size: usize) -> bool {
        let mut state = lock(&self.state);
        state.page_size = page_size.max(1);
        state.page = 1;
        publish(&state, &self.tx)
    }

    /// Восстановить состояние из снимка без debounce
    pub fn restore(&self, filters: FilterCriteria, accounts: AccountSelection, page: usize) -> bool {
        self.debouncer.cancel();
        let mut state = lock(&self.state);
        state.draft = filters.clone();
        state.committed = filters;
        state.accounts = accounts;
        state.page = page.max(1);
        publish(&state, &self.tx)
    }

    fn apply_selection(&self, accounts: AccountSelection) -> bool {
        let mut state = lock(&self.state);
        state.accounts = accounts;
        state.page = 1;
        publish(&state, &self.tx)
    }

    fn commit(state: &mut QueryState) {
        state.committed = state.draft.clone();
        state.page = 1;
    }

    fn schedule_commit(&self) {
        let state = Arc::clone(&self.state);
        let tx = Arc::clone(&self.tx);
        self.debouncer.schedule(move || {
            let mut state = lock(&state);
            Self::commit(&mut state);
            publish(&state, &tx);
        });
    }
}
