use contracts::domain::a025_mp_returns::{
    AccountSelection, FilterCriteria, ListFilters, ListPagination, ReturnsListRequest,
};
use serde::{Deserialize, Serialize};

/// Эффективный запрос списка: аккаунты, фильтр и страница (нумерация с 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsQuery {
    pub accounts: AccountSelection,
    pub filters: FilterCriteria,
    pub page: usize,
    pub page_size: usize,
}

impl ReturnsQuery {
    pub fn new(accounts: AccountSelection, filters: FilterCriteria, page: usize, page_size: usize) -> Self {
        Self {
            accounts,
            filters,
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.page_size
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.accounts, &self.filters, self.page, self.page_size)
    }

    /// Тело запроса к upstream-сервису
    pub fn to_request(&self) -> ReturnsListRequest {
        ReturnsListRequest {
            account_ids: self.accounts.account_ids(),
            filters: ListFilters::from(&self.filters),
            pagination: ListPagination {
                offset: self.offset(),
                limit: self.page_size,
            },
        }
    }
}

/// Каноническое представление параметров запроса.
///
/// Эквивалентные фильтры (те же поля после удаления пустых значений
/// и сортировки массивов) всегда дают одинаковый ключ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct KeyParts {
    accounts: Vec<String>,
    filters: FilterCriteria,
    page: usize,
    page_size: usize,
}

impl CacheKey {
    pub fn new(
        accounts: &AccountSelection,
        filters: &FilterCriteria,
        page: usize,
        page_size: usize,
    ) -> Self {
        let parts = KeyParts {
            accounts: accounts.account_ids(),
            filters: filters.normalized(),
            page: page.max(1),
            page_size,
        };
        // Сериализация структуры из строк и чисел не падает
        let encoded = serde_json::to_string(&parts).unwrap_or_else(|_| {
            format!(
                "{:?}|{:?}|{}|{}",
                parts.accounts, parts.filters, parts.page, parts.page_size
            )
        });
        CacheKey(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
