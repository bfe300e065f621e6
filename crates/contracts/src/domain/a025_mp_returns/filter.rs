use serde::{Deserialize, Serialize};

/// Критерии фильтрации списка возвратов
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    /// Свободный поиск (номер возврата, заказа, трек-номер)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Коды статусов
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    /// Начало периода (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    /// Конец периода (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .cloned()
}

impl FilterCriteria {
    /// Каноническая форма: пустые поля удалены, массивы отсортированы.
    /// Две эквивалентные формы фильтра дают равные `normalized()`.
    pub fn normalized(&self) -> Self {
        let mut status: Vec<String> = self
            .status
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();
        status.sort();

        Self {
            search: non_blank(&self.search),
            status,
            date_from: non_blank(&self.date_from),
            date_to: non_blank(&self.date_to),
        }
    }

    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }

    /// Применить частичное изменение
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(search) = patch.search {
            self.search = Some(search);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(date_from) = patch.date_from {
            self.date_from = Some(date_from);
        }
        if let Some(date_to) = patch.date_to {
            self.date_to = Some(date_to);
        }
    }
}

/// Частичное изменение фильтра: `Some` заменяет значение,
/// пустое значение очищает поле после нормализации.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterPatch {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<Vec<String>>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

impl FilterPatch {
    pub fn search(value: impl Into<String>) -> Self {
        Self {
            search: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn status<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: Some(codes.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn period(date_from: impl Into<String>, date_to: impl Into<String>) -> Self {
        Self {
            date_from: Some(date_from.into()),
            date_to: Some(date_to.into()),
            ..Default::default()
        }
    }
}

/// Выбор аккаунтов: один аккаунт или несколько.
/// Переключение режима всегда сбрасывает выбор другого режима.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ids", rename_all = "snake_case")]
pub enum AccountSelection {
    Single(String),
    Multi(Vec<String>),
}

impl Default for AccountSelection {
    fn default() -> Self {
        AccountSelection::Multi(Vec::new())
    }
}

impl AccountSelection {
    /// Один id → одиночный режим, иначе множественный
    pub fn from_ids(ids: Vec<String>) -> Self {
        let mut ids: Vec<String> = ids.into_iter().filter(|id| !id.trim().is_empty()).collect();
        if ids.len() == 1 {
            AccountSelection::Single(ids.remove(0))
        } else {
            AccountSelection::Multi(ids)
        }
    }

    /// Отсортированный набор id без повторов
    pub fn account_ids(&self) -> Vec<String> {
        let mut ids = match self {
            AccountSelection::Single(id) => vec![id.clone()],
            AccountSelection::Multi(ids) => ids.clone(),
        };
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AccountSelection::Single(id) => id.is_empty(),
            AccountSelection::Multi(ids) => ids.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_drops_empty_fields_and_sorts_status() {
        let a = FilterCriteria {
            search: Some("  ".into()),
            status: vec!["closed".into(), "".into(), "opened".into()],
            date_from: Some("2026-01-01".into()),
            date_to: None,
        };
        let b = FilterCriteria {
            search: None,
            status: vec!["opened".into(), "closed".into()],
            date_from: Some("2026-01-01".into()),
            date_to: Some(String::new()),
        };
        assert!(a.is_equivalent(&b));
        assert_eq!(a.normalized().status, vec!["closed", "opened"]);
        assert_eq!(a.normalized().search, None);
    }

    #[test]
    fn test_merge_replaces_only_present_fields() {
        let mut filters = FilterCriteria {
            search: Some("abc".into()),
            status: vec!["opened".into()],
            ..Default::default()
        };
        filters.merge(FilterPatch::period("2026-02-01", "2026-02-28"));
        assert_eq!(filters.search.as_deref(), Some("abc"));
        assert_eq!(filters.status, vec!["opened"]);
        assert_eq!(filters.date_to.as_deref(), Some("2026-02-28"));

        filters.merge(FilterPatch::search(""));
        assert_eq!(filters.normalized().search, None);
    }

    #[test]
    fn test_account_selection_modes() {
        assert_eq!(
            AccountSelection::from_ids(vec!["acc-1".into()]),
            AccountSelection::Single("acc-1".into())
        );
        let multi = AccountSelection::from_ids(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(multi.account_ids(), vec!["a", "b"]);
        assert!(AccountSelection::from_ids(vec![]).is_empty());
    }

    #[test]
    fn test_account_selection_serde_shape() {
        let json = serde_json::to_string(&AccountSelection::Single("a".into())).unwrap();
        assert_eq!(json, r#"{"mode":"single","ids":"a"}"#);
        let back: AccountSelection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AccountSelection::Single("a".into()));
    }
}
