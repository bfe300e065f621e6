use serde::{Deserialize, Serialize};

/// Статус ручной проверки возврата, назначаемый пользователем локально
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Reviewed,
    Disputed,
    Resolved,
}

impl ReviewStatus {
    /// Получить код статуса
    pub fn code(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Disputed => "disputed",
            ReviewStatus::Resolved => "resolved",
        }
    }

    /// Получить человекочитаемое название
    pub fn display_name(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "Ожидает проверки",
            ReviewStatus::Reviewed => "Проверен",
            ReviewStatus::Disputed => "Оспорен",
            ReviewStatus::Resolved => "Закрыт",
        }
    }

    pub fn all() -> Vec<ReviewStatus> {
        vec![
            ReviewStatus::Pending,
            ReviewStatus::Reviewed,
            ReviewStatus::Disputed,
            ReviewStatus::Resolved,
        ]
    }

    /// Парсинг из строки
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending" => Some(ReviewStatus::Pending),
            "reviewed" => Some(ReviewStatus::Reviewed),
            "disputed" => Some(ReviewStatus::Disputed),
            "resolved" => Some(ReviewStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for status in ReviewStatus::all() {
            assert_eq!(ReviewStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ReviewStatus::from_code("unknown"), None);
    }

    #[test]
    fn test_display_names_are_distinct() {
        let names: std::collections::HashSet<&str> =
            ReviewStatus::all().iter().map(|s| s.display_name()).collect();
        assert_eq!(names.len(), ReviewStatus::all().len());
        assert_eq!(ReviewStatus::default().display_name(), "Ожидает проверки");
    }

    #[test]
    fn test_serde_matches_code() {
        let json = serde_json::to_string(&ReviewStatus::Disputed).unwrap();
        assert_eq!(json, "\"disputed\"");
    }
}
