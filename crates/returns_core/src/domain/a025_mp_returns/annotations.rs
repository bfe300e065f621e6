//! Локальные пометки пользователя по возвратам (статус проверки).
//!
//! Пометки живут независимо от данных сервера и хранятся
//! в формате `{ [recordId]: { status, assignedAt } }`.

use chrono::{DateTime, Duration, Utc};
use contracts::enums::review_status::ReviewStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::shared::clock::Clock;
use crate::shared::storage::KeyValueStore;

pub const ANNOTATIONS_KEY: &str = "mp_returns.annotations";
pub const ANNOTATION_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub record_id: String,
    pub status: ReviewStatus,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAnnotation {
    status: ReviewStatus,
    assigned_at: DateTime<Utc>,
}

pub struct AnnotationStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    annotations: HashMap<String, Annotation>,
}

impl AnnotationStore {
    /// Загрузить пометки из хранилища и сразу удалить просроченные.
    /// Битые данные стираются, хранилище начинается с пустой карты.
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let annotations = match store.get(ANNOTATIONS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<HashMap<String, StoredAnnotation>>(&raw) {
                Ok(stored) => stored
                    .into_iter()
                    .map(|(record_id, a)| {
                        let annotation = Annotation {
                            record_id: record_id.clone(),
                            status: a.status,
                            assigned_at: a.assigned_at,
                        };
                        (record_id, annotation)
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!("Corrupt returns annotations discarded: {}", e);
                    if let Err(e) = store.remove(ANNOTATIONS_KEY) {
                        tracing::warn!("Failed to remove returns annotations: {}", e);
                    }
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read returns annotations: {}", e);
                HashMap::new()
            }
        };

        let mut this = Self {
            store,
            clock,
            annotations,
        };
        this.prune_expired();
        this
    }

    /// Установить статус записи (со свежей меткой времени) и сразу сохранить
    pub fn set_status(&mut self, record_id: &str, status: ReviewStatus) -> Annotation {
        let annotation = Annotation {
            record_id: record_id.to_string(),
            status,
            assigned_at: self.clock.now(),
        };
        self.annotations
            .insert(record_id.to_string(), annotation.clone());
        self.persist();
        annotation
    }

    pub fn get(&self, record_id: &str) -> Option<&Annotation> {
        self.annotations.get(record_id)
    }

    pub fn status_of(&self, record_id: &str) -> Option<ReviewStatus> {
        self.annotations.get(record_id).map(|a| a.status)
    }

    /// Карта `record_id → статус` для слоя представления
    pub fn statuses(&self) -> HashMap<String, ReviewStatus> {
        self.annotations
            .iter()
            .map(|(id, a)| (id.clone(), a.status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn remove(&mut self, record_id: &str) -> bool {
        let removed = self.annotations.remove(record_id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// Удалить пометки старше 7 дней, вернуть количество удалённых
    pub fn prune_expired(&mut self) -> usize {
        let now = self.clock.now();
        let retention = Duration::days(ANNOTATION_RETENTION_DAYS);
        let before = self.annotations.len();
        self.annotations
            .retain(|_, a| now - a.assigned_at <= retention);

        let pruned = before - self.annotations.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} expired returns annotations", pruned);
            self.persist();
        }
        pruned
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        if let Err(e) = self.store.remove(ANNOTATIONS_KEY) {
            tracing::warn!("Failed to remove returns annotations: {}", e);
        }
    }

    fn persist(&self) {
        let stored: HashMap<&str, StoredAnnotation> = self
            .annotations
            .iter()
            .map(|(id, a)| {
                (
                    id.as_str(),
                    StoredAnnotation {
                        status: a.status,
                        assigned_at: a.assigned_at,
                    },
                )
            })
            .collect();

        match serde_json::to_string(&stored) {
            Ok(json) => {
                if let Err(e) = self.store.set(ANNOTATIONS_KEY, &json) {
                    tracing::warn!("Failed to persist returns annotations: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize returns annotations: {}", e),
        }
    }
}
