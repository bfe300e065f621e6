//! Группировка возвратов по базовому артикулу.
//!
//! Чистая функция: без I/O, результат зависит только от входного списка.

use chrono::{DateTime, Utc};
use contracts::domain::a025_mp_returns::ReturnRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::sku::base_key;

/// Группа возвратов одного товара (все вариации одного базового артикула)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnGroup {
    pub base_key: String,
    pub representative_title: String,
    pub members: Vec<ReturnRecord>,
    /// Всегда равно `members.len()`
    pub total_count: usize,
    pub total_quantity: u64,
    pub total_value: f64,
    /// `total_value / total_count`, пересчитывается из участников
    pub average_value: f64,
    pub distinct_variation_ids: BTreeSet<String>,
    pub distinct_claim_ids: BTreeSet<String>,
    pub status_histogram: BTreeMap<String, usize>,
    pub reason_histogram: BTreeMap<String, usize>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// Результат группировки
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Hierarchy {
    /// Группы с двумя и более участниками, по убыванию размера
    pub groups: Vec<ReturnGroup>,
    /// Записи без артикула и единственные участники своих групп
    pub independents: Vec<ReturnRecord>,
}

impl Hierarchy {
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum::<usize>() + self.independents.len()
    }
}

struct GroupAccumulator {
    base_key: String,
    members: Vec<ReturnRecord>,
}

impl GroupAccumulator {
    fn finish(self) -> ReturnGroup {
        let mut total_quantity = 0u64;
        let mut total_value = 0.0;
        let mut distinct_variation_ids = BTreeSet::new();
        let mut distinct_claim_ids = BTreeSet::new();
        let mut status_histogram = BTreeMap::new();
        let mut reason_histogram = BTreeMap::new();
        let mut period_start: Option<DateTime<Utc>> = None;
        let mut period_end: Option<DateTime<Utc>> = None;

        for record in &self.members {
            total_quantity += record.quantity() as u64;
            total_value += record.value();

            if let Some(id) = record.variation_id() {
                distinct_variation_ids.insert(id.to_string());
            }
            if let Some(id) = record.claim_id.as_deref() {
                distinct_claim_ids.insert(id.to_string());
            }
            if let Some(status) = record.status.as_deref() {
                *status_histogram.entry(status.to_string()).or_insert(0) += 1;
            }
            if let Some(reason) = record.reason_id.as_deref() {
                *reason_histogram.entry(reason.to_string()).or_insert(0) += 1;
            }
            if let Some(created) = record.date_created {
                period_start = Some(period_start.map_or(created, |s| s.min(created)));
                period_end = Some(period_end.map_or(created, |e| e.max(created)));
            }
        }

        let total_count = self.members.len();
        let representative_title = self
            .members
            .iter()
            .find_map(|r| r.title())
            .map(str::to_string)
            .unwrap_or_else(|| self.base_key.clone());

        ReturnGroup {
            base_key: self.base_key,
            representative_title,
            total_count,
            total_quantity,
            total_value,
            average_value: if total_count > 0 {
                total_value / total_count as f64
            } else {
                0.0
            },
            distinct_variation_ids,
            distinct_claim_ids,
            status_histogram,
            reason_histogram,
            period_start,
            period_end,
            members: self.members,
        }
    }
}

/// Сгруппировать записи по базовому артикулу.
///
/// Записи без артикула сразу уходят в `independents`. Группа из одной
/// записи распускается: запись дописывается в конец `independents`.
/// Группы сортируются по убыванию количества (при равенстве в порядке
/// первого появления).
pub fn aggregate(records: &[ReturnRecord]) -> Hierarchy {
    let mut independents = Vec::new();
    let mut accumulators: Vec<GroupAccumulator> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(key) = record.raw_sku().and_then(base_key) else {
            independents.push(record.clone());
            continue;
        };

        match index.get(&key) {
            Some(&i) => accumulators[i].members.push(record.clone()),
            None => {
                index.insert(key.clone(), accumulators.len());
                accumulators.push(GroupAccumulator {
                    base_key: key,
                    members: vec![record.clone()],
                });
            }
        }
    }

    let mut groups = Vec::with_capacity(accumulators.len());
    for acc in accumulators {
        if acc.members.len() == 1 {
            independents.extend(acc.members);
        } else {
            groups.push(acc.finish());
        }
    }

    // sort_by стабильная: равные группы остаются в порядке появления
    groups.sort_by(|a, b| b.total_count.cmp(&a.total_count));

    tracing::debug!(
        "Aggregated {} returns into {} groups and {} independents",
        records.len(),
        groups.len(),
        independents.len()
    );

    Hierarchy {
        groups,
        independents,
    }
}
