use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Краткая информация о заказе, к которому относится возврат
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: String,
    /// Название товара в заказе
    #[serde(default)]
    pub title: Option<String>,
    /// Количество единиц в заказе
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Сумма заказа
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
}

/// Товар, по которому оформлен возврат
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReturnProduct {
    /// Артикул продавца (seller SKU)
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// ID вариации товара на маркетплейсе
    #[serde(default)]
    pub variation_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Цена за единицу
    #[serde(default)]
    pub unit_price: Option<f64>,
}

/// Финансовая часть возврата
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReturnFinancial {
    /// Сумма возврата
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Покупатель
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuyerInfo {
    pub id: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Запись о возврате, как её отдаёт upstream-сервис.
///
/// Для ядра запись неизменяема: она только читается, группируется и кэшируется.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRecord {
    pub id: String,
    #[serde(default)]
    pub claim_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Статус возврата
    #[serde(default)]
    pub status: Option<String>,
    /// Статус возврата денег
    #[serde(default)]
    pub money_status: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    /// Статус обратной доставки
    #[serde(default)]
    pub shipment_status: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_closed: Option<DateTime<Utc>>,
    /// Код причины возврата
    #[serde(default)]
    pub reason_id: Option<String>,
    /// Артикул на верхнем уровне записи (если нет вложенного product)
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub order: Option<OrderSummary>,
    #[serde(default)]
    pub product: Option<ReturnProduct>,
    #[serde(default)]
    pub financial: Option<ReturnFinancial>,
    #[serde(default)]
    pub buyer: Option<BuyerInfo>,
}

impl ReturnRecord {
    /// Артикул записи: сначала из product, затем прямое поле.
    /// Пустые строки считаются отсутствием артикула.
    pub fn raw_sku(&self) -> Option<&str> {
        let from_product = self
            .product
            .as_ref()
            .and_then(|p| p.sku.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        from_product.or_else(|| {
            self.sku
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
    }

    /// Количество возвращаемых единиц (по умолчанию 1)
    pub fn quantity(&self) -> u32 {
        self.product
            .as_ref()
            .and_then(|p| p.quantity)
            .or_else(|| self.order.as_ref().and_then(|o| o.quantity))
            .unwrap_or(1)
    }

    /// Стоимость возврата: сумма из financial, иначе цена × количество
    pub fn value(&self) -> f64 {
        if let Some(amount) = self.financial.as_ref().and_then(|f| f.amount) {
            return amount;
        }
        self.product
            .as_ref()
            .and_then(|p| p.unit_price)
            .map(|price| price * self.quantity() as f64)
            .unwrap_or(0.0)
    }

    pub fn title(&self) -> Option<&str> {
        self.product
            .as_ref()
            .and_then(|p| p.title.as_deref())
            .or_else(|| self.order.as_ref().and_then(|o| o.title.as_deref()))
    }

    pub fn variation_id(&self) -> Option<&str> {
        self.product.as_ref().and_then(|p| p.variation_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_upstream_record() {
        let json = r#"{
            "id": "r-1",
            "claimId": "c-10",
            "status": "opened",
            "dateCreated": "2026-01-05T10:00:00Z",
            "product": {"sku": " ABC-P ", "quantity": 2, "unitPrice": 25.0, "variationId": "v1"},
            "unknownField": 42
        }"#;
        let record: ReturnRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "r-1");
        assert_eq!(record.claim_id.as_deref(), Some("c-10"));
        assert_eq!(record.raw_sku(), Some("ABC-P"));
        assert_eq!(record.quantity(), 2);
        assert_eq!(record.value(), 50.0);
        assert!(record.buyer.is_none());
    }

    #[test]
    fn test_raw_sku_falls_back_to_direct_field() {
        let record = ReturnRecord {
            id: "r-2".into(),
            sku: Some("XYZ-1".into()),
            product: Some(ReturnProduct {
                sku: Some("   ".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(record.raw_sku(), Some("XYZ-1"));

        let empty = ReturnRecord {
            id: "r-3".into(),
            ..Default::default()
        };
        assert_eq!(empty.raw_sku(), None);
        assert_eq!(empty.quantity(), 1);
        assert_eq!(empty.value(), 0.0);
    }

    #[test]
    fn test_financial_amount_wins_over_unit_price() {
        let record = ReturnRecord {
            id: "r-4".into(),
            product: Some(ReturnProduct {
                unit_price: Some(10.0),
                quantity: Some(3),
                ..Default::default()
            }),
            financial: Some(ReturnFinancial {
                amount: Some(27.5),
                currency: Some("BRL".into()),
            }),
            ..Default::default()
        };
        assert_eq!(record.value(), 27.5);
    }
}
