//! Ядро данных по возвратам маркетплейса: загрузка с upstream-сервиса,
//! кэширование и склейка одинаковых запросов, снимок для мгновенного
//! восстановления, группировка по базовому артикулу и локальные пометки.

pub mod domain;
pub mod shared;
pub mod system;
