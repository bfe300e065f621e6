//! Общие контракты (DTO) между upstream-сервисом возвратов, ядром кэширования
//! и слоем представления.

pub mod domain;
pub mod enums;
