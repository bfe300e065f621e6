//! Базовый артикул: SKU без суффиксов вариации (размер, цвет, версия).
//!
//! Эвристика хрупкая: порядок шаблонов влияет на результат, а проверки
//! на реальном каталоге нет. Поведение зафиксировано тестами ниже;
//! менять порядок шаблонов только вместе с ними.

use once_cell::sync::Lazy;
use regex::Regex;

fn pattern(re: &str) -> Regex {
    // Шаблоны статичны и покрыты тестами
    Regex::new(re).unwrap_or_else(|e| panic!("invalid SKU suffix pattern {re}: {e}"))
}

/// Шаблоны суффиксов в порядке применения
static SUFFIX_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        // Размер буквами: -P, -M, -G, -PP, -GG
        ("size", pattern(r"-(PP|GG|P|M|G)$")),
        // Номер вариации 1–3 цифры. Номер с ведущим нулём (-001) считается
        // частью модели, а не вариацией
        ("numeric", pattern(r"-[1-9][0-9]{0,2}$")),
        // Одна-две буквы
        ("alpha", pattern(r"-[A-Z]{1,2}$")),
        // Версия: -V2, -V10
        ("version", pattern(r"-V[0-9]+$")),
        // Размер словом: -TAMP, -TAMGG
        ("size_word", pattern(r"-TAM[A-Z]+$")),
        ("underscore_numeric", pattern(r"_[1-9][0-9]{0,2}$")),
        ("underscore_size", pattern(r"_(PP|GG|P|M|G)$")),
    ]
});

/// Нормализованный SKU: без пробелов по краям, в верхнем регистре.
/// Пустой SKU → `None`.
pub fn normalize_sku(raw: &str) -> Option<String> {
    let sku = raw.trim();
    if sku.is_empty() {
        None
    } else {
        Some(sku.to_uppercase())
    }
}

/// Вычислить базовый артикул.
///
/// Каждый шаблон применяется один раз, по порядку, к оставшейся строке.
/// Шаг, после которого ключ стал бы пустым, пропускается.
/// Если ни один шаблон не сработал, возвращается исходный SKU.
pub fn base_key(raw: &str) -> Option<String> {
    let mut key = normalize_sku(raw)?;

    for (name, re) in SUFFIX_PATTERNS.iter() {
        let stripped = re.replace(&key, "");
        if stripped.len() != key.len() && !stripped.trim_matches(&['-', '_'][..]).is_empty() {
            tracing::trace!("SKU {}: suffix '{}' stripped -> {}", key, name, stripped);
            key = stripped.into_owned();
        }
    }

    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> String {
        base_key(raw).unwrap()
    }

    #[test]
    fn test_size_letters() {
        assert_eq!(key("ABC-P"), "ABC");
        assert_eq!(key("ABC-M"), "ABC");
        assert_eq!(key("ABC-G"), "ABC");
        assert_eq!(key("ABC-PP"), "ABC");
        assert_eq!(key("ABC-GG"), "ABC");
        assert_eq!(key("abc-gg"), "ABC");
    }

    #[test]
    fn test_documented_examples() {
        assert_eq!(key("PROD-001-P"), "PROD-001");
        assert_eq!(key("PROD-001-V2"), "PROD-001");
        assert_eq!(key("PROD-001"), "PROD-001");
    }

    #[test]
    fn test_numeric_variant_suffix() {
        assert_eq!(key("XYZ-1"), "XYZ");
        assert_eq!(key("XYZ-12"), "XYZ");
        assert_eq!(key("XYZ-123"), "XYZ");
        // Четыре цифры уже не вариация
        assert_eq!(key("XYZ-1234"), "XYZ-1234");
        // Ведущий ноль: номер модели
        assert_eq!(key("XYZ-010"), "XYZ-010");
    }

    #[test]
    fn test_alpha_suffix() {
        assert_eq!(key("SHIRT-AZ"), "SHIRT");
        assert_eq!(key("SHIRT-B"), "SHIRT");
        assert_eq!(key("SHIRT-ABC"), "SHIRT-ABC");
    }

    #[test]
    fn test_version_and_size_word() {
        assert_eq!(key("CASE-V10"), "CASE");
        assert_eq!(key("SHIRT-TAMG"), "SHIRT");
        assert_eq!(key("SHIRT-TAMPP"), "SHIRT");
    }

    #[test]
    fn test_underscore_variants() {
        assert_eq!(key("KIT_2"), "KIT");
        assert_eq!(key("KIT_GG"), "KIT");
        assert_eq!(key("KIT_007"), "KIT_007");
    }

    #[test]
    fn test_patterns_chain_in_order() {
        // размер, затем номер вариации
        assert_eq!(key("BAG-2-M"), "BAG");
        // размер, затем версия
        assert_eq!(key("BAG-V3-P"), "BAG");
        // версия идёт после alpha, поэтому буквы перед версией остаются
        assert_eq!(key("BAG-X-V3"), "BAG-X");
    }

    #[test]
    fn test_never_strips_to_empty() {
        assert_eq!(key("P"), "P");
        assert_eq!(key("-P"), "-P");
        assert_eq!(key("_2"), "_2");
    }

    #[test]
    fn test_empty_sku_has_no_key() {
        assert_eq!(base_key(""), None);
        assert_eq!(base_key("   "), None);
        assert_eq!(key("  abc-p  "), "ABC");
    }
}
