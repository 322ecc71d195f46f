//! Equipment abbreviations used by the upstream feed.

use std::collections::HashMap;
use std::sync::OnceLock;

const ENTRIES: &[(&str, &str)] = &[
    // washing machines
    ("с/м", "Washing machine"),
    ("см", "Washing machine"),
    ("стир", "Washing machine"),
    ("стиралка", "Washing machine"),
    ("стиральная", "Washing machine"),
    ("стиральная машина", "Washing machine"),
    ("стиральная машинка", "Washing machine"),
    ("стир машина", "Washing machine"),
    ("стир. машина", "Washing machine"),
    ("машинка", "Washing machine"),
    // dishwashers
    ("п/м", "Dishwasher"),
    ("пмм", "Dishwasher"),
    ("посудомойка", "Dishwasher"),
    ("посудомоечная", "Dishwasher"),
    ("посудомоечная машина", "Dishwasher"),
    ("посудомоечная машинка", "Dishwasher"),
    // cold
    ("х/к", "Refrigerator"),
    ("х-к", "Refrigerator"),
    ("хк", "Refrigerator"),
    ("хол", "Refrigerator"),
    ("холодильник", "Refrigerator"),
    ("холодос", "Refrigerator"),
    ("морозильник", "Freezer"),
    ("морозилка", "Freezer"),
    ("морозильная камера", "Freezer"),
    ("конд", "Air conditioner"),
    ("кондей", "Air conditioner"),
    ("кондиционер", "Air conditioner"),
    ("сплит", "Air conditioner"),
    ("сплит-система", "Air conditioner"),
    ("сплит система", "Air conditioner"),
    // water and heating
    ("в/н", "Water heater"),
    ("бойлер", "Water heater"),
    ("водонагреватель", "Water heater"),
    ("колонка", "Gas water heater"),
    ("газовая колонка", "Gas water heater"),
    ("котел", "Boiler"),
    ("котёл", "Boiler"),
    ("газовый котел", "Boiler"),
    ("газовый котёл", "Boiler"),
    ("отопление", "Heating"),
    ("батарея", "Heating"),
    ("радиатор", "Heating"),
    ("теплый пол", "Underfloor heating"),
    ("тёплый пол", "Underfloor heating"),
    // cooking
    ("дух", "Oven"),
    ("духовка", "Oven"),
    ("духовой шкаф", "Oven"),
    ("дух шкаф", "Oven"),
    ("д/ш", "Oven"),
    ("в/п", "Cooktop"),
    ("варка", "Cooktop"),
    ("варочная", "Cooktop"),
    ("варочная панель", "Cooktop"),
    ("индукция", "Cooktop"),
    ("плита", "Stove"),
    ("эл плита", "Electric stove"),
    ("эл. плита", "Electric stove"),
    ("электроплита", "Electric stove"),
    ("электрическая плита", "Electric stove"),
    ("г/п", "Gas stove"),
    ("газовая плита", "Gas stove"),
    ("газ плита", "Gas stove"),
    ("свч", "Microwave"),
    ("микра", "Microwave"),
    ("микроволновка", "Microwave"),
    ("микроволновая печь", "Microwave"),
    ("вытяжка", "Range hood"),
    ("к/м", "Coffee machine"),
    ("кофемашина", "Coffee machine"),
    ("кофеварка", "Coffee machine"),
    ("мультиварка", "Multicooker"),
    // drying and cleaning
    ("с/у", "Dryer"),
    ("сушилка", "Dryer"),
    ("сушильная машина", "Dryer"),
    ("пылесос", "Vacuum cleaner"),
    ("робот пылесос", "Robot vacuum"),
    ("робот-пылесос", "Robot vacuum"),
    // electronics
    ("тв", "Television"),
    ("телек", "Television"),
    ("телевизор", "Television"),
    ("пк", "Computer"),
    ("комп", "Computer"),
    ("компьютер", "Computer"),
    ("ноут", "Laptop"),
    ("ноутбук", "Laptop"),
    ("принтер", "Printer"),
    ("мфу", "Printer"),
    ("телефон", "Phone"),
    ("смартфон", "Phone"),
    ("планшет", "Tablet"),
    ("роутер", "Router"),
    ("домофон", "Intercom"),
    // trades
    ("эл", "Electrical"),
    ("электрика", "Electrical"),
    ("электрик", "Electrical"),
    ("розетка", "Electrical"),
    ("проводка", "Electrical"),
    ("люстра", "Lighting"),
    ("светильник", "Lighting"),
    ("сантех", "Plumbing"),
    ("сантехника", "Plumbing"),
    ("сантехник", "Plumbing"),
    ("смеситель", "Plumbing"),
    ("унитаз", "Plumbing"),
    ("засор", "Plumbing"),
    ("замок", "Door lock"),
    ("дверной замок", "Door lock"),
    ("дверь", "Door"),
    ("окно", "Window"),
    ("окна", "Window"),
    ("мебель", "Furniture"),
    ("сборка мебели", "Furniture assembly"),
];

static DICTIONARY: OnceLock<HashMap<String, &'static str>> = OnceLock::new();

fn dictionary() -> &'static HashMap<String, &'static str> {
    DICTIONARY.get_or_init(|| {
        let mut map: HashMap<String, &'static str> = ENTRIES
            .iter()
            .map(|(key, canonical)| ((*key).to_owned(), *canonical))
            .collect();
        for (_, canonical) in ENTRIES {
            map.entry(canonical.to_lowercase()).or_insert(canonical);
        }
        map
    })
}

/// Canonical equipment name for an abbreviation, word or canonical name.
///
/// Lookup is case-insensitive and ignores trailing punctuation.
///
/// # Examples
/// ```
/// use dispatch_backend::domain::canonical_equipment;
///
/// assert_eq!(canonical_equipment("С/м"), Some("Washing machine"));
/// assert_eq!(canonical_equipment("washing machine"), Some("Washing machine"));
/// assert_eq!(canonical_equipment("барабан"), None);
/// ```
pub fn canonical_equipment(key: &str) -> Option<&'static str> {
    let normalised = key
        .trim()
        .trim_end_matches([',', '.', ':', ';', '-'])
        .to_lowercase();
    dictionary().get(&normalised).copied()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("с/м", "Washing machine")]
    #[case("СТИРАЛКА", "Washing machine")]
    #[case("пмм,", "Dishwasher")]
    #[case("газовая плита", "Gas stove")]
    #[case("Air conditioner", "Air conditioner")]
    fn known_keys_resolve(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(canonical_equipment(key), Some(expected));
    }

    #[rstest]
    fn canonical_names_are_short_and_self_mapping() {
        for (_, canonical) in ENTRIES {
            assert!(canonical.split_whitespace().count() <= 2, "{canonical}");
            assert_eq!(canonical_equipment(canonical), Some(*canonical));
        }
    }

    #[rstest]
    fn dictionary_covers_the_feed_vocabulary() {
        assert!(ENTRIES.len() >= 100);
    }
}
