use std::collections::HashSet;

use super::RegisterEntry;

/// Keep the first entry for each (number, title); order of first occurrence is preserved.
pub fn dedup(entries: Vec<RegisterEntry>) -> Vec<RegisterEntry> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|e| seen.insert((e.number.clone(), e.title.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::category::Category;

    fn entry(number: &str, title: &str, category: Category) -> RegisterEntry {
        RegisterEntry {
            number: number.to_string(),
            title: title.to_string(),
            decided: "01/01/2020".to_string(),
            category,
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let out = dedup(vec![
            entry("MC-1", "ACME", Category::NameChange),
            entry("MC-2", "BETA", Category::NameChange),
            entry("MC-1", "ACME", Category::Revocation),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].category, Category::NameChange);
        assert_eq!(out[1].number, "MC-2");
    }

    #[test]
    fn same_number_different_title_kept() {
        let out = dedup(vec![
            entry("MC-1", "ACME", Category::NameChange),
            entry("MC-1", "ACME LLC", Category::NameChange),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn idempotent() {
        let once = dedup(vec![
            entry("MC-3", "C", Category::Dismissal),
            entry("MC-1", "A", Category::Dismissal),
            entry("MC-3", "C", Category::Dismissal),
            entry("FF-1", "A", Category::Transfers),
        ]);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
        let numbers: Vec<&str> = once.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers, vec!["MC-3", "MC-1", "FF-1"]);
    }
}
