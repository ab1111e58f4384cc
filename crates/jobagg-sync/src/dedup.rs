use std::collections::{BTreeMap, HashMap};

use jobagg_core::{IdentityKey, NormalizedRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome<T = NormalizedRecord> {
    pub records: Vec<T>,
    /// Records collapsed into a later occurrence, per source.
    pub duplicates: BTreeMap<String, usize>,
}

impl<T> Default for DedupOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            duplicates: BTreeMap::new(),
        }
    }
}

/// Collapses one run's batch to a single record per identity key. The last occurrence wins and
/// takes the slot of the key's first occurrence. Duplicates are counted under `record.source`.
pub fn deduplicate(records: Vec<NormalizedRecord>) -> DedupOutcome {
    fold_last_wins(records, |r| &r.identity, |r| r.source.as_str())
}

/// Same fold over records tagged with the key of the adapter that produced them. Duplicates are
/// counted under the tag, so run counters stay on one key per adapter.
pub fn deduplicate_tagged(
    records: Vec<(String, NormalizedRecord)>,
) -> DedupOutcome<(String, NormalizedRecord)> {
    fold_last_wins(records, |(_, r)| &r.identity, |(tag, _)| tag.as_str())
}

fn fold_last_wins<T>(
    items: Vec<T>,
    identity: impl Fn(&T) -> &IdentityKey,
    origin: impl Fn(&T) -> &str,
) -> DedupOutcome<T> {
    let mut slots: HashMap<IdentityKey, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    let mut duplicates = BTreeMap::new();

    for item in items {
        let existing = slots.get(identity(&item)).copied();
        match existing {
            Some(idx) => {
                *duplicates.entry(origin(&item).to_string()).or_insert(0) += 1;
                out[idx] = item;
            }
            None => {
                slots.insert(identity(&item).clone(), out.len());
                out.push(item);
            }
        }
    }

    DedupOutcome {
        records: out,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use chrono::{TimeZone, Utc};
    use jobagg_core::RawFieldSet;

    fn normalize(raw: RawFieldSet) -> NormalizedRecord {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).single().unwrap();
        Normalizer::default().normalize(&raw, now).unwrap()
    }

    #[test]
    fn later_occurrence_wins() {
        let first = normalize(
            RawFieldSet::new("naukri")
                .with_title(" SOC Analyst ")
                .with_company("Acme"),
        );
        let second = normalize(
            RawFieldSet::new("naukri")
                .with_title("soc analyst")
                .with_company("ACME")
                .with_salary("₹5-8L"),
        );
        assert_eq!(first.identity, second.identity);

        let outcome = deduplicate(vec![first, second.clone()]);
        assert_eq!(outcome.records, vec![second]);
        assert_eq!(outcome.records[0].salary.as_deref(), Some("₹5-8L"));
        assert_eq!(outcome.duplicates.get("naukri"), Some(&1));
    }

    #[test]
    fn survivors_keep_first_occurrence_position() {
        let a1 = normalize(RawFieldSet::new("indeed").with_title("A").with_company("X"));
        let b = normalize(RawFieldSet::new("indeed").with_title("B").with_company("X"));
        let a2 = normalize(
            RawFieldSet::new("indeed")
                .with_title("a")
                .with_company("x")
                .with_location("Pune"),
        );
        let c = normalize(RawFieldSet::new("linkedin").with_title("A").with_company("X"));

        let outcome = deduplicate(vec![a1, b.clone(), a2.clone(), c.clone()]);
        assert_eq!(outcome.records, vec![a2, b, c]);
        assert_eq!(outcome.duplicates.get("indeed"), Some(&1));
        assert_eq!(outcome.duplicates.get("linkedin"), None);
    }

    #[test]
    fn tagged_duplicates_count_under_tag() {
        let first = normalize(RawFieldSet::new("Indeed").with_title("SOC").with_company("Acme"));
        let second = normalize(RawFieldSet::new("indeed").with_title("soc").with_company("acme"));

        let outcome = deduplicate_tagged(vec![
            ("indeed".to_string(), first),
            ("indeed".to_string(), second.clone()),
        ]);
        assert_eq!(outcome.records, vec![("indeed".to_string(), second)]);
        assert_eq!(outcome.duplicates.get("indeed"), Some(&1));
    }

    #[test]
    fn empty_batch() {
        let outcome = deduplicate(Vec::new());
        assert!(outcome.records.is_empty());
        assert!(outcome.duplicates.is_empty());
    }
}
