//! Merging raw entities from several strategies and the final re-score.

use querylens_core::{Entity, ExtractionMethod};
use std::collections::{BTreeSet, HashMap};

/// Confidence gained per additional corroborating strategy.
const CORROBORATION_BOOST: f64 = 0.10;
const MERGED_CAP: f64 = 0.98;

/// Group by lower-cased (name, type) and keep one entity per group.
///
/// The survivor is the highest-confidence member (ties: more reliable
/// method). It gains 10% per strategy it did not already carry in
/// `confirmed_by`, so merging an already merged list changes nothing.
pub fn merge_entities(raw: Vec<Entity>) -> Vec<Entity> {
    let mut order: Vec<(String, querylens_core::EntityType)> = Vec::new();
    let mut groups: HashMap<(String, querylens_core::EntityType), Vec<Entity>> = HashMap::new();
    for entity in raw {
        let key = entity.key();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(entity);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .filter_map(merge_group)
        .collect()
}

fn merge_group(members: Vec<Entity>) -> Option<Entity> {
    let methods: BTreeSet<ExtractionMethod> = members
        .iter()
        .flat_map(|e| e.confirmed_by.iter().copied().chain([e.extraction_method]))
        .collect();
    let mapped_table = members.iter().find_map(|e| e.mapped_table.clone());
    let mapped_column = members.iter().find_map(|e| e.mapped_column.clone());

    let mut best = members.into_iter().max_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            .then_with(|| {
                a.extraction_method
                    .reliability()
                    .total_cmp(&b.extraction_method.reliability())
            })
            .then_with(|| b.position.cmp(&a.position))
    })?;

    let own: BTreeSet<ExtractionMethod> = best
        .confirmed_by
        .iter()
        .copied()
        .chain([best.extraction_method])
        .collect();
    let additional = methods.difference(&own).count();
    if additional > 0 {
        best.confidence =
            (best.confidence * (1.0 + CORROBORATION_BOOST * additional as f64)).min(MERGED_CAP);
    }

    best.confirmed_by = methods.into_iter().collect();
    best.mapped_table = best.mapped_table.or(mapped_table);
    best.mapped_column = best.mapped_column.or(mapped_column);
    Some(best)
}

/// `confidence x (0.5 x position + 0.2 x length + 0.3 x reliability)`.
pub fn rescore(entity: &Entity, word_count: usize) -> f64 {
    let position_factor = if word_count > 1 {
        1.0 - 0.3 * (entity.position.min(word_count - 1) as f64 / (word_count - 1) as f64)
    } else {
        1.0
    };
    let name_len = entity.name.chars().count();
    let length_factor = if (2..=15).contains(&name_len) { 1.0 } else { 0.8 };
    let reliability = entity.extraction_method.reliability();

    (entity.confidence * (0.5 * position_factor + 0.2 * length_factor + 0.3 * reliability))
        .clamp(0.0, 1.0)
}

/// Descending confidence, then position, then name.
pub fn sort_entities(entities: &mut [Entity]) {
    entities.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use querylens_core::EntityType;

    fn e(name: &str, t: EntityType, pos: usize, conf: f64, m: ExtractionMethod) -> Entity {
        Entity::new(name, t, name, pos, conf, m)
    }

    #[test]
    fn corroboration_boosts_best_member() {
        let merged = merge_entities(vec![
            e("deposit", EntityType::Metric, 4, 0.7, ExtractionMethod::Pattern),
            e("Deposit", EntityType::Metric, 4, 0.9, ExtractionMethod::BusinessTerm),
            e("deposit", EntityType::Metric, 4, 0.7, ExtractionMethod::Pattern),
        ]);
        assert_eq!(merged.len(), 1);
        let d = &merged[0];
        assert_eq!(d.name, "Deposit");
        assert_eq!(d.extraction_method, ExtractionMethod::BusinessTerm);
        assert!((d.confidence - 0.99_f64.min(MERGED_CAP)).abs() < 1e-9);
        assert_eq!(
            d.confirmed_by,
            vec![ExtractionMethod::BusinessTerm, ExtractionMethod::Pattern]
        );
    }

    #[test]
    fn different_types_stay_separate() {
        let merged = merge_entities(vec![
            e("players", EntityType::Table, 8, 0.9, ExtractionMethod::BusinessTerm),
            e("players", EntityType::Dimension, 8, 0.6, ExtractionMethod::Contextual),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].entity_type, EntityType::Table);
    }

    #[test]
    fn tie_prefers_more_reliable_method() {
        let merged = merge_entities(vec![
            e("uk", EntityType::Dimension, 7, 0.8, ExtractionMethod::Contextual),
            e("uk", EntityType::Dimension, 7, 0.8, ExtractionMethod::Ai),
        ]);
        assert_eq!(merged[0].extraction_method, ExtractionMethod::Ai);
        assert!((merged[0].confidence - 0.88).abs() < 1e-9);
    }

    #[test]
    fn merge_is_idempotent() {
        let once = merge_entities(vec![
            e("deposit", EntityType::Metric, 4, 0.7, ExtractionMethod::Pattern),
            e("deposit", EntityType::Metric, 4, 0.9, ExtractionMethod::BusinessTerm),
            e("uk", EntityType::Dimension, 7, 0.9, ExtractionMethod::BusinessTerm),
        ]);
        let twice = merge_entities(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn mapping_survives_merge() {
        let mut linked = e("deposit", EntityType::Metric, 4, 0.7, ExtractionMethod::Pattern);
        linked.mapped_table = Some("deposits".into());
        let merged = merge_entities(vec![
            linked,
            e("deposit", EntityType::Metric, 4, 0.9, ExtractionMethod::BusinessTerm),
        ]);
        assert_eq!(merged[0].mapped_table.as_deref(), Some("deposits"));
    }

    #[test]
    fn rescore_penalizes_trailing_position() {
        let early = e("deposit", EntityType::Metric, 0, 0.9, ExtractionMethod::BusinessTerm);
        let late = e("deposit", EntityType::Metric, 10, 0.9, ExtractionMethod::BusinessTerm);
        assert!((rescore(&early, 11) - 0.9).abs() < 1e-9);
        assert!((rescore(&late, 11) - 0.9 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn rescore_length_and_reliability() {
        let long = e("an_extremely_long_name", EntityType::Column, 0, 1.0, ExtractionMethod::Contextual);
        // 0.5 + 0.2 x 0.8 + 0.3 x 0.8
        assert!((rescore(&long, 1) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn sorting_is_total() {
        let mut list = vec![
            e("b", EntityType::Metric, 2, 0.8, ExtractionMethod::Pattern),
            e("a", EntityType::Metric, 2, 0.8, ExtractionMethod::Pattern),
            e("c", EntityType::Metric, 1, 0.8, ExtractionMethod::Pattern),
            e("d", EntityType::Metric, 5, 0.9, ExtractionMethod::Pattern),
        ];
        sort_entities(&mut list);
        let names: Vec<_> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["d", "c", "a", "b"]);
    }
}
