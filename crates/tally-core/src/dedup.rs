use crate::codes::name_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const EXACT_NAME_SIMILARITY: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatePair {
    pub sku_a_id: String,
    pub sku_b_id: String,
    pub similarity: f64,
}

/// Pairs every two SKUs whose names share a normalized key. Input is
/// `(id, name)`; buckets and pairs keep input order.
pub fn duplicate_pairs<'a, I>(skus: I) -> Vec<DuplicatePair>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut bucket_index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Vec<&'a str>> = Vec::new();

    for (id, name) in skus {
        let key = name_key(name);
        if key.is_empty() {
            continue;
        }
        let index = *bucket_index.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[index].push(id);
    }

    let mut pairs = Vec::new();
    for bucket in buckets.iter().filter(|bucket| bucket.len() >= 2) {
        for (i, first) in bucket.iter().enumerate() {
            for second in &bucket[i + 1..] {
                pairs.push(DuplicatePair {
                    sku_a_id: (*first).to_string(),
                    sku_b_id: (*second).to_string(),
                    similarity: EXACT_NAME_SIMILARITY,
                });
            }
        }
    }
    pairs
}
