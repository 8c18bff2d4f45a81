//! Deterministic top-N counting.
//!
//! Ranking is count descending; equal counts keep the order in which each
//! key was first counted. Callers feed keys in timestamp order, so ties go to
//! whichever value showed up earliest.

use std::collections::HashMap;

use crate::types::ValueCount;

/// Count `keys` and return the `n` most frequent.
pub fn top_n<'a, I>(keys: I, n: usize) -> Vec<ValueCount>
where
  I: IntoIterator<Item = &'a str>,
{
  // key -> (count, first position)
  let mut counts: HashMap<&'a str, (u64, usize)> = HashMap::new();
  for (pos, key) in keys.into_iter().enumerate() {
    counts.entry(key).or_insert((0, pos)).0 += 1;
  }

  let mut ranked: Vec<(&str, u64, usize)> = counts
    .into_iter()
    .map(|(key, (count, first))| (key, count, first))
    .collect();
  ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
  ranked.truncate(n);

  ranked
    .into_iter()
    .map(|(key, count, _)| ValueCount {
      value: key.to_string(),
      count,
    })
    .collect()
}

/// Occurrences per key, no ordering implied.
pub fn totals<'a, I>(keys: I) -> HashMap<&'a str, u64>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut out: HashMap<&'a str, u64> = HashMap::new();
  for key in keys {
    *out.entry(key).or_insert(0) += 1;
  }
  out
}
