//! Fold keyword occurrences into top-N lists ordered by count.

use std::collections::{BTreeSet, HashMap};

use crate::models::Keyword;

/// Fold identical words (case-insensitively) into single entries, summing
/// counts and unioning document sets, then keep the `top_n` by descending
/// count. Equal counts preserve first-seen order; items with an empty word
/// are skipped silently.
pub fn rank_by_count<I>(items: I, top_n: usize) -> Vec<Keyword>
where
    I: IntoIterator<Item = Keyword>,
{
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut folded: Vec<Keyword> = Vec::new();

    for item in items {
        let word = item.word.trim().to_lowercase();
        if word.is_empty() {
            continue;
        }
        match slots.get(&word) {
            Some(&i) => {
                folded[i].count += item.count;
                if let Some(docs) = item.documents {
                    folded[i]
                        .documents
                        .get_or_insert_with(BTreeSet::new)
                        .extend(docs);
                }
            }
            None => {
                slots.insert(word.clone(), folded.len());
                folded.push(Keyword {
                    word,
                    count: item.count,
                    score: None,
                    documents: item.documents,
                });
            }
        }
    }

    // Vec::sort_by is stable, so ties keep insertion order.
    folded.sort_by(|a, b| b.count.cmp(&a.count));
    folded.truncate(top_n);
    folded
}

/// Rank a bag of raw occurrence strings (each occurrence counts once).
pub fn rank_bag(words: &[String], top_n: usize) -> Vec<Keyword> {
    rank_by_count(words.iter().map(|w| Keyword::new(w.clone(), 1)), top_n)
}
