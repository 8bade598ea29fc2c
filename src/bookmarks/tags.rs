use std::collections::{HashMap, HashSet};

use crate::model::{Bookmark, TagCount};

/// Trims and lower-cases tags, dropping blanks and repeats. First occurrence wins.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Tag usage across `bookmarks`, most used first. Ties keep first-seen order.
pub fn tag_counts(bookmarks: &[Bookmark]) -> Vec<TagCount> {
    let mut counts: Vec<TagCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for tag in bookmarks.iter().flat_map(|b| b.tags.iter()) {
        match index.get(tag.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(tag.as_str(), counts.len());
                counts.push(TagCount {
                    tag: tag.clone(),
                    count: 1,
                });
            }
        }
    }

    // stable
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn filter_by_tag(bookmarks: Vec<Bookmark>, tag: &str) -> Vec<Bookmark> {
    let tag = tag.trim().to_lowercase();
    bookmarks.into_iter().filter(|b| b.has_tag(&tag)).collect()
}
