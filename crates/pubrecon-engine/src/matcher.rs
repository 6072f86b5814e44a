//! Tiered "same publication?" check for titles that never share a stable key.

use std::collections::HashSet;

use pubrecon_core::{MatchDecision, MatchTier};

use crate::text::normalize;

/// Titles must be longer than this (in characters, after normalization) before
/// substring containment counts as a match.
const SUBSTRING_MIN_CHARS: usize = 15;
const TOKEN_OVERLAP_MIN: f64 = 0.8;

pub const DEFAULT_THRESHOLD: f64 = 0.85;
pub const THESIS_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct TitleMatcher {
    threshold: f64,
}

impl Default for TitleMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl TitleMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_match(&self, a: &str, b: &str) -> bool {
        self.tier(a, b) != MatchTier::NoMatch
    }

    pub fn decide(&self, a: &str, b: &str) -> MatchDecision {
        let tier = self.tier(a, b);
        MatchDecision {
            left: a.to_string(),
            right: b.to_string(),
            matched: tier != MatchTier::NoMatch,
            tier,
        }
    }

    fn tier(&self, a: &str, b: &str) -> MatchTier {
        let na = normalize(a);
        let nb = normalize(b);
        if na.is_empty() || nb.is_empty() {
            return MatchTier::NoMatch;
        }
        if na == nb {
            return MatchTier::Exact;
        }
        if na.chars().count() > SUBSTRING_MIN_CHARS
            && nb.chars().count() > SUBSTRING_MIN_CHARS
            && (na.contains(&nb) || nb.contains(&na))
        {
            return MatchTier::Substring;
        }
        if token_overlap(&na, &nb) > TOKEN_OVERLAP_MIN {
            return MatchTier::TokenSet;
        }
        if similarity_ratio(&na, &nb) > self.threshold {
            return MatchTier::FuzzyRatio;
        }
        MatchTier::NoMatch
    }
}

/// `is_match` with an explicit threshold.
pub fn is_match(a: &str, b: &str, threshold: f64) -> bool {
    TitleMatcher::new(threshold).is_match(a, b)
}

/// `|A ∩ B| / min(|A|, |B|)` over whitespace tokens.
fn token_overlap(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split(' ').collect();
    let tb: HashSet<&str> = b.split(' ').collect();
    let smaller = ta.len().min(tb.len());
    if smaller == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / smaller as f64
}

/// Ratcliff/Obershelp ratio `2·M / (|a| + |b|)` where `M` is the total size of the
/// matching blocks found by recursively taking the longest common substring.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut matched = 0usize;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_common_block(&a, &b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }

    2.0 * matched as f64 / total as f64
}

/// Longest common substring of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
/// Ties go to the block that starts earliest in `a`, then in `b`.
fn longest_common_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo + 1;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width];
    let mut cur = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[col - 1] + 1;
                cur[col] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                cur[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}
