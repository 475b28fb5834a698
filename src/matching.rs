//! Edit distance between plate readings.
//!
//! Used for two things: deciding whether two entities are the same physical
//! plate read slightly differently, and ranking search results that are not
//! substring matches.

/// Levenshtein distance between `a` and `b`, counted in characters.
///
/// The table is `(|b|+1) x (|a|+1)`; row `i` walks `b` and column `j` walks `a`.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut tmp = vec![vec![0usize; a.len() + 1]; b.len() + 1];
    for (i, row) in tmp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=a.len() {
        tmp[0][j] = j;
    }

    for i in 1..=b.len() {
        for j in 1..=a.len() {
            let substitution = if a[j - 1] == b[i - 1] { 0 } else { 1 };
            tmp[i][j] = (tmp[i - 1][j] + 1)
                .min(tmp[i][j - 1] + 1)
                .min(tmp[i - 1][j - 1] + substitution);
        }
    }

    tmp[b.len()][a.len()]
}

/// Ranking key for a search candidate against an already lowercased query.
///
/// Substring hits sort before everything else, ordered by where the match
/// starts (in characters); the rest sort by edit distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SearchRank {
    Substring { position: usize },
    Distance { distance: usize },
}

impl SearchRank {
    /// The position counts characters of the original `candidate`, even when
    /// lowercasing expands a character (`İ` lowercases to two).
    pub fn of(candidate: &str, query_lower: &str) -> Self {
        let mut lowered = String::with_capacity(candidate.len());
        // byte offset in `lowered` where each original character starts
        let mut starts = Vec::with_capacity(candidate.len());
        for c in candidate.chars() {
            starts.push(lowered.len());
            lowered.extend(c.to_lowercase());
        }

        match lowered.find(query_lower) {
            Some(byte_idx) => SearchRank::Substring {
                position: starts.partition_point(|&start| start <= byte_idx).saturating_sub(1),
            },
            None => SearchRank::Distance {
                distance: levenshtein(&lowered, query_lower),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_distance() {
        for s in ["", "A", "AB123CD", "KA01AB1234"] {
            assert_eq!(levenshtein(s, s), 0);
        }
    }

    #[test]
    fn empty_string_distance_is_length() {
        assert_eq!(levenshtein("", "AB123"), 5);
        assert_eq!(levenshtein("AB123", ""), 5);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [("AB123", "AB124"), ("kitten", "sitting"), ("XYAB1Z", "AB1")];
        for (a, b) in pairs {
            assert_eq!(levenshtein(a, b), levenshtein(b, a), "{a} vs {b}");
        }
    }

    #[test]
    fn known_distances() {
        assert_eq!(levenshtein("AB123", "AB124"), 1);
        assert_eq!(levenshtein("AB123", "ZZ999"), 5);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("AB123", "AB1234"), 1);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(levenshtein("MÜ123", "MU123"), 1);
    }

    #[test]
    fn substring_ranks_before_distance() {
        let early = SearchRank::of("AB123", "ab1");
        let late = SearchRank::of("XYAB1Z", "ab1");
        let none = SearchRank::of("CC999", "ab1");

        assert_eq!(early, SearchRank::Substring { position: 0 });
        assert_eq!(late, SearchRank::Substring { position: 2 });
        assert!(matches!(none, SearchRank::Distance { .. }));
        assert!(early < late);
        assert!(late < none);
    }

    #[test]
    fn position_counts_original_characters() {
        assert_eq!(
            SearchRank::of("İAB1", "ab1"),
            SearchRank::Substring { position: 1 }
        );
        assert_eq!(
            SearchRank::of("XİİAB12", "ab1"),
            SearchRank::Substring { position: 3 }
        );
    }
}
