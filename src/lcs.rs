//! Longest-common-subsequence scoring between token sequences and templates.

use crate::registry::ClusterId;
use crate::template::Template;

/// Longest common subsequence of `seq1` and `seq2`, as elements of `seq1`.
///
/// Classic O(n·m) table. Backtracking walks from the end and, on ties, drops the
/// trailing element of `seq1` first, so equal inputs always yield the same alignment.
pub fn lcs<A, B>(seq1: &[A], seq2: &[B]) -> Vec<A>
where
    A: PartialEq<B> + Clone,
{
    let n = seq1.len();
    let m = seq2.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    // lengths[i][j] = LCS length of seq1[..i] and seq2[..j]
    let mut lengths = vec![vec![0usize; m + 1]; n + 1];
    for i in 0..n {
        for j in 0..m {
            lengths[i + 1][j + 1] = if seq1[i] == seq2[j] {
                lengths[i][j] + 1
            } else {
                lengths[i + 1][j].max(lengths[i][j + 1])
            };
        }
    }

    let mut result = Vec::with_capacity(lengths[n][m]);
    let (mut i, mut j) = (n, m);
    while i > 0 && j > 0 {
        if lengths[i][j] == lengths[i - 1][j] {
            i -= 1;
        } else if lengths[i][j] == lengths[i][j - 1] {
            j -= 1;
        } else {
            debug_assert!(seq1[i - 1] == seq2[j - 1]);
            result.push(seq1[i - 1].clone());
            i -= 1;
            j -= 1;
        }
    }
    result.reverse();
    result
}

/// Length of the LCS only; same table without the backtrack.
pub fn lcs_len<A, B>(seq1: &[A], seq2: &[B]) -> usize
where
    A: PartialEq<B>,
{
    if seq1.is_empty() || seq2.is_empty() {
        return 0;
    }
    // Two rolling rows are enough for the length.
    let mut prev = vec![0usize; seq2.len() + 1];
    let mut cur = vec![0usize; seq2.len() + 1];
    for a in seq1 {
        for (j, b) in seq2.iter().enumerate() {
            cur[j + 1] = if a == b { prev[j] + 1 } else { cur[j].max(prev[j + 1]) };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[seq2.len()]
}

/// Picks the candidate whose template shares the longest LCS with `seq`.
///
/// The winner must cover at least `tau * seq.len()` tokens. Ties keep the earliest
/// candidate in iteration order. Wildcards in a template never match a literal.
pub fn lcs_match<'a, I>(candidates: I, seq: &[String], tau: f64) -> Option<ClusterId>
where
    I: IntoIterator<Item = (ClusterId, &'a Template)>,
{
    let threshold = tau * seq.len() as f64;
    let mut best: Option<(ClusterId, usize)> = None;

    for (id, template) in candidates {
        let len = lcs_len(seq, template.tokens());
        let better = match best {
            Some((_, best_len)) => len > best_len,
            None => true,
        };
        if better {
            best = Some((id, len));
        }
    }

    best.filter(|(_, len)| *len as f64 >= threshold).map(|(id, _)| id)
}
