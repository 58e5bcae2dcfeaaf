//! Linear-time suffix array construction (SA-IS).
//!
//! The public entry point appends a virtual sentinel (smallest character)
//! and runs the induced-sorting recursion: classify suffixes as L/S, seed
//! the LMS positions, induce L then S, name the sorted LMS substrings, and
//! recurse on the reduced string while names collide.

const EMPTY: u32 = u32::MAX;

/// Suffix array of `data`: the starting positions of all suffixes in
/// lexicographic order.
pub fn suffix_array(data: &[u8]) -> Vec<u32> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    // Shift the alphabet up and terminate with a unique smallest sentinel.
    let mut s: Vec<u32> = Vec::with_capacity(n + 1);
    s.extend(data.iter().map(|&b| u32::from(b) + 1));
    s.push(0);

    let mut sa = vec![EMPTY; n + 1];
    sais(&s, 257, &mut sa);

    // Drop the sentinel suffix, always first.
    sa.remove(0);
    sa
}

/// Core recursion. `s` ends with a unique smallest sentinel 0.
fn sais(s: &[u32], alphabet_size: usize, sa: &mut [u32]) {
    let n = s.len();
    debug_assert_eq!(n, sa.len());
    if n == 1 {
        sa[0] = 0;
        return;
    }
    if n == 2 {
        sa[0] = 1;
        sa[1] = 0;
        return;
    }

    // Suffix types: true = S, false = L. The sentinel is S.
    let mut is_s = vec![false; n];
    is_s[n - 1] = true;
    for i in (0..n - 1).rev() {
        is_s[i] = s[i] < s[i + 1] || (s[i] == s[i + 1] && is_s[i + 1]);
    }
    let is_lms = |i: usize| i > 0 && is_s[i] && !is_s[i - 1];

    let mut buckets = vec![0u32; alphabet_size];
    for &c in s {
        buckets[c as usize] += 1;
    }

    let bucket_heads = |buckets: &[u32]| {
        let mut heads = vec![0u32; alphabet_size];
        let mut sum = 0u32;
        for (c, &count) in buckets.iter().enumerate() {
            heads[c] = sum;
            sum += count;
        }
        heads
    };
    let bucket_tails = |buckets: &[u32]| {
        let mut tails = vec![0u32; alphabet_size];
        let mut sum = 0u32;
        for (c, &count) in buckets.iter().enumerate() {
            sum += count;
            tails[c] = sum;
        }
        tails
    };

    let induce = |sa: &mut [u32]| {
        // Induce L suffixes left to right.
        let mut heads = bucket_heads(&buckets);
        for j in 0..n {
            let v = sa[j];
            if v != EMPTY && v > 0 {
                let i = v as usize - 1;
                if !is_s[i] {
                    let c = s[i] as usize;
                    sa[heads[c] as usize] = i as u32;
                    heads[c] += 1;
                }
            }
        }
        // Induce S suffixes right to left.
        let mut tails = bucket_tails(&buckets);
        for j in (0..n).rev() {
            let v = sa[j];
            if v != EMPTY && v > 0 {
                let i = v as usize - 1;
                if is_s[i] {
                    let c = s[i] as usize;
                    tails[c] -= 1;
                    sa[tails[c] as usize] = i as u32;
                }
            }
        }
    };

    // Pass 1: seed LMS positions at their bucket tails, then induce to sort
    // the LMS substrings.
    sa.fill(EMPTY);
    let mut tails = bucket_tails(&buckets);
    let lms_positions: Vec<u32> = (1..n).filter(|&i| is_lms(i)).map(|i| i as u32).collect();
    for &p in &lms_positions {
        let c = s[p as usize] as usize;
        tails[c] -= 1;
        sa[tails[c] as usize] = p;
    }
    induce(sa);

    // Collect LMS suffixes in their induced order and name the substrings.
    let m = lms_positions.len();
    let sorted_lms: Vec<u32> = sa
        .iter()
        .copied()
        .filter(|&v| v != EMPTY && v > 0 && is_lms(v as usize))
        .collect();
    debug_assert_eq!(sorted_lms.len(), m);

    let lms_equal = |a: usize, b: usize| -> bool {
        // Compare two LMS substrings, end markers included.
        let mut d = 0usize;
        loop {
            if s[a + d] != s[b + d] || is_lms(a + d) != is_lms(b + d) {
                return false;
            }
            if d > 0 && is_lms(a + d) {
                return true;
            }
            d += 1;
            if a + d >= n || b + d >= n {
                return false;
            }
        }
    };

    // names[i] = rank of the LMS substring starting at text position i.
    let mut names = vec![EMPTY; n];
    let mut name = 0u32;
    let mut previous = sorted_lms[0] as usize;
    names[previous] = 0;
    for &v in &sorted_lms[1..] {
        let current = v as usize;
        if !lms_equal(previous, current) {
            name += 1;
        }
        names[current] = name;
        previous = current;
    }
    let name_count = name as usize + 1;

    // Order LMS suffixes: either names are already unique, or recurse on
    // the reduced string (its sentinel is the text sentinel's LMS, name 0).
    let mut lms_order = vec![EMPTY; m];
    if name_count == m {
        for (rank, &v) in sorted_lms.iter().enumerate() {
            lms_order[rank] = v;
        }
    } else {
        let reduced: Vec<u32> = lms_positions
            .iter()
            .map(|&p| names[p as usize])
            .collect();
        let mut reduced_sa = vec![EMPTY; m];
        sais(&reduced, name_count, &mut reduced_sa);
        for (rank, &idx) in reduced_sa.iter().enumerate() {
            lms_order[rank] = lms_positions[idx as usize];
        }
    }

    // Pass 2: seed the now fully sorted LMS suffixes and induce the final
    // order. Seeding runs backward so tail decrements line up.
    sa.fill(EMPTY);
    let mut tails = bucket_tails(&buckets);
    for &p in lms_order.iter().rev() {
        let c = s[p as usize] as usize;
        tails[c] -= 1;
        sa[tails[c] as usize] = p;
    }
    induce(sa);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn naive_suffix_array(data: &[u8]) -> Vec<u32> {
        let mut sa: Vec<u32> = (0..data.len() as u32).collect();
        sa.sort_by(|&a, &b| data[a as usize..].cmp(&data[b as usize..]));
        sa
    }

    fn check(data: &[u8]) {
        assert_eq!(suffix_array(data), naive_suffix_array(data), "{data:?}");
    }

    #[test]
    fn test_empty_and_tiny() {
        assert!(suffix_array(b"").is_empty());
        assert_eq!(suffix_array(b"a"), vec![0]);
        check(b"ab");
        check(b"ba");
        check(b"aa");
    }

    #[test]
    fn test_classic_strings() {
        check(b"banana");
        check(b"mississippi");
        check(b"abracadabra");
        check(b"aaaaaaaaaa");
        check(b"abababab");
        check(b"cbacbacba");
    }

    #[test]
    fn test_mississippi_order() {
        assert_eq!(
            suffix_array(b"mississippi"),
            vec![10, 7, 4, 1, 0, 9, 8, 6, 3, 5, 2]
        );
    }

    #[test]
    fn test_binary_alphabet() {
        let mut rng = ChaCha8Rng::seed_from_u64(53);
        for len in [3usize, 17, 64, 257, 1000] {
            let data: Vec<u8> = (0..len).map(|_| rng.gen_range(0..2u8)).collect();
            check(&data);
        }
    }

    #[test]
    fn test_random_bytes() {
        let mut rng = ChaCha8Rng::seed_from_u64(59);
        for len in [5usize, 100, 1024, 5000] {
            let data: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            check(&data);
        }
    }

    #[test]
    fn test_includes_zero_bytes() {
        check(b"\x00abc\x00abc\x00");
        let mut rng = ChaCha8Rng::seed_from_u64(61);
        let data: Vec<u8> = (0..2000).map(|_| rng.gen_range(0..4u8)).collect();
        check(&data);
    }
}
