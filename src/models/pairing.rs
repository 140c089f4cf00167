//! Pairing strategy for adversarial domain training.
//!
//! A second view of the batch is produced by permuting only the back half
//! of the batch order; the front half stays in place so the label/domain
//! balance of the pairs is preserved. Each pair `(i, order[i])` gets a
//! same-domain indicator consumed by the contrastive loss.
//!
//! Both functions are pure and take the random source as an argument, so
//! a seeded `StdRng` makes the pairing fully reproducible.

use rand::seq::SliceRandom;
use rand::Rng;

/// Produce the paired batch order: positions `0..n/2` are the identity,
/// positions `n/2..n` are a shuffle of the indices `n/2..n`.
pub fn pairing_order<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let half = n / 2;
    order[half..].shuffle(rng);
    order
}

/// Same-domain indicator per pair: `1.0` iff `domains[i] == domains[order[i]]`.
pub fn pairing_labels(domains: &[u32], order: &[usize]) -> Vec<f32> {
    order
        .iter()
        .enumerate()
        .map(|(i, &p)| if domains[i] == domains[p] { 1.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn front_half_is_never_disturbed() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [1usize, 2, 4, 7, 16, 33] {
            let order = pairing_order(n, &mut rng);
            let half = n / 2;
            for i in 0..half {
                assert_eq!(order[i], i, "n={n}: front half moved at {i}");
            }
        }
    }

    #[test]
    fn order_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in [1usize, 2, 5, 16, 64] {
            let mut order = pairing_order(n, &mut rng);
            order.sort_unstable();
            let expected: Vec<usize> = (0..n).collect();
            assert_eq!(order, expected, "n={n}: not a permutation");
        }
    }

    #[test]
    fn back_half_only_contains_back_indices() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 16;
        let order = pairing_order(n, &mut rng);
        for &p in &order[n / 2..] {
            assert!(p >= n / 2, "back half drew front index {p}");
        }
    }

    #[test]
    fn seeded_pairing_is_reproducible() {
        let a = pairing_order(32, &mut StdRng::seed_from_u64(99));
        let b = pairing_order(32, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn labels_match_domain_equality() {
        let domains = [0u32, 0, 1, 2, 1, 2];
        let order = [0usize, 1, 2, 5, 4, 3];
        let labels = pairing_labels(&domains, &order);
        for (i, &p) in order.iter().enumerate() {
            let expected = if domains[i] == domains[p] { 1.0 } else { 0.0 };
            assert_eq!(labels[i], expected, "pair ({i}, {p})");
        }
        // Spot checks: identity pairs are same-domain by construction.
        assert_eq!(labels[0], 1.0);
        assert_eq!(labels[1], 1.0);
        // (3, 5): domains 2 == 2.
        assert_eq!(labels[3], 1.0);
        // (5, 3): symmetric same-domain pair.
        assert_eq!(labels[5], 1.0);
    }

    #[test]
    fn different_domains_get_zero_label() {
        let domains = [0u32, 1];
        let labels = pairing_labels(&domains, &[1, 0]);
        assert_eq!(labels, vec![0.0, 0.0]);
    }
}
