// Stratified train / validation split
//
// Each class is sampled on its own so the train/valid class ratio matches the
// full manifest.  Sample counts use round-half-to-even, like pandas'
// `DataFrame.sample(frac=...)`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng, SeedableRng};

use crate::manifest::Record;

/// The two disjoint halves of the training manifest.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<Record>,
    pub valid: Vec<Record>,
}

/// Number of rows drawn into train from a class of `len` rows.
pub fn train_count(len: usize, fraction: f64) -> usize {
    let n = (fraction.clamp(0.0, 1.0) * len as f64).round_ties_even() as usize;
    n.min(len)
}

/// Split `records` into train/valid, stratified by label.
///
/// Uses a seeded `StdRng` when `seed` is given, otherwise the thread RNG.
/// `fraction` outside `[0, 1]` is clamped.
pub fn stratified_split(records: Vec<Record>, fraction: f64, seed: Option<u64>) -> Split {
    match seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            stratified_split_with(records, fraction, &mut rng)
        }
        None => {
            let mut rng = thread_rng();
            stratified_split_with(records, fraction, &mut rng)
        }
    }
}

/// [`stratified_split`] with a caller-provided RNG.
pub fn stratified_split_with<R: Rng + ?Sized>(
    records: Vec<Record>,
    fraction: f64,
    rng: &mut R,
) -> Split {
    let (positive, negative): (Vec<Record>, Vec<Record>) =
        records.into_iter().partition(Record::is_positive);

    let n_pos = positive.len();
    let n_neg = negative.len();

    let (mut train, mut valid) = sample_class(positive, fraction, rng);
    let (neg_train, neg_valid) = sample_class(negative, fraction, rng);

    tracing::debug!(
        positive = n_pos,
        negative = n_neg,
        positive_train = train.len(),
        negative_train = neg_train.len(),
        "stratified split per class"
    );

    train.extend(neg_train);
    valid.extend(neg_valid);
    train.shuffle(rng);
    valid.shuffle(rng);

    tracing::info!(train = train.len(), valid = valid.len(), "split manifest");
    Split { train, valid }
}

/// Uniformly sample `train_count` rows without replacement; the rest is valid.
fn sample_class<R: Rng + ?Sized>(
    mut rows: Vec<Record>,
    fraction: f64,
    rng: &mut R,
) -> (Vec<Record>, Vec<Record>) {
    let k = train_count(rows.len(), fraction);
    rows.shuffle(rng);
    let valid = rows.split_off(k);
    (rows, valid)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::manifest::{NEGATIVE, POSITIVE};

    fn manifest(pos: usize, neg: usize) -> Vec<Record> {
        let mut records = Vec::with_capacity(pos + neg);
        for i in 0..pos {
            records.push(Record::labeled(format!("pos_{i}"), POSITIVE));
        }
        for i in 0..neg {
            records.push(Record::labeled(format!("neg_{i}"), NEGATIVE));
        }
        records
    }

    fn count_pos(records: &[Record]) -> usize {
        records.iter().filter(|r| r.is_positive()).count()
    }

    #[test]
    fn ten_positive_ninety_negative() {
        let split = stratified_split(manifest(10, 90), 0.8, Some(7));
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.valid.len(), 20);
        assert_eq!(count_pos(&split.train), 8);
        assert_eq!(count_pos(&split.valid), 2);
    }

    #[test]
    fn disjoint_and_complete() {
        let all = manifest(13, 57);
        let split = stratified_split(all.clone(), 0.7, Some(1));

        let train: HashSet<&Record> = split.train.iter().collect();
        let valid: HashSet<&Record> = split.valid.iter().collect();
        assert!(train.is_disjoint(&valid));

        let union: HashSet<&Record> = train.union(&valid).copied().collect();
        let full: HashSet<&Record> = all.iter().collect();
        assert_eq!(union, full);
        assert_eq!(split.train.len() + split.valid.len(), all.len());
    }

    #[test]
    fn per_class_counts_follow_fraction() {
        for &(p, n, f) in &[(3usize, 17usize, 0.5f64), (1, 1, 0.25), (40, 9, 0.9)] {
            let split = stratified_split(manifest(p, n), f, None);
            assert_eq!(count_pos(&split.train), train_count(p, f));
            assert_eq!(split.train.len() - count_pos(&split.train), train_count(n, f));
        }
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(train_count(5, 0.5), 2);
        assert_eq!(train_count(7, 0.5), 4);
        assert_eq!(train_count(10, 0.8), 8);
        assert_eq!(train_count(0, 0.8), 0);
    }

    #[test]
    fn fraction_edges_do_not_error() {
        let split = stratified_split(manifest(4, 6), 0.0, Some(3));
        assert!(split.train.is_empty());
        assert_eq!(split.valid.len(), 10);

        let split = stratified_split(manifest(4, 6), 1.0, Some(3));
        assert_eq!(split.train.len(), 10);
        assert!(split.valid.is_empty());
    }

    #[test]
    fn empty_class_contributes_nothing() {
        let split = stratified_split(manifest(0, 20), 0.8, Some(5));
        assert_eq!(split.train.len(), 16);
        assert_eq!(count_pos(&split.train), 0);
        assert_eq!(count_pos(&split.valid), 0);
    }

    #[test]
    fn seeded_split_is_reproducible() {
        let a = stratified_split(manifest(10, 30), 0.8, Some(123));
        let b = stratified_split(manifest(10, 30), 0.8, Some(123));
        assert_eq!(a.train, b.train);
        assert_eq!(a.valid, b.valid);
    }
}
