//! Statistical properties of the reservoir sampling merge.

mod common;

use feldera_gla::{
    operator::{reservoir, Reservoir},
    Error, ReservoirConfig, Runtime, RuntimeConfig,
};

use common::{init_test_logger, split};

fn chi_square(observed: &[u64], expected: f64) -> f64 {
    observed
        .iter()
        .map(|o| {
            let diff = *o as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

#[test]
fn inclusion_is_uniform_across_partitions() {
    init_test_logger();

    const ITEMS: usize = 20;
    const SIZE: usize = 5;
    const TRIALS: u64 = 4000;

    let runtime = Runtime::with_workers(3).unwrap();
    let items: Vec<usize> = (0..ITEMS).collect();
    // One full, one partial and one full reservoir.
    let partitions = split(&items, &[7, 3]);

    let mut inclusions = vec![0u64; ITEMS];
    for seed in 0..TRIALS {
        let config = ReservoirConfig::new(SIZE).with_seed(seed);
        let sample = reservoir::run(&runtime, config, &partitions).unwrap();
        assert_eq!(sample.len(), SIZE);
        for item in sample {
            inclusions[item] += 1;
        }
    }

    // 19 degrees of freedom; p = 0.001 at 43.8.
    let expected = (TRIALS as usize * SIZE) as f64 / ITEMS as f64;
    let statistic = chi_square(&inclusions, expected);
    assert!(
        statistic < 43.8,
        "chi-square statistic {statistic} for inclusions {inclusions:?}"
    );
}

#[test]
fn inclusion_is_uniform_for_long_streams() {
    init_test_logger();

    // Long enough for the rejection-based skip estimator to take over.
    const ITEMS: usize = 600;
    const SIZE: usize = 3;
    const GROUPS: usize = 10;
    const TRIALS: u64 = 3000;

    let runtime = Runtime::new(RuntimeConfig {
        workers: 4,
        chunk_size: 64,
    })
    .unwrap();
    let items: Vec<usize> = (0..ITEMS).collect();
    let partitions = split(&items, &[250, 2, 100]);

    let mut inclusions = vec![0u64; GROUPS];
    for seed in 0..TRIALS {
        let config = ReservoirConfig::new(SIZE).with_seed(seed);
        for item in reservoir::run(&runtime, config, &partitions).unwrap() {
            inclusions[item * GROUPS / ITEMS] += 1;
        }
    }

    // 9 degrees of freedom; p = 0.001 at 27.9.
    let expected = (TRIALS as usize * SIZE) as f64 / GROUPS as f64;
    let statistic = chi_square(&inclusions, expected);
    assert!(
        statistic < 27.9,
        "chi-square statistic {statistic} for inclusions {inclusions:?}"
    );
}

#[test]
fn full_samples_replace_slots_proportionally() {
    init_test_logger();

    // A has seen 7 items, B exactly 3: every slot of A is replaced by the
    // corresponding slot of B with probability 3 / 10.
    const TRIALS: u64 = 5000;

    let mut replaced = [0u64; 3];
    for seed in 0..TRIALS {
        let config = ReservoirConfig::new(3).with_seed(seed);
        let mut a = Reservoir::new(&config, 0);
        (0..7).for_each(|item| a.insert(item));
        let mut b = Reservoir::new(&config, 1);
        (100..103).for_each(|item| b.insert(item));

        let before = a.items().to_vec();
        a.merge(b);
        assert_eq!(a.count(), 10);

        for slot in 0..3 {
            let item = *a.get_sample(slot).unwrap().unwrap();
            if item == 100 + slot {
                replaced[slot] += 1;
            } else {
                assert_eq!(item, before[slot]);
            }
        }
    }

    for count in replaced {
        let rate = count as f64 / TRIALS as f64;
        assert!((rate - 0.3).abs() < 0.03, "replacement rate {rate}");
    }
}

#[test]
fn capacity_is_enforced() {
    let config = ReservoirConfig::new(4).with_seed(1);
    let mut sample = Reservoir::new(&config, 0);
    (0..10).for_each(|item| sample.insert(item));

    assert!(sample.get_sample(3).unwrap().is_some());
    let error = sample.get_sample(4).unwrap_err();
    assert_eq!(error, Error::Capacity { index: 4, size: 4 });
}

#[test]
fn fewer_items_than_size() {
    let runtime = Runtime::with_workers(2).unwrap();
    let partitions = vec![vec!['a', 'b'], vec![], vec!['c']];
    let mut sample =
        reservoir::run(&runtime, ReservoirConfig::new(10).with_seed(5), &partitions).unwrap();
    sample.sort();
    assert_eq!(sample, vec!['a', 'b', 'c']);
}
