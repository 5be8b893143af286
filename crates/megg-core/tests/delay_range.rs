use megg_core::{BatchStats, DelayRange, EggQuality, EggSize};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

proptest! {
    #[test]
    fn test_sample_stays_in_range(min in 0.0f64..5.0, span in 0.0f64..5.0, seed in any::<u64>()) {
        let range = DelayRange::new(min, min + span);
        let mut rng = StdRng::seed_from_u64(seed);
        let secs = range.sample(&mut rng).as_secs_f64();
        prop_assert!(secs >= min - 1e-9);
        prop_assert!(secs <= min + span + 1e-9);
    }

    #[test]
    fn test_stats_totals_add_up(eggs in proptest::collection::vec((any::<bool>(), 0u8..3), 0..200)) {
        let mut stats = BatchStats::default();
        for (good, size) in &eggs {
            let quality = if *good { EggQuality::Good } else { EggQuality::Bad };
            let size = match size {
                0 => EggSize::Small,
                1 => EggSize::Medium,
                _ => EggSize::Large,
            };
            stats.record(quality, size);
        }
        prop_assert_eq!(stats.total_processed as usize, eggs.len());
        prop_assert_eq!(stats.good_eggs + stats.bad_eggs, stats.total_processed);
        prop_assert_eq!(stats.small_eggs + stats.medium_eggs + stats.large_eggs, stats.good_eggs);
    }
}
