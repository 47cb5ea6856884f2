//! Property-based checks on the physical models and key statistics.

use proptest::prelude::*;
use qkd_sim::{
    Detector, DetectorConfig, Dps, OpticalChannel, PhotonSource, SessionDriver, SessionParams,
    calculate_qber, postprocess,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

proptest! {
    #[test]
    fn survival_probability_is_a_probability(distance in 0.0f64..2_000.0, attenuation in 0.0f64..2.0) {
        let channel = OpticalChannel::new(distance, attenuation).unwrap();
        let p = channel.survival_probability();
        prop_assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn channel_never_creates_photons(
        distance in 0.0f64..200.0,
        photons in 0u32..50,
        seed in any::<u64>(),
    ) {
        let channel = OpticalChannel::new(distance, 0.2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        prop_assert!(channel.transmit(photons, &mut rng) <= photons);
    }

    #[test]
    fn qber_is_a_fraction(
        pairs in prop::collection::vec(any::<(bool, bool)>(), 0..300),
        rate in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        let (alice, bob): (Vec<bool>, Vec<bool>) = pairs.into_iter().unzip();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let est = calculate_qber(&alice, &bob, rate, &mut rng).unwrap();
        prop_assert!((0.0..=1.0).contains(&est.qber));
        prop_assert!(est.errors <= est.sample_size);
        prop_assert!(est.sample_size <= alice.len());
    }

    #[test]
    fn final_key_shrinks_as_qber_grows(
        raw in 0usize..100_000,
        q1 in 0.0f64..=1.0,
        q2 in 0.0f64..=1.0,
    ) {
        let (low, high) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
        let at_low = postprocess(raw, low);
        let at_high = postprocess(raw, high);
        prop_assert!(at_high.final_key_length <= at_low.final_key_length);
        prop_assert!(at_low.final_key_length <= raw);
    }

    #[test]
    fn dps_key_is_bounded_by_pulse_pairs(
        num_pulses in 0usize..400,
        mu in 0.05f64..0.95,
        distance in 0.0f64..50.0,
        seed in any::<u64>(),
    ) {
        let source = PhotonSource::new(mu).unwrap();
        let channel = OpticalChannel::new(distance, 0.2).unwrap();
        let detector = Detector::new(&DetectorConfig::default()).unwrap();
        let driver = SessionDriver::new(&source, &channel, &detector);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let params = SessionParams { num_pulses, pulse_interval_ns: 1.0, phase_flip_prob: 0.0 };
        let outcome = driver.run(&Dps::new(), &params, &mut rng).unwrap();
        prop_assert!(outcome.key.len() <= num_pulses.saturating_sub(1));
        prop_assert_eq!(outcome.key.alice().len(), outcome.key.bob().len());
    }
}
