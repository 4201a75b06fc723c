use pasture_lens::narrator::{build_trace, Direction};
use pasture_lens::{presentation_order, sigmoid, Locale, Narrator, PastureError};

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("feature_{}", i)).collect()
}

/// Deterministic pseudo-random contributions in [-3, 3).
fn contributions(seed: u64, n: usize) -> Vec<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 6.0 - 3.0
        })
        .collect()
}

#[test]
fn test_sentence_count_and_endpoints() {
    let narrator = Narrator::default();
    for n in [0usize, 1, 5, 12] {
        let c = contributions(n as u64, n);
        let baseline = -0.4;
        let order = presentation_order(&c);
        let final_p = sigmoid(baseline + c.iter().sum::<f64>());
        let narrative = narrator.narrate(&names(n), &c, baseline, final_p, &order).unwrap();

        assert_eq!(narrative.sentences.len(), n + 2);
        assert_eq!(narrative.trace.steps.len(), n + 1);
        assert_eq!(narrative.trace.steps[0].log_odds, baseline);
        assert!((narrative.trace.final_log_odds() - (baseline + c.iter().sum::<f64>())).abs() < 1e-9);
    }
}

#[test]
fn test_running_probability_moves_with_contribution_sign() {
    for seed in 0..20u64 {
        let c = contributions(seed, 8);
        let trace = build_trace(&c, 0.3, &presentation_order(&c)).unwrap();
        for pair in trace.steps.windows(2) {
            let i = pair[1].feature.unwrap();
            if c[i] > 0.0 {
                assert!(pair[1].probability >= pair[0].probability);
            } else if c[i] < 0.0 {
                assert!(pair[1].probability <= pair[0].probability);
            }
        }
    }
}

#[test]
fn test_order_is_ascending_magnitude_and_stable() {
    let c = vec![0.5, -0.1, -0.5, 0.1, 0.0, 2.0];
    assert_eq!(presentation_order(&c), vec![4, 1, 3, 0, 2, 5]);

    for seed in 0..10u64 {
        let c = contributions(seed, 15);
        let order = presentation_order(&c);
        let mut seen = order.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..15).collect::<Vec<_>>());
        for pair in order.windows(2) {
            assert!(c[pair[0]].abs() <= c[pair[1]].abs());
        }
    }
}

#[test]
fn test_direction_words() {
    assert_eq!(Direction::of(0.2).word(Locale::English), "increased");
    assert_eq!(Direction::of(-0.2).word(Locale::English), "decreased");
    assert_eq!(Direction::of(0.0).word(Locale::English), "decreased");
    assert_eq!(Direction::of(0.2).word(Locale::Portuguese), "aumentou");
    assert_eq!(Direction::of(-0.2).word(Locale::Portuguese), "diminuiu");
}

#[test]
fn test_rejects_inconsistent_input_without_output() {
    let narrator = Narrator::default();
    let c = vec![0.2, -0.3];
    let order = presentation_order(&c);
    let p = sigmoid(0.1 + 0.2 - 0.3);

    assert!(matches!(
        narrator.narrate(&names(3), &c, 0.1, p, &order),
        Err(PastureError::LengthMismatch { .. })
    ));
    assert!(matches!(
        narrator.narrate(&names(2), &c, 0.1, 0.9, &order),
        Err(PastureError::ProbabilityMismatch { .. })
    ));
    assert!(matches!(
        narrator.narrate(&names(2), &c, 0.1, p, &[0, 0]),
        Err(PastureError::InvalidOrder(_))
    ));
    assert!(matches!(
        narrator.narrate(&names(2), &[f64::NAN, 0.1], 0.1, p, &order),
        Err(PastureError::NonFinite(_))
    ));
}

#[test]
fn test_extreme_log_odds_stay_in_open_interval() {
    let narrator = Narrator::default();
    let c = vec![400.0, 350.0];
    let order = presentation_order(&c);
    let narrative = narrator
        .narrate(&names(2), &c, 10.0, sigmoid(760.0), &order)
        .unwrap();
    for step in &narrative.trace.steps {
        assert!(step.probability > 0.0 && step.probability < 1.0);
    }
    assert!(narrative.to_string().ends_with("is 100.00%."));
}
