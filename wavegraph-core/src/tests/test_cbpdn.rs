use approx::assert_relative_eq;

use crate::cluster::{Method, StopReason};
use crate::dictionary::DictionaryKind;
use crate::error::WavegraphError;
use crate::pixel::PixelKey;
use crate::selector::*;
use crate::tests::map_with;

const SPIKES: [(u32, usize, usize, f64); 4] = [
    (4, 20, 2, 3.0),
    (5, 5, 4, -2.0),
    (6, 11, 1, 1.5),
    (6, 2, 7, -1.0),
];

fn value_at(cluster: &crate::cluster::Cluster, key: PixelKey) -> Option<f64> {
    cluster
        .pixels()
        .iter()
        .find(|p| p.key() == key)
        .map(|p| p.value)
}

#[test]
fn test_debiased_recovery_is_exact() {
    crate::init();
    let map = map_with("bank0", &SPIKES);
    let cluster = Cbpdn::default()
        .decompose(&map, &DecompositionContext::default())
        .unwrap();

    assert_eq!(cluster.method(), Method::Cbpdn);
    assert_eq!(cluster.len(), SPIKES.len());
    for &(s, t, f, v) in &SPIKES {
        let got = value_at(&cluster, PixelKey::new(s, t, f)).expect("spike in support");
        assert_relative_eq!(got, v, epsilon = 1e-9);
    }
    let d = cluster.diagnostics();
    assert_eq!(d.stop_reason, StopReason::Converged);
    assert!(d.converged);
    assert!(d.objective.is_some());
    assert!(d.residual_error < 1e-12);
}

#[test]
fn test_without_debias_values_are_shrunk() {
    let map = map_with("bank0", &SPIKES);
    let cluster = Cbpdn::default()
        .with_gamma(0.1)
        .with_debias(false)
        .decompose(&map, &DecompositionContext::default())
        .unwrap();

    for &(s, t, f, v) in &SPIKES {
        let got = value_at(&cluster, PixelKey::new(s, t, f)).expect("spike in support");
        assert_relative_eq!(got, v - 0.1 * v.signum(), epsilon = 1e-9);
    }
    // objective ½·4·0.1² + 0.1·(7.5 − 0.4)
    assert_relative_eq!(
        cluster.diagnostics().objective.unwrap(),
        0.02 + 0.71,
        epsilon = 1e-9
    );
}

#[test]
fn test_large_penalty_drops_weak_pixels() {
    let map = map_with("bank0", &[(4, 20, 2, 3.0), (5, 5, 4, 1.0)]);
    let cluster = Cbpdn::default()
        .with_gamma(1.5)
        .decompose(&map, &DecompositionContext::default())
        .unwrap();

    assert_eq!(cluster.len(), 1);
    assert_relative_eq!(
        value_at(&cluster, PixelKey::new(4, 20, 2)).unwrap(),
        3.0,
        epsilon = 1e-9
    );
    assert_relative_eq!(cluster.diagnostics().residual_error, 0.1, epsilon = 1e-9);
}

#[test]
fn test_tolerance_stop() {
    let map = map_with("bank0", &SPIKES);
    let cluster = Cbpdn::default()
        .with_approx_error(0.5)
        .decompose(&map, &DecompositionContext::default())
        .unwrap();
    assert_eq!(cluster.diagnostics().stop_reason, StopReason::ToleranceReached);
    assert_eq!(cluster.diagnostics().iterations, 1);
    assert_eq!(cluster.len(), SPIKES.len());
}

#[test]
fn test_zero_frequency_is_masked() {
    let map = map_with("bank0", &[(4, 3, 0, 9.0), (5, 4, 1, 2.0)]);
    let cluster = Cbpdn::default()
        .decompose(&map, &DecompositionContext::default())
        .unwrap();
    assert_eq!(cluster.len(), 1);
    assert!(cluster.contains(&PixelKey::new(5, 4, 1)));
}

#[test]
fn test_overlapping_dictionary_converges() {
    crate::init();
    let leak = 0.25;
    let map = map_with(
        "bank0",
        &[(5, 9, 4, leak), (5, 10, 4, 1.0), (5, 11, 4, leak)],
    );
    let ctx = DecompositionContext::default().with_dictionary(DictionaryKind::TimeLeakage { leak });
    let cluster = Cbpdn::default().with_gamma(0.01).decompose(&map, &ctx).unwrap();

    let strongest = cluster
        .pixels()
        .iter()
        .max_by(|a, b| a.value.abs().total_cmp(&b.value.abs()))
        .unwrap();
    assert_eq!(strongest.key(), PixelKey::new(5, 10, 4));
    assert_relative_eq!(strongest.value, 1.0, epsilon = 1e-4);
    assert!(cluster.diagnostics().converged);
    assert!(cluster.diagnostics().residual_error < 1e-6);
}

#[test]
fn test_parameter_validation() {
    let map = map_with("bank0", &SPIKES);
    let ctx = DecompositionContext::default();
    assert!(matches!(
        Cbpdn::default().with_gamma(-1.0).decompose(&map, &ctx),
        Err(WavegraphError::Configuration(_))
    ));
    assert!(matches!(
        Cbpdn::default().with_kappa(0.0).decompose(&map, &ctx),
        Err(WavegraphError::Configuration(_))
    ));
    assert!(matches!(
        Cbpdn::default().with_max_iterations(0).decompose(&map, &ctx),
        Err(WavegraphError::Configuration(_))
    ));
}
