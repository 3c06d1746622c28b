use std::cmp::Ordering;

use approx::assert_relative_eq;

use crate::error::WavegraphError;
use crate::pixel::*;

#[test]
fn test_default_ordering_is_frequency_major() {
    let ordering = PixelOrdering::default();
    assert_eq!(ordering.axes(), &[Axis::Frequency, Axis::Time, Axis::Scale]);

    let low_freq_late = PixelKey::new(4, 50, 1);
    let high_freq_early = PixelKey::new(4, 2, 3);
    assert_eq!(
        ordering.compare(&low_freq_late, &high_freq_early),
        Ordering::Less,
        "frequency decides before time"
    );
}

#[test]
fn test_partial_ordering_is_completed() {
    let ordering = PixelOrdering::parse(&["time"]).unwrap();
    assert_eq!(ordering.axes(), &[Axis::Time, Axis::Frequency, Axis::Scale]);

    let a = PixelKey::new(5, 3, 7);
    let b = PixelKey::new(4, 3, 7);
    // time and frequency equal, scale breaks the tie
    assert_eq!(ordering.compare(&b, &a), Ordering::Less);
}

#[test]
fn test_ordering_rejects_unknown_and_repeated_axes() {
    assert!(matches!(
        PixelOrdering::parse(&["frequency", "phase"]),
        Err(WavegraphError::Configuration(_))
    ));
    assert!(matches!(
        PixelOrdering::parse(&["time", "time_index"]),
        Err(WavegraphError::Configuration(_))
    ));
}

#[test]
fn test_ordering_from_string_and_aliases() {
    let joined: PixelOrdering = "freq_index, time_index".parse().unwrap();
    let listed = PixelOrdering::parse(&["frequency", "time"]).unwrap();
    assert_eq!(joined, listed);
    assert_eq!(joined.to_string(), "frequency,time,scale");
}

#[test]
fn test_ordering_serde_accepts_list_and_string() {
    let from_list: PixelOrdering = serde_json::from_str(r#"["time", "frequency"]"#).unwrap();
    let from_str: PixelOrdering = serde_json::from_str(r#""time,frequency""#).unwrap();
    assert_eq!(from_list, from_str);

    let json = serde_json::to_string(&from_list).unwrap();
    assert_eq!(json, r#"["time","frequency","scale"]"#);
    assert!(serde_json::from_str::<PixelOrdering>(r#"["bogus"]"#).is_err());
}

#[test]
fn test_sort_is_total_and_reproducible() {
    let mk = |scale, time, freq| Pixel {
        scale,
        time,
        freq,
        value: 1.0,
        amplitude: 0.0,
    };
    let mut a = vec![mk(6, 1, 2), mk(4, 9, 1), mk(5, 0, 2), mk(4, 3, 2)];
    let mut b: Vec<Pixel> = a.iter().rev().cloned().collect();
    let ordering = PixelOrdering::default();
    ordering.sort(&mut a);
    ordering.sort(&mut b);
    assert_eq!(a, b);
    let keys: Vec<PixelKey> = a.iter().map(|p| p.key()).collect();
    assert_eq!(
        keys,
        vec![
            PixelKey::new(4, 9, 1),
            PixelKey::new(5, 0, 2),
            PixelKey::new(6, 1, 2),
            PixelKey::new(4, 3, 2),
        ]
    );
}

#[test]
fn test_amplitudes_are_l2_normalised() {
    let mut pixels: Vec<Pixel> = [3.0, -4.0]
        .iter()
        .enumerate()
        .map(|(i, &value)| Pixel {
            scale: 4,
            time: i,
            freq: 1,
            value,
            amplitude: 0.0,
        })
        .collect();
    normalise_amplitudes(&mut pixels);
    assert_relative_eq!(pixels[0].amplitude, 0.6, epsilon = 1e-12);
    assert_relative_eq!(pixels[1].amplitude, 0.8, epsilon = 1e-12);

    let mut zeros = vec![Pixel {
        scale: 4,
        time: 0,
        freq: 1,
        value: 0.0,
        amplitude: 1.0,
    }];
    normalise_amplitudes(&mut zeros);
    assert_eq!(zeros[0].amplitude, 0.0);
}
