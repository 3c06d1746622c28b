mod test_pipeline;

use wavegraph_core::{Method, PixelKey, RunConfig, TemplateId, TimeFrequencyMap};

pub(crate) const SAMPLE_RATE: f64 = 1024.0;

/// Map over scales `min..=max` with 8 frequency rows and the given
/// `(scale, time, freq, value)` cells.
pub(crate) fn map(
    id: &str,
    min_scale: u32,
    max_scale: u32,
    cells: &[(u32, usize, usize, f64)],
) -> TimeFrequencyMap {
    let mut map = TimeFrequencyMap::zeros(
        TemplateId::new(id).unwrap(),
        SAMPLE_RATE,
        1.0,
        min_scale,
        max_scale,
        8,
    )
    .unwrap();
    for &(s, t, f, v) in cells {
        map.set(&PixelKey::new(s, t, f), v).unwrap();
    }
    map
}

/// Matching pursuit over scales 4..=6 with two time shifts.
pub(crate) fn config() -> RunConfig {
    let mut config = RunConfig::new(Method::MatchingPursuit, 1.0, 4, 6);
    config.num_time_shift = 2;
    config.approx_error = Some(0.01);
    config
}
