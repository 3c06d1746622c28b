mod test_cbpdn;
mod test_graph;
mod test_pixel;
mod test_pixelgraph;

use crate::cluster::{Cluster, ClusterMeta, Diagnostics, Method, StopReason};
use crate::pixel::{Pixel, PixelKey, PixelOrdering};
use crate::template::{Alignment, TemplateId};
use crate::tfmap::TimeFrequencyMap;

pub(crate) const SAMPLE_RATE: f64 = 1024.0;
pub(crate) const DURATION: f64 = 1.0;
pub(crate) const MIN_SCALE: u32 = 4;
pub(crate) const MAX_SCALE: u32 = 6;
pub(crate) const N_FREQ: usize = 8;

pub(crate) fn template(id: &str) -> TemplateId {
    TemplateId::new(id).unwrap()
}

/// Zero map over scales 4..=6 (64, 32 and 16 time bins), 8 frequency rows.
pub(crate) fn empty_map(id: &str) -> TimeFrequencyMap {
    TimeFrequencyMap::zeros(template(id), SAMPLE_RATE, DURATION, MIN_SCALE, MAX_SCALE, N_FREQ)
        .unwrap()
}

/// Map with the given `(scale, time, freq, value)` coefficients set.
pub(crate) fn map_with(id: &str, cells: &[(u32, usize, usize, f64)]) -> TimeFrequencyMap {
    let mut map = empty_map(id);
    for &(s, t, f, v) in cells {
        map.set(&PixelKey::new(s, t, f), v).unwrap();
    }
    map
}

pub(crate) fn meta(id: &str, shift: usize) -> ClusterMeta {
    ClusterMeta {
        template: template(id),
        time_shift: shift,
        method: Method::MatchingPursuit,
        sample_rate: SAMPLE_RATE,
        segment_duration: DURATION,
        min_scale: MIN_SCALE,
        max_scale: MAX_SCALE,
        alignment: Alignment::Right,
        reject_zero_freq: true,
        ordering: PixelOrdering::default(),
    }
}

/// Cluster built directly from `(scale, time, freq, value)` cells.
pub(crate) fn cluster(id: &str, shift: usize, cells: &[(u32, usize, usize, f64)]) -> Cluster {
    let pixels = cells
        .iter()
        .map(|&(scale, time, freq, value)| Pixel {
            scale,
            time,
            freq,
            value,
            amplitude: 0.0,
        })
        .collect();
    Cluster::new(
        meta(id, shift),
        pixels,
        Diagnostics::new(1, 0.0, StopReason::Exhausted),
    )
    .unwrap()
}
