//! Camera height to zoom, and zoom to the label kinds worth showing.
//!
//! Both the integer fetch zoom and the continuous display zoom come from
//! [`HEIGHT_ZOOM_BREAKPOINTS`], so the tile zoom and the tier never disagree
//! about where the camera is.

use super::kind::{KindSet, LabelKind};
use crate::core::constants::{HEIGHT_ZOOM_BREAKPOINTS, MAX_LABEL_ZOOM, MIN_LABEL_ZOOM};

/// Integer fetch zoom for a camera height in meters.
pub fn height_to_zoom(height: f64) -> u8 {
    HEIGHT_ZOOM_BREAKPOINTS
        .iter()
        .rev()
        .find(|(h, _)| *h >= height)
        .map(|(_, z)| *z)
        .unwrap_or(MIN_LABEL_ZOOM)
}

/// Continuous zoom, linearly interpolated between the same anchors.
pub fn height_to_zoom_float(height: f64) -> f64 {
    let (first_h, first_z) = HEIGHT_ZOOM_BREAKPOINTS[0];
    if height.is_nan() {
        return MIN_LABEL_ZOOM as f64;
    }
    if height >= first_h {
        return first_z as f64;
    }
    for pair in HEIGHT_ZOOM_BREAKPOINTS.windows(2) {
        let (far_h, far_z) = pair[0];
        let (near_h, near_z) = pair[1];
        if height >= near_h {
            let t = (far_h - height) / (far_h - near_h);
            return far_z as f64 + t * (near_z as f64 - far_z as f64);
        }
    }
    MAX_LABEL_ZOOM as f64
}

/// Kinds to place preferentially (`display`) and kinds worth keeping in the
/// cache and using as fallback (`eligible`). `eligible ⊇ display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub display: KindSet,
    pub eligible: KindSet,
}

impl Tier {
    fn new(display: &[LabelKind], eligible: &[LabelKind]) -> Self {
        let display = KindSet::from_kinds(display);
        // eligible always includes display
        let eligible = KindSet::from_kinds(eligible)
            .iter()
            .chain(display.iter())
            .collect();
        Self { display, eligible }
    }

    /// Eligible kinds only used by the fallback pass
    pub fn fallback(&self) -> KindSet {
        self.eligible.difference(&self.display)
    }
}

pub fn tier_for(zoom: f64) -> Tier {
    use LabelKind::*;
    if zoom <= 4.0 {
        Tier::new(&[Continent], &[Continent, Country])
    } else if zoom <= 5.5 {
        Tier::new(&[Country], &[Continent, Country, State])
    } else if zoom <= 7.0 {
        Tier::new(&[Country, State], &[Country, State, CityLarge])
    } else if zoom <= 8.0 {
        Tier::new(&[State, CityLarge], &[Country, State, CityLarge, CityMedium])
    } else if zoom <= 9.5 {
        Tier::new(
            &[CityLarge, CityMedium],
            &[State, CityLarge, CityMedium, CitySmall],
        )
    } else {
        Tier::new(
            &[CityLarge, CityMedium, CitySmall],
            &[State, CityLarge, CityMedium, CitySmall],
        )
    }
}
