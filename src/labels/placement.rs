//! Greedy screen-space collision placement.
//!
//! Candidates are filtered by tier and occlusion, sorted by kind priority
//! (stable, so insertion order breaks ties) and accepted first-come
//! first-served against a [`ScreenGrid`]. If the display tier yields too few
//! labels, the remaining eligible kinds get a second pass against the same
//! grid. There is no backtracking: the result depends only on candidate order
//! and cell size.

use super::kind::LabelFeature;
use super::sink::LabelHandle;
use super::tier::Tier;
use crate::core::config::PlacementConfig;
use crate::core::constants::LINE_HEIGHT_FACTOR;
use crate::core::geo::Point;
use crate::core::viewport::ViewportProvider;
use crate::spatial::{ScreenBox, ScreenGrid};

/// A label offered to the resolver
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub handle: LabelHandle,
    pub feature: &'a LabelFeature,
}

impl<'a> Candidate<'a> {
    pub fn new(handle: LabelHandle, feature: &'a LabelFeature) -> Self {
        Self { handle, feature }
    }
}

/// Why a candidate did not make it on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutsideTier,
    Occluded,
    BehindCamera,
    OffScreen,
    Collided,
    /// Eligible fallback kind, but the display tier filled the floor
    NotNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedLabel {
    pub handle: LabelHandle,
    pub screen_box: ScreenBox,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementOutcome {
    /// Accepted labels in acceptance order
    pub accepted: Vec<PlacedLabel>,
    pub rejected: Vec<(LabelHandle, Rejection)>,
    /// Accepted during the display-tier pass
    pub display_accepted: usize,
    pub fallback_ran: bool,
}

impl PlacementOutcome {
    pub fn is_accepted(&self, handle: LabelHandle) -> bool {
        self.accepted.iter().any(|p| p.handle == handle)
    }

    pub fn rejection(&self, handle: LabelHandle) -> Option<Rejection> {
        self.rejected
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, r)| *r)
    }

    /// Target opacity for every candidate: 1 when accepted, 0 otherwise.
    pub fn targets(&self) -> impl Iterator<Item = (LabelHandle, f32)> + '_ {
        self.accepted
            .iter()
            .map(|p| (p.handle, 1.0))
            .chain(self.rejected.iter().map(|(h, _)| (*h, 0.0)))
    }
}

struct Survivor<'a> {
    candidate: Candidate<'a>,
    screen_box: ScreenBox,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementResolver {
    config: PlacementConfig,
}

impl PlacementResolver {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Rough text extent from font size and character count, centred on the anchor
    pub fn estimate_box(&self, feature: &LabelFeature, anchor: Point) -> ScreenBox {
        let font = self.config.font_size(feature.kind);
        let chars = feature.name.chars().count().max(1) as f64;
        let pad = self.config.box_padding_px;
        let w = chars * font * self.config.glyph_width_factor + 2.0 * pad;
        let h = font * LINE_HEIGHT_FACTOR + 2.0 * pad;
        ScreenBox::centered(anchor, w, h)
    }

    pub fn resolve(
        &self,
        candidates: &[Candidate<'_>],
        tier: &Tier,
        viewport: &dyn ViewportProvider,
    ) -> PlacementOutcome {
        let mut outcome = PlacementOutcome::default();
        let screen = viewport.screen_size();
        let frame = viewport.camera_frame();

        let mut survivors: Vec<Survivor<'_>> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let feature = candidate.feature;
            if !tier.eligible.contains(feature.kind) {
                outcome
                    .rejected
                    .push((candidate.handle, Rejection::OutsideTier));
                continue;
            }

            let position = feature.position();
            if viewport.is_occluded(position) {
                outcome.rejected.push((candidate.handle, Rejection::Occluded));
                continue;
            }
            if let Some(frame) = &frame {
                let world = position.to_cartesian();
                if frame.is_beyond_horizon(&world) {
                    outcome.rejected.push((candidate.handle, Rejection::Occluded));
                    continue;
                }
                if frame.forward_dot(&world) < self.config.forward_dot_threshold {
                    outcome
                        .rejected
                        .push((candidate.handle, Rejection::BehindCamera));
                    continue;
                }
            }

            let Some(anchor) = viewport
                .project_to_screen(position)
                .filter(|p| screen.contains(p))
            else {
                outcome.rejected.push((candidate.handle, Rejection::OffScreen));
                continue;
            };

            survivors.push(Survivor {
                candidate: *candidate,
                screen_box: self.estimate_box(feature, anchor),
            });
        }

        // stable: equal kinds keep their incoming order
        survivors.sort_by_key(|s| s.candidate.feature.kind.priority());

        let mut grid = ScreenGrid::new(self.config.cell_size_px);
        let fallback_kinds = tier.fallback();
        let mut deferred = Vec::new();

        for survivor in &survivors {
            let kind = survivor.candidate.feature.kind;
            if !tier.display.contains(kind) {
                if fallback_kinds.contains(kind) {
                    deferred.push(survivor);
                }
                continue;
            }
            if grid.try_insert(survivor.screen_box) {
                outcome.accepted.push(PlacedLabel {
                    handle: survivor.candidate.handle,
                    screen_box: survivor.screen_box,
                });
                outcome.display_accepted += 1;
            } else {
                outcome
                    .rejected
                    .push((survivor.candidate.handle, Rejection::Collided));
            }
        }

        if outcome.display_accepted < self.config.min_visible_labels {
            outcome.fallback_ran = true;
            for survivor in deferred {
                if grid.try_insert(survivor.screen_box) {
                    outcome.accepted.push(PlacedLabel {
                        handle: survivor.candidate.handle,
                        screen_box: survivor.screen_box,
                    });
                } else {
                    outcome
                        .rejected
                        .push((survivor.candidate.handle, Rejection::Collided));
                }
            }
        } else {
            outcome.rejected.extend(
                deferred
                    .into_iter()
                    .map(|s| (s.candidate.handle, Rejection::NotNeeded)),
            );
        }

        log::debug!(
            "placement: {} candidates, {} accepted ({} display), fallback={}",
            candidates.len(),
            outcome.accepted.len(),
            outcome.display_accepted,
            outcome.fallback_ran
        );
        outcome
    }
}
