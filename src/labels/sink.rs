//! Renderable-entity lifecycle: the engine owns label state, the sink owns
//! whatever the renderer needs to draw it.

use super::kind::LabelFeature;
use crate::core::constants::OPACITY_EPSILON;
use crate::prelude::{Arc, HashMap, Mutex};

/// Opaque renderer handle; also the label's identity inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelHandle(pub u64);

pub trait LabelSink: Send {
    fn create(&mut self, feature: &LabelFeature) -> LabelHandle;
    fn set_visible(&mut self, handle: LabelHandle, visible: bool);
    fn set_opacity(&mut self, handle: LabelHandle, opacity: f32);
    fn destroy(&mut self, handle: LabelHandle);
    fn request_redraw(&mut self);
}

/// One materialized label and its fade state.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableLabel {
    handle: LabelHandle,
    feature: LabelFeature,
    current_opacity: f32,
    target_opacity: f32,
    visible: bool,
}

impl RenderableLabel {
    /// Create the label in the sink, hidden and fully transparent.
    pub fn materialize(feature: LabelFeature, sink: &mut dyn LabelSink) -> Self {
        let handle = sink.create(&feature);
        sink.set_visible(handle, false);
        sink.set_opacity(handle, 0.0);
        Self {
            handle,
            feature,
            current_opacity: 0.0,
            target_opacity: 0.0,
            visible: false,
        }
    }

    pub fn handle(&self) -> LabelHandle {
        self.handle
    }

    pub fn feature(&self) -> &LabelFeature {
        &self.feature
    }

    pub fn current_opacity(&self) -> f32 {
        self.current_opacity
    }

    pub fn target_opacity(&self) -> f32 {
        self.target_opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_settled(&self) -> bool {
        (self.current_opacity - self.target_opacity).abs() <= f32::EPSILON
    }

    /// Set the fade target. A label heading towards visible is shown at once
    /// so the fade-in is seen.
    pub fn retarget(&mut self, target: f32, sink: &mut dyn LabelSink) {
        self.target_opacity = target.clamp(0.0, 1.0);
        if self.target_opacity > 0.0 && !self.visible {
            self.visible = true;
            sink.set_visible(self.handle, true);
        }
    }

    /// Move `current_opacity` towards the target by at most `step`.
    /// Returns true while still animating.
    pub(crate) fn step_opacity(&mut self, step: f32, sink: &mut dyn LabelSink) -> bool {
        if self.target_opacity > 0.0 && !self.visible {
            self.visible = true;
            sink.set_visible(self.handle, true);
        }

        if !self.is_settled() {
            let delta = self.target_opacity - self.current_opacity;
            self.current_opacity = if delta.abs() <= step {
                self.target_opacity
            } else {
                self.current_opacity + step.copysign(delta)
            };
            sink.set_opacity(self.handle, self.current_opacity);
        }

        if self.target_opacity <= 0.0 && self.current_opacity <= OPACITY_EPSILON {
            if self.current_opacity != 0.0 {
                self.current_opacity = 0.0;
                sink.set_opacity(self.handle, 0.0);
            }
            if self.visible {
                self.visible = false;
                sink.set_visible(self.handle, false);
            }
        }

        !self.is_settled()
    }

    pub fn destroy(self, sink: &mut dyn LabelSink) {
        sink.destroy(self.handle);
    }
}

/// What a [`MemorySink`] knows about one live label
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEntry {
    pub feature: LabelFeature,
    pub visible: bool,
    pub opacity: f32,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    next_handle: u64,
    live: HashMap<LabelHandle, SinkEntry>,
    created: usize,
    destroyed: usize,
    redraws: usize,
}

/// Headless sink that keeps label state in memory. Clones share state, so a
/// caller can hand one clone to the engine and inspect through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().map(|s| s.live.len()).unwrap_or(0)
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().map(|s| s.created).unwrap_or(0)
    }

    pub fn destroyed_count(&self) -> usize {
        self.state.lock().map(|s| s.destroyed).unwrap_or(0)
    }

    pub fn redraw_count(&self) -> usize {
        self.state.lock().map(|s| s.redraws).unwrap_or(0)
    }

    pub fn entry(&self, handle: LabelHandle) -> Option<SinkEntry> {
        self.state.lock().ok()?.live.get(&handle).cloned()
    }

    /// Live entries whose feature has the given name
    pub fn find_by_name(&self, name: &str) -> Vec<SinkEntry> {
        self.state
            .lock()
            .map(|s| {
                s.live
                    .values()
                    .filter(|e| e.feature.name == name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of labels currently shown, sorted
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .map(|s| {
                s.live
                    .values()
                    .filter(|e| e.visible)
                    .map(|e| e.feature.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl LabelSink for MemorySink {
    fn create(&mut self, feature: &LabelFeature) -> LabelHandle {
        let Ok(mut state) = self.state.lock() else {
            return LabelHandle(0);
        };
        state.next_handle += 1;
        let handle = LabelHandle(state.next_handle);
        state.created += 1;
        state.live.insert(
            handle,
            SinkEntry {
                feature: feature.clone(),
                visible: false,
                opacity: 0.0,
            },
        );
        handle
    }

    fn set_visible(&mut self, handle: LabelHandle, visible: bool) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(entry) = state.live.get_mut(&handle) {
                entry.visible = visible;
            }
        }
    }

    fn set_opacity(&mut self, handle: LabelHandle, opacity: f32) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(entry) = state.live.get_mut(&handle) {
                entry.opacity = opacity;
            }
        }
    }

    fn destroy(&mut self, handle: LabelHandle) {
        if let Ok(mut state) = self.state.lock() {
            if state.live.remove(&handle).is_some() {
                state.destroyed += 1;
            } else {
                log::warn!("destroy of unknown label handle {:?}", handle);
            }
        }
    }

    fn request_redraw(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.redraws += 1;
        }
    }
}
