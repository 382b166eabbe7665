//! The camera/viewer contract the engine consumes, and a headless
//! implementation of it.

use crate::core::geo::{LatLng, Point, ViewRectangle};
use crate::prelude::{Arc, Mutex};
use crossbeam_channel::Sender;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Screen dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

impl ScreenSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }
}

/// Camera position and view direction in earth-centred coordinates (meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl CameraFrame {
    pub fn new(position: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            position,
            direction: direction.normalize(),
        }
    }

    /// Camera above `target` at `height` meters, looking straight down.
    pub fn looking_down_at(target: LatLng, height: f64) -> Self {
        let ground = target.to_cartesian();
        let up = ground.normalize();
        Self::new(ground + up * height, -up)
    }

    /// Spherical horizon occluder: the point is hidden when the tangent plane
    /// at the point does not face the camera.
    pub fn is_beyond_horizon(&self, point: &Vector3<f64>) -> bool {
        self.position.dot(point) <= point.norm_squared()
    }

    /// Cosine between the view direction and the camera-to-point direction.
    pub fn forward_dot(&self, point: &Vector3<f64>) -> f64 {
        let to_point = point - self.position;
        let len = to_point.norm();
        if len <= f64::EPSILON {
            return 1.0;
        }
        to_point.dot(&self.direction) / len
    }
}

/// Discrete notifications a viewer pushes to subscribed engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    CameraChanged,
    PreRender,
    LabelsToggled(bool),
    TilingSupported(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Everything the engine needs to know about the camera. Projection math
/// stays on the viewer's side of this trait.
pub trait ViewportProvider: Send + Sync {
    /// Camera height above the ellipsoid in meters
    fn camera_height(&self) -> f64;

    /// Visible ground rectangle, or `None` when the camera sees no ground
    fn visible_rectangle(&self) -> Option<ViewRectangle>;

    /// Screen position of a coordinate, `None` when off-screen or occluded
    fn project_to_screen(&self, position: LatLng) -> Option<Point>;

    fn is_occluded(&self, position: LatLng) -> bool;

    fn screen_size(&self) -> ScreenSize;

    /// Optional camera frame enabling the engine's own horizon and
    /// forward-hemisphere tests
    fn camera_frame(&self) -> Option<CameraFrame> {
        None
    }

    /// Register for viewer events. Providers without an event source return `None`.
    fn subscribe(&self, _events: Sender<ViewerEvent>) -> Option<SubscriptionId> {
        None
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}
}

#[derive(Debug, Clone)]
struct StaticViewportState {
    camera_height: f64,
    rectangle: Option<ViewRectangle>,
    screen: ScreenSize,
    frame: Option<CameraFrame>,
    occluded: Vec<LatLng>,
}

/// Headless viewport projecting its rectangle linearly (equirectangular)
/// onto the screen. Useful for servers, tools and tests.
#[derive(Debug, Clone)]
pub struct StaticViewport {
    state: Arc<Mutex<StaticViewportState>>,
    listeners: Arc<Mutex<Vec<(SubscriptionId, Sender<ViewerEvent>)>>>,
    next_subscription: Arc<Mutex<u64>>,
}

impl StaticViewport {
    pub fn new(camera_height: f64, rectangle: Option<ViewRectangle>, screen: ScreenSize) -> Self {
        Self {
            state: Arc::new(Mutex::new(StaticViewportState {
                camera_height,
                rectangle,
                screen,
                frame: None,
                occluded: Vec::new(),
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_subscription: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_camera_height(&self, height: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.camera_height = height;
        }
    }

    pub fn set_rectangle(&self, rectangle: Option<ViewRectangle>) {
        if let Ok(mut state) = self.state.lock() {
            state.rectangle = rectangle;
        }
    }

    pub fn set_camera_frame(&self, frame: Option<CameraFrame>) {
        if let Ok(mut state) = self.state.lock() {
            state.frame = frame;
        }
    }

    /// Mark a coordinate as hidden by terrain or geometry
    pub fn occlude(&self, position: LatLng) {
        if let Ok(mut state) = self.state.lock() {
            state.occluded.push(position);
        }
    }

    /// Broadcast an event to every subscriber, dropping disconnected ones.
    pub fn emit(&self, event: ViewerEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(_, tx)| tx.send(event).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn snapshot(&self) -> Option<StaticViewportState> {
        self.state.lock().ok().map(|s| s.clone())
    }
}

impl ViewportProvider for StaticViewport {
    fn camera_height(&self) -> f64 {
        self.snapshot().map(|s| s.camera_height).unwrap_or(0.0)
    }

    fn visible_rectangle(&self) -> Option<ViewRectangle> {
        self.snapshot()?.rectangle
    }

    fn project_to_screen(&self, position: LatLng) -> Option<Point> {
        let state = self.snapshot()?;
        let rect = state.rectangle?;
        if !rect.contains(&position) {
            return None;
        }
        let span = rect.lng_span();
        let lat_span = rect.north - rect.south;
        if span <= 0.0 || lat_span <= 0.0 {
            return None;
        }
        let mut dlng = position.lng - rect.west;
        if dlng < 0.0 {
            dlng += 360.0;
        }
        Some(Point::new(
            dlng / span * state.screen.width,
            (rect.north - position.lat) / lat_span * state.screen.height,
        ))
    }

    fn is_occluded(&self, position: LatLng) -> bool {
        self.snapshot()
            .map(|s| {
                s.occluded
                    .iter()
                    .any(|o| (o.lat - position.lat).abs() < 1e-9 && (o.lng - position.lng).abs() < 1e-9)
            })
            .unwrap_or(false)
    }

    fn screen_size(&self) -> ScreenSize {
        self.snapshot()
            .map(|s| s.screen)
            .unwrap_or(ScreenSize::new(0.0, 0.0))
    }

    fn camera_frame(&self) -> Option<CameraFrame> {
        self.snapshot()?.frame
    }

    fn subscribe(&self, events: Sender<ViewerEvent>) -> Option<SubscriptionId> {
        let mut next = self.next_subscription.lock().ok()?;
        *next += 1;
        let id = SubscriptionId(*next);
        self.listeners.lock().ok()?.push((id, events));
        Some(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(sub, _)| *sub != id);
        }
    }
}
