//! crates/classroom_core/src/engagement.rs
//!
//! Turns behavioural signals into a rolling attentiveness classification.
//!
//! The face/landmark/expression model runs outside this crate; it reports a
//! [`FaceObservation`] per sampled frame. When the model cannot be loaded the
//! [`EngagementSimulator`] produces synthetic events instead.

use std::collections::{HashMap, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{BehaviorEventKind, BehavioralEvent, EngagementLevel};

/// Number of recent events the classification is computed over.
pub const WINDOW_SIZE: usize = 5;

const HIGH_THRESHOLD: f64 = 1.2;
const MEDIUM_THRESHOLD: f64 = 0.6;

//=========================================================================================
// Rolling Window
//=========================================================================================

/// The newest [`WINDOW_SIZE`] events, newest first.
#[derive(Debug, Clone, Default)]
pub struct EngagementWindow {
    events: VecDeque<BehavioralEvent>,
}

impl EngagementWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: BehavioralEvent) {
        self.events.push_front(event);
        self.events.truncate(WINDOW_SIZE);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> impl Iterator<Item = &BehavioralEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Weighted average of the window, `None` when empty.
    pub fn average(&self) -> Option<f64> {
        if self.events.is_empty() {
            return None;
        }
        let total: f64 = self.events.iter().map(|e| e.kind.weight()).sum();
        Some(total / self.events.len() as f64)
    }

    /// Classification of the window. An empty window is treated as attentive.
    pub fn level(&self) -> EngagementLevel {
        match self.average() {
            None => EngagementLevel::High,
            Some(avg) => level_for_average(avg),
        }
    }
}

pub fn level_for_average(average: f64) -> EngagementLevel {
    if average > HIGH_THRESHOLD {
        EngagementLevel::High
    } else if average > MEDIUM_THRESHOLD {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Low
    }
}

//=========================================================================================
// Observation Classification
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The handful of landmarks head-pose estimation needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceLandmarks {
    pub nose_tip: Point,
    pub jaw_left: Point,
    pub jaw_right: Point,
    pub chin: Point,
    pub left_eyebrow: Point,
}

/// One sampled frame as reported by the external face model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// `None` when no face was detected in the frame.
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default)]
    pub expressions: HashMap<String, f32>,
}

const LOOKING_RIGHT_RATIO: f64 = 1.8;
const LOOKING_LEFT_RATIO: f64 = 0.55;
const LOOKING_DOWN_RATIO: f64 = 0.8;

fn head_pose_event(l: &FaceLandmarks) -> Option<BehavioralEvent> {
    let horizontal = (l.nose_tip.x - l.jaw_left.x) / (l.jaw_right.x - l.nose_tip.x);
    let vertical = (l.nose_tip.y - l.left_eyebrow.y) / (l.chin.y - l.nose_tip.y);

    if horizontal > LOOKING_RIGHT_RATIO {
        return Some(BehavioralEvent::new(BehaviorEventKind::Distracted, "Looking right", "ArrowRight"));
    }
    if horizontal < LOOKING_LEFT_RATIO {
        return Some(BehavioralEvent::new(BehaviorEventKind::Distracted, "Looking left", "ArrowLeft"));
    }
    if vertical < LOOKING_DOWN_RATIO {
        return Some(BehavioralEvent::new(BehaviorEventKind::Distracted, "Looking down", "ArrowDown"));
    }
    None
}

fn expression_event(expressions: &HashMap<String, f32>) -> BehavioralEvent {
    let dominant = expressions
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(name, _)| name.as_str())
        .unwrap_or("neutral");

    match dominant {
        "happy" => BehavioralEvent::new(
            BehaviorEventKind::Positive,
            "Positive expression detected",
            "Smile",
        ),
        "neutral" => BehavioralEvent::new(
            BehaviorEventKind::Neutral,
            "Neutral expression detected",
            "Meh",
        ),
        other => {
            let mut chars = other.chars();
            let capitalised: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
            BehavioralEvent::new(
                BehaviorEventKind::Distracted,
                format!("{capitalised} expression"),
                "Frown",
            )
        }
    }
}

/// Classifies a frame. Head pose wins over expression; no face means the learner looked away.
pub fn classify_observation(observation: &FaceObservation) -> BehavioralEvent {
    match &observation.landmarks {
        None => BehavioralEvent::new(
            BehaviorEventKind::Distracted,
            "Looking away from screen",
            "Frown",
        ),
        Some(landmarks) => head_pose_event(landmarks)
            .unwrap_or_else(|| expression_event(&observation.expressions)),
    }
}

//=========================================================================================
// Simulated Fallback
//=========================================================================================

const SIMULATED_EVENTS: [(BehaviorEventKind, &str, &str); 7] = [
    (BehaviorEventKind::Positive, "Positive expression detected", "Smile"),
    (BehaviorEventKind::Neutral, "Focused on screen", "Meh"),
    (BehaviorEventKind::Distracted, "Looking away from screen", "Frown"),
    (BehaviorEventKind::Distracted, "Looking left", "ArrowLeft"),
    (BehaviorEventKind::Distracted, "Looking right", "ArrowRight"),
    (BehaviorEventKind::Distracted, "Looking down", "ArrowDown"),
    (BehaviorEventKind::Positive, "Nodding in agreement", "Smile"),
];

/// Synthetic signal source used when the face model is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngagementSimulator;

impl EngagementSimulator {
    pub fn next_event<R: Rng + ?Sized>(&self, rng: &mut R) -> BehavioralEvent {
        let (kind, description, icon) = SIMULATED_EVENTS
            .choose(rng)
            .copied()
            .unwrap_or(SIMULATED_EVENTS[1]);
        BehavioralEvent::new(kind, description, icon)
    }
}

//=========================================================================================
// Monitor
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// The face model is still loading.
    Loading,
    /// Camera on, real detections flowing.
    Realtime,
    /// The model failed to load; synthetic events stand in.
    Simulated,
    /// Model ready, camera off.
    Idle,
}

pub const SIMULATION_BANNER: &str =
    "Face detection model could not be loaded. Engagement is being simulated.";
pub const CAMERA_DENIED_MESSAGE: &str =
    "Camera access was denied. Please enable it in your browser settings.";

/// Owns the camera on/off state, the monitor mode and the rolling window.
#[derive(Debug, Clone)]
pub struct EngagementMonitor {
    mode: MonitorMode,
    camera_on: bool,
    camera_error: Option<String>,
    window: EngagementWindow,
}

impl Default for EngagementMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl EngagementMonitor {
    pub fn new() -> Self {
        Self {
            mode: MonitorMode::Loading,
            camera_on: false,
            camera_error: None,
            window: EngagementWindow::new(),
        }
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn camera_on(&self) -> bool {
        self.camera_on
    }

    pub fn camera_error(&self) -> Option<&str> {
        self.camera_error.as_deref()
    }

    pub fn banner(&self) -> Option<&'static str> {
        (self.mode == MonitorMode::Simulated).then_some(SIMULATION_BANNER)
    }

    pub fn window(&self) -> &EngagementWindow {
        &self.window
    }

    pub fn model_loaded(&mut self) {
        if self.mode == MonitorMode::Loading {
            self.mode = if self.camera_on {
                MonitorMode::Realtime
            } else {
                MonitorMode::Idle
            };
        }
    }

    pub fn model_failed(&mut self) {
        self.mode = MonitorMode::Simulated;
    }

    pub fn set_camera(&mut self, on: bool) {
        self.camera_on = on;
        if on {
            self.camera_error = None;
            if self.mode == MonitorMode::Idle {
                self.mode = MonitorMode::Realtime;
            }
        } else {
            self.window.clear();
            if self.mode == MonitorMode::Realtime {
                self.mode = MonitorMode::Idle;
            }
        }
    }

    pub fn camera_denied(&mut self) {
        self.set_camera(false);
        self.camera_error = Some(CAMERA_DENIED_MESSAGE.to_string());
    }

    /// Whether the synthetic source should be running right now.
    pub fn wants_simulation(&self) -> bool {
        self.camera_on && self.mode == MonitorMode::Simulated
    }

    /// Records an event. Events arriving while the camera is off are dropped.
    pub fn record(&mut self, event: BehavioralEvent) -> bool {
        if !self.camera_on {
            return false;
        }
        self.window.push(event);
        true
    }

    pub fn observe(&mut self, observation: &FaceObservation) -> bool {
        if self.mode != MonitorMode::Realtime {
            return false;
        }
        self.record(classify_observation(observation))
    }

    /// Camera off collapses engagement to the neutral default.
    pub fn level(&self) -> EngagementLevel {
        if self.camera_on {
            self.window.level()
        } else {
            EngagementLevel::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BehaviorEventKind::{Distracted, Neutral, Positive};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn event(kind: BehaviorEventKind) -> BehavioralEvent {
        BehavioralEvent::new(kind, "test", "Meh")
    }

    fn window_of(kinds: &[BehaviorEventKind]) -> EngagementWindow {
        let mut window = EngagementWindow::new();
        for kind in kinds {
            window.push(event(*kind));
        }
        window
    }

    fn centred_face() -> FaceLandmarks {
        FaceLandmarks {
            nose_tip: Point { x: 100.0, y: 100.0 },
            jaw_left: Point { x: 50.0, y: 100.0 },
            jaw_right: Point { x: 150.0, y: 100.0 },
            chin: Point { x: 100.0, y: 150.0 },
            left_eyebrow: Point { x: 80.0, y: 55.0 },
        }
    }

    #[test]
    fn mostly_positive_is_high() {
        let window = window_of(&[Positive, Positive, Neutral, Positive, Positive]);
        assert!((window.average().unwrap() - 1.8).abs() < 1e-9);
        assert_eq!(window.level(), EngagementLevel::High);
    }

    #[test]
    fn mostly_distracted_is_low() {
        let window = window_of(&[Distracted, Distracted, Neutral, Distracted, Distracted]);
        assert!((window.average().unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(window.level(), EngagementLevel::Low);
    }

    #[test]
    fn thresholds_are_strict() {
        assert_eq!(level_for_average(1.2), EngagementLevel::Medium);
        assert_eq!(level_for_average(0.6), EngagementLevel::Low);
        assert_eq!(level_for_average(1.0), EngagementLevel::Medium);
    }

    #[test]
    fn window_keeps_only_last_five() {
        let mut window = window_of(&[Distracted; 5]);
        for _ in 0..5 {
            window.push(event(Positive));
        }
        assert_eq!(window.len(), WINDOW_SIZE);
        assert_eq!(window.level(), EngagementLevel::High);
    }

    #[test]
    fn no_face_means_looking_away() {
        let e = classify_observation(&FaceObservation::default());
        assert_eq!(e.kind, Distracted);
        assert_eq!(e.description, "Looking away from screen");
    }

    #[test]
    fn head_turned_beats_happy_expression() {
        let mut face = centred_face();
        face.nose_tip.x = 130.0; // 80 / 20 = 4.0
        let observation = FaceObservation {
            landmarks: Some(face),
            expressions: HashMap::from([("happy".to_string(), 0.9)]),
        };
        let e = classify_observation(&observation);
        assert_eq!(e.description, "Looking right");
    }

    #[test]
    fn looking_down_is_detected() {
        let mut face = centred_face();
        face.left_eyebrow.y = 80.0; // 20 / 50 = 0.4
        let e = classify_observation(&FaceObservation {
            landmarks: Some(face),
            expressions: HashMap::new(),
        });
        assert_eq!(e.description, "Looking down");
    }

    #[test]
    fn dominant_expression_classifies_centred_face() {
        let observation = FaceObservation {
            landmarks: Some(centred_face()),
            expressions: HashMap::from([
                ("happy".to_string(), 0.1),
                ("sad".to_string(), 0.7),
                ("neutral".to_string(), 0.2),
            ]),
        };
        let e = classify_observation(&observation);
        assert_eq!(e.kind, Distracted);
        assert_eq!(e.description, "Sad expression");
    }

    #[test]
    fn camera_off_collapses_to_high_and_clears() {
        let mut monitor = EngagementMonitor::new();
        monitor.model_loaded();
        monitor.set_camera(true);
        for _ in 0..5 {
            monitor.record(event(Distracted));
        }
        assert_eq!(monitor.level(), EngagementLevel::Low);

        monitor.set_camera(false);
        assert_eq!(monitor.level(), EngagementLevel::High);
        assert!(monitor.window().is_empty());
        assert_eq!(monitor.mode(), MonitorMode::Idle);
    }

    #[test]
    fn denied_camera_reports_error_and_ignores_events() {
        let mut monitor = EngagementMonitor::new();
        monitor.model_loaded();
        monitor.camera_denied();
        assert_eq!(monitor.camera_error(), Some(CAMERA_DENIED_MESSAGE));
        assert!(!monitor.record(event(Distracted)));
        assert_eq!(monitor.level(), EngagementLevel::High);
    }

    #[test]
    fn failed_model_switches_to_simulation() {
        let mut monitor = EngagementMonitor::new();
        monitor.model_failed();
        assert!(monitor.banner().is_some());
        assert!(!monitor.wants_simulation());
        monitor.set_camera(true);
        assert!(monitor.wants_simulation());
        assert!(!monitor.observe(&FaceObservation::default()));
    }

    #[test]
    fn simulator_draws_canned_events() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let e = EngagementSimulator.next_event(&mut rng);
            assert!(SIMULATED_EVENTS.iter().any(|(_, d, _)| *d == e.description));
        }
    }

    proptest! {
        #[test]
        fn level_matches_thresholds(kinds in proptest::collection::vec(0u8..3, 1..=5)) {
            let kinds: Vec<_> = kinds
                .into_iter()
                .map(|k| match k { 0 => Positive, 1 => Neutral, _ => Distracted })
                .collect();
            let window = window_of(&kinds);
            let avg = kinds.iter().map(|k| k.weight()).sum::<f64>() / kinds.len() as f64;
            let expected = if avg > 1.2 {
                EngagementLevel::High
            } else if avg > 0.6 {
                EngagementLevel::Medium
            } else {
                EngagementLevel::Low
            };
            prop_assert_eq!(window.level(), expected);
        }
    }
}
