//! Pointer-drag interpretation for swipe cards.
//!
//! The engine only knows about displacement: it turns a drag into a tap, a
//! left/right commit or a snap-back, and computes the visual feedback for
//! the current offset. What a commit *means* is decided by the deck.
//!
//! ```text
//! idle ─down─▶ dragging ─up─▶ committing-left/right ─animation─▶ idle
//!                  │      └──▶ snapping-back ─────────animation─▶ idle
//!                  └─up (no movement)─▶ idle  (tap)
//! ```
use std::time::Duration;

/// Default lateral displacement a release must exceed to commit.
pub const DEFAULT_COMMIT_THRESHOLD_PX: f64 = 100.0;
/// Movement within this radius on both axes still counts as a tap.
pub const DEFAULT_TAP_SLOP_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwipeDirection {
    /// Discard.
    Left,
    /// Save.
    Right,
}

impl SwipeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SwipeDirection::Left => "left",
            SwipeDirection::Right => "right",
        }
    }
}

impl std::str::FromStr for SwipeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" | "discard" => Ok(SwipeDirection::Left),
            "right" | "save" => Ok(SwipeDirection::Right),
            other => Err(format!("unknown swipe direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GestureConfig {
    pub commit_threshold_px: f64,
    pub tap_slop_px: f64,
    /// Card rotation per pixel of horizontal displacement.
    pub rotation_deg_per_px: f64,
    pub max_rotation_deg: f64,
    /// Exit animation after a commit. The next card loads when it ends.
    pub exit_animation: Duration,
    /// Ease-out back to neutral after an uncommitted drag.
    pub snap_back: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            commit_threshold_px: DEFAULT_COMMIT_THRESHOLD_PX,
            tap_slop_px: DEFAULT_TAP_SLOP_PX,
            rotation_deg_per_px: 0.1,
            max_rotation_deg: 30.0,
            exit_animation: Duration::from_millis(300),
            snap_back: Duration::from_millis(200),
        }
    }
}

/// Live state of one pointer interaction. Dropped on release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeGestureState {
    pub is_dragging: bool,
    pub start_x: f64,
    pub start_y: f64,
    pub current_x: f64,
    pub current_y: f64,
    /// Set once the pointer leaves the tap slop on either axis.
    pub has_moved: bool,
}

impl SwipeGestureState {
    fn begin(x: f64, y: f64) -> Self {
        Self {
            is_dragging: true,
            start_x: x,
            start_y: y,
            current_x: x,
            current_y: y,
            has_moved: false,
        }
    }

    pub fn dx(&self) -> f64 {
        self.current_x - self.start_x
    }

    pub fn dy(&self) -> f64 {
        self.current_y - self.start_y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GesturePhase {
    Idle,
    Dragging(SwipeGestureState),
    Committing(SwipeDirection),
    SnappingBack,
}

/// Result of releasing the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Tap,
    Commit(SwipeDirection),
    SnapBack,
}

/// Visual state of the card for a given displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedback {
    pub offset_x: f64,
    pub rotation_deg: f64,
    /// Opacity of the "save" overlay, 0.0 to 1.0.
    pub save_opacity: f64,
    /// Opacity of the "discard" overlay, 0.0 to 1.0.
    pub discard_opacity: f64,
}

/// Feedback is a pure function of the current horizontal displacement.
pub fn feedback(dx: f64, config: &GestureConfig) -> Feedback {
    let rotation = (dx * config.rotation_deg_per_px)
        .clamp(-config.max_rotation_deg, config.max_rotation_deg);
    let strength = if config.commit_threshold_px > 0.0 {
        (dx.abs() / config.commit_threshold_px).min(1.0)
    } else {
        1.0
    };

    Feedback {
        offset_x: dx,
        rotation_deg: rotation,
        save_opacity: if dx > 0.0 { strength } else { 0.0 },
        discard_opacity: if dx < 0.0 { strength } else { 0.0 },
    }
}

/// Classify a finished drag. Displacement is measured at release, not peak.
pub fn classify(state: &SwipeGestureState, config: &GestureConfig) -> GestureOutcome {
    let dx = state.dx();
    let dy = state.dy();

    if !state.has_moved && dx.abs() <= config.tap_slop_px && dy.abs() <= config.tap_slop_px {
        return GestureOutcome::Tap;
    }
    if dx > config.commit_threshold_px {
        GestureOutcome::Commit(SwipeDirection::Right)
    } else if dx < -config.commit_threshold_px {
        GestureOutcome::Commit(SwipeDirection::Left)
    } else {
        GestureOutcome::SnapBack
    }
}

#[derive(Debug, Clone)]
pub struct SwipeGestureEngine {
    config: GestureConfig,
    phase: GesturePhase,
}

impl SwipeGestureEngine {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            phase: GesturePhase::Idle,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    /// True while a commit animation is running.
    pub fn is_committing(&self) -> bool {
        matches!(self.phase, GesturePhase::Committing(_))
    }

    /// Start a drag. Refused while a commit animation is in flight or a
    /// drag is already active. A running snap-back is interrupted.
    pub fn pointer_down(&mut self, x: f64, y: f64) -> bool {
        match self.phase {
            GesturePhase::Idle | GesturePhase::SnappingBack => {
                self.phase = GesturePhase::Dragging(SwipeGestureState::begin(x, y));
                true
            }
            GesturePhase::Dragging(_) | GesturePhase::Committing(_) => false,
        }
    }

    /// Track pointer movement. Returns the card feedback while dragging.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<Feedback> {
        let GesturePhase::Dragging(state) = &mut self.phase else {
            return None;
        };
        state.current_x = x;
        state.current_y = y;
        if state.dx().abs() > self.config.tap_slop_px || state.dy().abs() > self.config.tap_slop_px
        {
            state.has_moved = true;
        }
        Some(feedback(state.dx(), &self.config))
    }

    /// Finish the drag at `(x, y)`. Returns `None` if no drag was active.
    pub fn pointer_up(&mut self, x: f64, y: f64) -> Option<GestureOutcome> {
        let GesturePhase::Dragging(mut state) = self.phase else {
            return None;
        };
        state.current_x = x;
        state.current_y = y;
        state.is_dragging = false;

        let outcome = classify(&state, &self.config);
        self.phase = match outcome {
            GestureOutcome::Tap => GesturePhase::Idle,
            GestureOutcome::Commit(direction) => GesturePhase::Committing(direction),
            GestureOutcome::SnapBack => GesturePhase::SnappingBack,
        };
        Some(outcome)
    }

    /// Pointer left the card or the platform cancelled the interaction.
    pub fn pointer_cancel(&mut self) -> bool {
        if matches!(self.phase, GesturePhase::Dragging(_)) {
            self.phase = GesturePhase::SnappingBack;
            true
        } else {
            false
        }
    }

    /// Commit without a drag (button or keyboard). Refused while dragging or
    /// committing.
    pub fn begin_commit(&mut self, direction: SwipeDirection) -> bool {
        match self.phase {
            GesturePhase::Idle | GesturePhase::SnappingBack => {
                self.phase = GesturePhase::Committing(direction);
                true
            }
            GesturePhase::Dragging(_) | GesturePhase::Committing(_) => false,
        }
    }

    /// The exit or snap-back animation ended.
    pub fn animation_finished(&mut self) {
        if matches!(
            self.phase,
            GesturePhase::Committing(_) | GesturePhase::SnappingBack
        ) {
            self.phase = GesturePhase::Idle;
        }
    }

    /// How long the animation for `outcome` runs, if any.
    pub fn animation_duration(&self, outcome: GestureOutcome) -> Option<Duration> {
        match outcome {
            GestureOutcome::Tap => None,
            GestureOutcome::Commit(_) => Some(self.config.exit_animation),
            GestureOutcome::SnapBack => Some(self.config.snap_back),
        }
    }
}

impl Default for SwipeGestureEngine {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drag(engine: &mut SwipeGestureEngine, dx: f64) -> Option<GestureOutcome> {
        engine.pointer_down(200.0, 300.0);
        engine.pointer_move(200.0 + dx, 300.0);
        engine.pointer_up(200.0 + dx, 300.0)
    }

    #[test]
    fn test_99px_snaps_back() {
        let mut engine = SwipeGestureEngine::default();
        assert_eq!(drag(&mut engine, 99.0), Some(GestureOutcome::SnapBack));
        assert_eq!(engine.phase(), GesturePhase::SnappingBack);
    }

    #[test]
    fn test_101px_commits_right() {
        let mut engine = SwipeGestureEngine::default();
        assert_eq!(
            drag(&mut engine, 101.0),
            Some(GestureOutcome::Commit(SwipeDirection::Right))
        );
    }

    #[test]
    fn test_101px_left_commits_left() {
        let mut engine = SwipeGestureEngine::default();
        assert_eq!(
            drag(&mut engine, -101.0),
            Some(GestureOutcome::Commit(SwipeDirection::Left))
        );
    }

    #[test]
    fn test_exactly_threshold_snaps_back() {
        let mut engine = SwipeGestureEngine::default();
        assert_eq!(drag(&mut engine, 100.0), Some(GestureOutcome::SnapBack));
    }

    #[test]
    fn test_small_release_without_movement_is_tap() {
        let mut engine = SwipeGestureEngine::default();
        engine.pointer_down(50.0, 50.0);
        assert_eq!(engine.pointer_up(55.0, 50.0), Some(GestureOutcome::Tap));
        assert_eq!(engine.phase(), GesturePhase::Idle);
    }

    #[test]
    fn test_returning_to_start_after_moving_is_not_tap() {
        let mut engine = SwipeGestureEngine::default();
        engine.pointer_down(50.0, 50.0);
        engine.pointer_move(90.0, 50.0);
        assert_eq!(engine.pointer_up(55.0, 50.0), Some(GestureOutcome::SnapBack));
    }

    #[test]
    fn test_vertical_movement_blocks_tap() {
        let mut engine = SwipeGestureEngine::default();
        engine.pointer_down(50.0, 50.0);
        assert_eq!(engine.pointer_up(50.0, 70.0), Some(GestureOutcome::SnapBack));
    }

    #[test]
    fn test_threshold_measured_at_release_not_peak() {
        let mut engine = SwipeGestureEngine::default();
        engine.pointer_down(0.0, 0.0);
        engine.pointer_move(250.0, 0.0);
        assert_eq!(engine.pointer_up(40.0, 0.0), Some(GestureOutcome::SnapBack));
    }

    #[test]
    fn test_no_new_gesture_during_commit_animation() {
        let mut engine = SwipeGestureEngine::default();
        drag(&mut engine, 150.0);
        assert!(engine.is_committing());
        assert!(!engine.pointer_down(0.0, 0.0));
        assert_eq!(engine.pointer_up(0.0, 0.0), None);

        engine.animation_finished();
        assert!(engine.pointer_down(0.0, 0.0));
    }

    #[test]
    fn test_snap_back_can_be_interrupted() {
        let mut engine = SwipeGestureEngine::default();
        drag(&mut engine, 30.0);
        assert!(engine.pointer_down(0.0, 0.0));
    }

    #[test]
    fn test_button_commit_refused_mid_drag() {
        let mut engine = SwipeGestureEngine::default();
        engine.pointer_down(0.0, 0.0);
        assert!(!engine.begin_commit(SwipeDirection::Left));
        engine.pointer_cancel();
        assert!(engine.begin_commit(SwipeDirection::Left));
        assert_eq!(engine.phase(), GesturePhase::Committing(SwipeDirection::Left));
    }

    #[test]
    fn test_move_without_drag_has_no_feedback() {
        let mut engine = SwipeGestureEngine::default();
        assert_eq!(engine.pointer_move(10.0, 10.0), None);
    }

    #[test]
    fn test_feedback_overlays() {
        let config = GestureConfig::default();
        let right = feedback(50.0, &config);
        assert_eq!(right.save_opacity, 0.5);
        assert_eq!(right.discard_opacity, 0.0);
        assert_eq!(right.rotation_deg, 5.0);

        let far_left = feedback(-400.0, &config);
        assert_eq!(far_left.discard_opacity, 1.0);
        assert_eq!(far_left.rotation_deg, -30.0);
    }

    #[test]
    fn test_animation_durations() {
        let engine = SwipeGestureEngine::default();
        assert_eq!(engine.animation_duration(GestureOutcome::Tap), None);
        assert_eq!(
            engine.animation_duration(GestureOutcome::Commit(SwipeDirection::Left)),
            Some(Duration::from_millis(300))
        );
    }

    proptest! {
        #[test]
        fn prop_feedback_not_accumulated(path in proptest::collection::vec(-500.0f64..500.0, 1..20)) {
            let mut engine = SwipeGestureEngine::default();
            engine.pointer_down(0.0, 0.0);
            let mut last = None;
            for x in &path {
                last = engine.pointer_move(*x, 0.0);
            }
            let final_x = *path.last().unwrap();
            prop_assert_eq!(last, Some(feedback(final_x, engine.config())));
        }

        #[test]
        fn prop_commit_iff_beyond_threshold(dx in -400.0f64..400.0) {
            let mut engine = SwipeGestureEngine::default();
            let outcome = drag(&mut engine, dx).unwrap();
            let committed = matches!(outcome, GestureOutcome::Commit(_));
            prop_assert_eq!(committed, dx.abs() > DEFAULT_COMMIT_THRESHOLD_PX);
        }
    }
}
