//! Per-frame gesture classification.
//!
//! One `LandmarkFrame` in, at most one `GestureSample` out. All stateful
//! gesture logic lives here (pinch hysteresis, drag sessions, hold timers,
//! scroll latches); everything downstream is stateless per event.

use std::time::Instant;

use crate::config::GestureConfig;
use crate::landmarks::{
    Handedness, INDEX_PIP, INDEX_TIP, LandmarkFrame, MIDDLE_PIP, MIDDLE_TIP, PINKY_PIP, PINKY_TIP,
    RING_PIP, RING_TIP, THUMB_TIP,
};

/// How far above the index knuckle the thumb tip must sit for a closed
/// hand to read as thumbs-up instead of fist.
const THUMB_RAISE_MARGIN_PX: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    Point,
    Click,
    RightClick,
    DragStart,
    DragMove,
    DragEnd,
    ScrollStep,
    ScrollMode,
    Fist,
    Palm,
    Peace,
    ThumbsUp,
}

impl GestureLabel {
    /// Instant gestures skip stabilization and cooldown. Only the static
    /// shapes need quorum smoothing; everything motion-derived is already
    /// debounced by the classifier's own timers.
    pub fn is_instant(&self) -> bool {
        !matches!(
            self,
            GestureLabel::Fist | GestureLabel::Palm | GestureLabel::Peace | GestureLabel::ThumbsUp
        )
    }

    /// Profile lookup key.
    pub fn name(&self) -> &'static str {
        match self {
            GestureLabel::Point => "point",
            GestureLabel::Click => "click",
            GestureLabel::RightClick => "right_click",
            GestureLabel::DragStart => "drag_start",
            GestureLabel::DragMove => "drag_move",
            GestureLabel::DragEnd => "drag_end",
            GestureLabel::ScrollStep => "scroll_step",
            GestureLabel::ScrollMode => "scroll_mode",
            GestureLabel::Fist => "fist",
            GestureLabel::Palm => "palm",
            GestureLabel::Peace => "peace",
            GestureLabel::ThumbsUp => "thumbs_up",
        }
    }
}

/// Where an event originated. Voice phrases share the dispatcher with hand
/// gestures but keep separate cooldown keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Hand,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPos {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone)]
pub struct GestureSample {
    pub label: GestureLabel,
    pub hand: Handedness,
    pub confidence: f32,
    pub cursor: Option<CursorPos>,
    pub scroll_delta: Option<i32>,
    pub timestamp: Instant,
}

/// At most one per hand; the press is released exactly once.
#[derive(Debug, Default)]
struct DragSession {
    active: bool,
}

#[derive(Debug, Default)]
struct HoldState {
    since: Option<Instant>,
    fired: bool,
    last_seen: Option<Instant>,
}

#[derive(Debug)]
pub struct GestureClassifier {
    cfg: GestureConfig,
    pinching: bool,
    pinch_started: Option<Instant>,
    drag: DragSession,
    hold: HoldState,
    scroll_ref_y: Option<f32>,
    two_finger_latched: bool,
    three_finger_latched: bool,
}

struct FingerState {
    index_folded: bool,
    middle_folded: bool,
    ring_folded: bool,
    pinky_folded: bool,
}

impl FingerState {
    fn of(frame: &LandmarkFrame) -> Self {
        Self {
            index_folded: frame.finger_folded(INDEX_TIP, INDEX_PIP),
            middle_folded: frame.finger_folded(MIDDLE_TIP, MIDDLE_PIP),
            ring_folded: frame.finger_folded(RING_TIP, RING_PIP),
            pinky_folded: frame.finger_folded(PINKY_TIP, PINKY_PIP),
        }
    }

    fn folded_count(&self) -> usize {
        [
            self.index_folded,
            self.middle_folded,
            self.ring_folded,
            self.pinky_folded,
        ]
        .iter()
        .filter(|&&f| f)
        .count()
    }
}

impl GestureClassifier {
    pub fn new(cfg: GestureConfig) -> Self {
        Self {
            cfg,
            pinching: false,
            pinch_started: None,
            drag: DragSession::default(),
            hold: HoldState::default(),
            scroll_ref_y: None,
            two_finger_latched: false,
            three_finger_latched: false,
        }
    }

    pub fn drag_active(&self) -> bool {
        self.drag.active
    }

    /// Force-close an open drag session, returning the terminating sample if
    /// one was open. Used on shutdown so a held button never outlives the
    /// sensing loop.
    pub fn end_drag(&mut self, now: Instant) -> Option<GestureSample> {
        if !self.drag.active {
            return None;
        }
        self.drag.active = false;
        self.pinching = false;
        self.pinch_started = None;
        Some(GestureSample {
            label: GestureLabel::DragEnd,
            hand: Handedness::Unknown,
            confidence: 1.0,
            cursor: None,
            scroll_delta: None,
            timestamp: now,
        })
    }

    /// Classify one frame. `now` is passed in so tests can drive time.
    pub fn classify(&mut self, frame: &LandmarkFrame, now: Instant) -> Option<GestureSample> {
        if !frame.is_usable() || frame.confidence < self.cfg.min_confidence {
            return None;
        }

        let d_it = frame.distance_px(INDEX_TIP, THUMB_TIP);
        let d_mt = frame.distance_px(MIDDLE_TIP, THUMB_TIP);
        let fingers = FingerState::of(frame);
        let cursor = {
            let (x, y) = frame.cursor_norm();
            CursorPos { x, y }
        };
        let sample = |label: GestureLabel, cursor: Option<CursorPos>, delta: Option<i32>| {
            Some(GestureSample {
                label,
                hand: frame.handedness,
                confidence: frame.confidence,
                cursor,
                scroll_delta: delta,
                timestamp: now,
            })
        };

        // 1. An active drag session owns the frame until the pinch opens
        //    past the release threshold.
        if self.drag.active {
            if d_it >= self.cfg.pinch_release_px {
                self.drag.active = false;
                self.pinching = false;
                self.pinch_started = None;
                return sample(GestureLabel::DragEnd, Some(cursor), None);
            }
            return sample(GestureLabel::DragMove, Some(cursor), None);
        }

        // 2. Pinch band with hysteresis. Enter below start, leave only at or
        //    above release. Promotion to drag happens while still held; a
        //    release inside the band but past the noise floor is a click.
        if self.pinching {
            if d_it >= self.cfg.pinch_release_px {
                let started = self.pinch_started.take();
                self.pinching = false;
                if let Some(t0) = started {
                    let held_ms = now.duration_since(t0).as_millis() as u64;
                    if held_ms >= self.cfg.click_noise_ms && held_ms < self.cfg.drag_promote_ms {
                        return sample(GestureLabel::Click, Some(cursor), None);
                    }
                }
                return None;
            }
            if let Some(t0) = self.pinch_started {
                if now.duration_since(t0).as_millis() as u64 >= self.cfg.drag_promote_ms {
                    self.drag.active = true;
                    return sample(GestureLabel::DragStart, Some(cursor), None);
                }
            }
            return None;
        }
        if d_it < self.cfg.pinch_start_px {
            self.pinching = true;
            self.pinch_started = Some(now);
            return None;
        }

        // 3. Hold-to-trigger secondary click: middle-thumb pinch with the
        //    lower fingers folded, sustained, then a quiet period to re-arm.
        let hold_shape = d_mt < self.cfg.pinch_start_px && fingers.ring_folded && fingers.pinky_folded;
        if hold_shape {
            self.hold.last_seen = Some(now);
            let since = *self.hold.since.get_or_insert(now);
            if !self.hold.fired
                && now.duration_since(since).as_millis() as u64 >= self.cfg.hold_trigger_ms
            {
                self.hold.fired = true;
                return sample(GestureLabel::RightClick, Some(cursor), None);
            }
            return None;
        } else if let Some(last) = self.hold.last_seen {
            if now.duration_since(last).as_millis() as u64 >= self.cfg.hold_rearm_ms {
                self.hold = HoldState::default();
            }
        }

        // 4. Pointer move: index alone, pinch clearly open.
        if !fingers.index_folded
            && fingers.middle_folded
            && fingers.ring_folded
            && fingers.pinky_folded
            && d_it > self.cfg.pinch_release_px
        {
            self.reset_scroll_latches();
            return sample(GestureLabel::Point, Some(cursor), None);
        }

        // 5a. Two-finger scroll step, one-shot on shape entry. Tips held
        //     together distinguishes it from a peace sign.
        let tips_together = frame.distance_px(INDEX_TIP, MIDDLE_TIP) < self.cfg.pinch_start_px;
        if !fingers.index_folded
            && !fingers.middle_folded
            && fingers.ring_folded
            && fingers.pinky_folded
        {
            self.scroll_ref_y = None;
            self.three_finger_latched = false;
            if tips_together {
                if self.two_finger_latched {
                    return None;
                }
                self.two_finger_latched = true;
                return sample(GestureLabel::ScrollStep, None, Some(self.cfg.scroll_step));
            }
            self.two_finger_latched = false;
            return sample(GestureLabel::Peace, None, None);
        }
        self.two_finger_latched = false;

        // 5b. Three-finger scroll step, negative direction.
        if !fingers.index_folded
            && !fingers.middle_folded
            && !fingers.ring_folded
            && fingers.pinky_folded
        {
            self.scroll_ref_y = None;
            if self.three_finger_latched {
                return None;
            }
            self.three_finger_latched = true;
            return sample(GestureLabel::ScrollStep, None, Some(-self.cfg.scroll_step));
        }
        self.three_finger_latched = false;

        // 5c. Open spread: all fingers extended with both pinch distances
        //     wide enters continuous scroll mode. The vertical reference
        //     re-bases every frame so deltas track movement, not position.
        if fingers.folded_count() == 0
            && d_it > self.cfg.pinch_release_px
            && d_mt > self.cfg.pinch_release_px
        {
            let (_, y) = frame.point_px(MIDDLE_TIP);
            let delta = match self.scroll_ref_y.replace(y) {
                Some(ref_y) => {
                    let dy = ref_y - y;
                    if dy.abs() < self.cfg.scroll_deadzone_px {
                        0
                    } else {
                        (dy * self.cfg.scroll_gain / self.cfg.scroll_deadzone_px) as i32
                    }
                }
                None => 0,
            };
            if delta == 0 {
                return None;
            }
            return sample(GestureLabel::ScrollMode, None, Some(delta));
        }
        self.scroll_ref_y = None;

        // 6. Static shapes from the fold pattern.
        if fingers.folded_count() == 4 {
            // Thumb raised well above the index knuckle reads as thumbs-up,
            // otherwise a plain fist.
            let (_, thumb_y) = frame.point_px(THUMB_TIP);
            let (_, index_pip_y) = frame.point_px(INDEX_PIP);
            if thumb_y < index_pip_y - THUMB_RAISE_MARGIN_PX {
                return sample(GestureLabel::ThumbsUp, None, None);
            }
            return sample(GestureLabel::Fist, None, None);
        }
        if fingers.folded_count() == 0 {
            return sample(GestureLabel::Palm, None, None);
        }

        None
    }

    fn reset_scroll_latches(&mut self) {
        self.scroll_ref_y = None;
        self.two_finger_latched = false;
        self.three_finger_latched = false;
    }
}
