//! Window-input stand-ins for the lab hardware: the mouse cursor plays the
//! eye tracker and the keyboard plays the response box.

use std::collections::VecDeque;
use std::time::Duration;

use ior_core::{DisplayState, FixationPoint, Layout, Presenter};
use ior_experiment::{
    EyeEvent, GazeOracle, ResponseCollector, ResponseKey, ResponseKeys, ResponsePoll,
};
use ior_timing::Timer;

/// How long the cursor must stay put before its position counts as a
/// saccade landing.
pub const SETTLE: Duration = Duration::from_millis(40);

/// Cursor-driven gaze. The latest cursor position is the gaze sample; once
/// the cursor has been still for `settle`, that position is also the end of
/// the most recent saccade.
pub struct MouseGaze<T: Timer<Timestamp = u64>> {
    timer: T,
    layout: Layout,
    settle: Duration,
    cursor: Option<(f32, f32)>,
    moved_at: u64,
}

impl<T: Timer<Timestamp = u64>> MouseGaze<T> {
    pub fn new(timer: T, layout: Layout, settle: Duration) -> Self {
        let moved_at = timer.now();
        Self {
            timer,
            layout,
            settle,
            cursor: None,
            moved_at,
        }
    }

    pub fn moved(&mut self, position: (f32, f32)) {
        self.cursor = Some(position);
        self.moved_at = self.timer.now();
    }

    /// Cursor left the window; no gaze sample until it returns.
    pub fn lost(&mut self) {
        self.cursor = None;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.layout.resize(width, height);
    }

    fn landing(&self) -> Option<(f32, f32)> {
        let at_rest = self.timer.elapsed(self.moved_at) >= self.settle;
        self.cursor.filter(|_| at_rest)
    }
}

impl<T: Timer<Timestamp = u64>> GazeOracle for MouseGaze<T> {
    fn within(&mut self, point: FixationPoint, events: &[EyeEvent]) -> bool {
        let boundary = self.layout.boundary(point);
        events.iter().all(|event| {
            let sample = match event {
                EyeEvent::GazePosition => self.cursor,
                EyeEvent::SaccadeEnd => self.landing(),
            };
            sample.is_some_and(|p| boundary.contains(p))
        })
    }
}

/// Key presses stamped when the window saw them, so response times do not
/// depend on frame boundaries.
pub struct KeyBuffer<T: Timer<Timestamp = u64>> {
    timer: T,
    presses: VecDeque<(ResponseKey, u64)>,
    armed: Option<(ResponseKey, u64, Duration)>,
}

impl<T: Timer<Timestamp = u64>> KeyBuffer<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            presses: VecDeque::new(),
            armed: None,
        }
    }

    pub fn push(&mut self, key: ResponseKey) {
        self.presses.push_back((key, self.timer.now()));
    }
}

impl<T: Timer<Timestamp = u64>> ResponseKeys for KeyBuffer<T> {
    fn pressed(&mut self, key: ResponseKey) -> bool {
        match self.presses.iter().position(|(k, _)| *k == key) {
            Some(i) => {
                self.presses.remove(i);
                true
            }
            None => false,
        }
    }
}

impl<T: Timer<Timestamp = u64>> ResponseCollector for KeyBuffer<T> {
    fn begin(&mut self, key: ResponseKey, window: Duration) {
        let now = self.timer.now();
        self.presses.retain(|(_, at)| *at >= now);
        self.armed = Some((key, now, window));
    }

    fn poll(&mut self) -> ResponsePoll {
        let Some((key, began, window)) = self.armed else {
            return ResponsePoll::Pending;
        };
        let hit = self
            .presses
            .iter()
            .position(|(k, at)| *k == key && *at >= began);
        if let Some(i) = hit {
            if let Some((_, at)) = self.presses.remove(i) {
                self.armed = None;
                let rt = Duration::from_nanos(at - began);
                if rt <= window {
                    return ResponsePoll::Responded { rt };
                }
                return ResponsePoll::Expired;
            }
        }
        if self.timer.elapsed(began) >= window {
            self.armed = None;
            return ResponsePoll::Expired;
        }
        ResponsePoll::Pending
    }
}

/// One frame's view of the live devices, bundled for the trial machine.
pub struct LiveEnv<'a, T: Timer<Timestamp = u64>, P: Presenter> {
    pub gaze: &'a mut MouseGaze<T>,
    pub keys: &'a mut KeyBuffer<T>,
    pub presenter: &'a mut P,
}

impl<T: Timer<Timestamp = u64>, P: Presenter> GazeOracle for LiveEnv<'_, T, P> {
    fn within(&mut self, point: FixationPoint, events: &[EyeEvent]) -> bool {
        self.gaze.within(point, events)
    }
}

impl<T: Timer<Timestamp = u64>, P: Presenter> ResponseKeys for LiveEnv<'_, T, P> {
    fn pressed(&mut self, key: ResponseKey) -> bool {
        self.keys.pressed(key)
    }
}

impl<T: Timer<Timestamp = u64>, P: Presenter> ResponseCollector for LiveEnv<'_, T, P> {
    fn begin(&mut self, key: ResponseKey, window: Duration) {
        self.keys.begin(key, window);
    }

    fn poll(&mut self) -> ResponsePoll {
        self.keys.poll()
    }
}

impl<T: Timer<Timestamp = u64>, P: Presenter> Presenter for LiveEnv<'_, T, P> {
    fn present(&mut self, display: &DisplayState) {
        self.presenter.present(display);
    }

    fn show_message(&mut self, text: &str) {
        self.presenter.show_message(text);
    }
}
