//! Host collaborator seams.
//!
//! The core never talks to real hardware; the display, keypad, watchdog,
//! and tick timing are traits implemented by the hosting shell (or by the
//! null/recording doubles below in tests).

use std::collections::VecDeque;

/// Annunciator bits along the top of the LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Annunciator {
    Run,
    Busy,
    Error,
}

/// Output side of the LCD contract: one status line, one digit line, and
/// the annunciator row. All calls are informational and infallible.
pub trait DisplayPort {
    fn set_status(&mut self, text: &str);
    fn set_digits(&mut self, text: &str);
    fn set_annunciator(&mut self, which: Annunciator, on: bool);
}

/// Input side: a single pending keycode, polled between instructions.
pub trait Keypad {
    fn pending_key(&mut self) -> Option<u8>;
}

/// Serviced periodically while executing; pets the hardware watchdog and
/// reports whether execution may continue (`false` requests an abort).
pub trait BusyHook {
    fn busy(&mut self) -> bool {
        true
    }
}

/// Source of pause timing. The hosted default sleeps; firmware builds count
/// hardware ticks instead.
pub trait TickSource {
    fn wait_tick(&mut self);
}

/// Display that swallows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplayPort for NullDisplay {
    fn set_status(&mut self, _text: &str) {}
    fn set_digits(&mut self, _text: &str) {}
    fn set_annunciator(&mut self, _which: Annunciator, _on: bool) {}
}

/// Display double that records the traffic it saw, for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    pub status: Vec<String>,
    pub digits: Vec<String>,
    pub annunciators: Vec<(Annunciator, bool)>,
}

impl DisplayPort for RecordingDisplay {
    fn set_status(&mut self, text: &str) {
        self.status.push(text.to_string());
    }

    fn set_digits(&mut self, text: &str) {
        self.digits.push(text.to_string());
    }

    fn set_annunciator(&mut self, which: Annunciator, on: bool) {
        self.annunciators.push((which, on));
    }
}

/// Handle to a [`RecordingDisplay`] that stays observable after the
/// machine takes ownership of its display port.
#[derive(Debug, Default, Clone)]
pub struct SharedDisplay(pub std::rc::Rc<std::cell::RefCell<RecordingDisplay>>);

impl DisplayPort for SharedDisplay {
    fn set_status(&mut self, text: &str) {
        self.0.borrow_mut().set_status(text);
    }

    fn set_digits(&mut self, text: &str) {
        self.0.borrow_mut().set_digits(text);
    }

    fn set_annunciator(&mut self, which: Annunciator, on: bool) {
        self.0.borrow_mut().set_annunciator(which, on);
    }
}

/// Queue-backed keypad double.
#[derive(Debug, Default, Clone)]
pub struct KeyQueue {
    keys: VecDeque<u8>,
}

impl KeyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, code: u8) {
        self.keys.push_back(code);
    }
}

impl Keypad for KeyQueue {
    fn pending_key(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }
}

/// Keypad with no keys, ever.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeys;

impl Keypad for NoKeys {
    fn pending_key(&mut self) -> Option<u8> {
        None
    }
}

/// Watchdog hook that always allows progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReady;

impl BusyHook for AlwaysReady {}

/// Hosted tick source: one tick is a short wall-clock sleep.
#[derive(Debug, Clone, Copy)]
pub struct SleepTicks {
    pub tick: std::time::Duration,
}

impl Default for SleepTicks {
    fn default() -> Self {
        Self {
            tick: std::time::Duration::from_millis(100),
        }
    }
}

impl TickSource for SleepTicks {
    fn wait_tick(&mut self) {
        std::thread::sleep(self.tick);
    }
}

/// Tick source that returns immediately (tests, batch runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWait;

impl TickSource for NoWait {
    fn wait_tick(&mut self) {}
}
