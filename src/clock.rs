//! Logical clocks and the per-frame tick registry.
//!
//! Nothing in this module reads wall time. A [`Clock`] is advanced explicitly
//! by whoever owns it, and the [`TickRegistry`] fans one external frame signal
//! out to every registered subscriber — material clones animating their own
//! uniforms, the shared fog clock, pulse timers. One registry serves the whole
//! process; each subscriber keeps its own notion of elapsed time.
//!
//! # Frame boundaries
//!
//! Each call to [`TickRegistry::advance`] is one frame. Registrations and
//! removals are staged and applied at the end of the `advance` call in
//! progress, so a tickable registered during frame N receives its first tick
//! in frame N+1 and is never ticked before it is registered.

/// A logical elapsed-time counter owned by one entity.
///
/// Starts at zero and only moves when [`advance`](Self::advance) is called,
/// so two clocks fed the same deltas stay in lockstep while a reset clock
/// measures from its own origin.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clock {
    elapsed: f32,
}

impl Clock {
    /// Creates a clock at zero elapsed seconds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
    }

    /// Elapsed seconds since creation or the last [`reset`](Self::reset).
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Rewinds the clock to zero.
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

/// Anything that receives a per-frame time advancement callback.
pub trait Tickable {
    /// Called once per frame with the seconds elapsed since the previous frame.
    fn on_tick(&mut self, dt: f32);
}

impl<F: FnMut(f32)> Tickable for F {
    fn on_tick(&mut self, dt: f32) {
        self(dt)
    }
}

/// Handle for unregistering a tickable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickId(u64);

struct TickEntry {
    id: TickId,
    tickable: Box<dyn Tickable>,
}

/// The process-wide list of per-frame subscribers.
///
/// Subscribers are advanced exactly once per [`advance`](Self::advance) call,
/// in registration order. Registration and unregistration are safe at any
/// time; both take effect at the next frame boundary (see the module docs).
///
/// Forgetting to [`unregister`](Self::unregister) a subscriber when its owner
/// is discarded leaks a tick per frame. It does not corrupt anything, but the
/// dead subscriber keeps running; disposal paths must unregister explicitly.
#[derive(Default)]
pub struct TickRegistry {
    active: Vec<TickEntry>,
    staged_adds: Vec<TickEntry>,
    staged_removes: Vec<TickId>,
    next_id: u64,
}

impl TickRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tickable; it will first be ticked in the next frame.
    pub fn register<T: Tickable + 'static>(&mut self, tickable: T) -> TickId {
        let id = TickId(self.next_id);
        self.next_id += 1;
        self.staged_adds.push(TickEntry {
            id,
            tickable: Box::new(tickable),
        });
        id
    }

    /// Unregisters a tickable. Idempotent; unknown ids are ignored.
    ///
    /// The subscriber stops being ticked from the next frame boundary onward.
    pub fn unregister(&mut self, id: TickId) {
        self.staged_removes.push(id);
    }

    /// Advances every active subscriber by `dt`, in registration order,
    /// then applies staged registrations and removals.
    pub fn advance(&mut self, dt: f32) {
        for entry in &mut self.active {
            entry.tickable.on_tick(dt);
        }

        // Frame boundary: staged changes become visible to the next frame.
        if !self.staged_removes.is_empty() {
            let removed = std::mem::take(&mut self.staged_removes);
            self.active.retain(|e| !removed.contains(&e.id));
            self.staged_adds.retain(|e| !removed.contains(&e.id));
        }
        self.active.append(&mut self.staged_adds);
    }

    /// Number of subscribers that will be ticked next frame.
    pub fn len(&self) -> usize {
        self.active.len() + self.staged_adds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interval between pulse decay steps, matching a 60 Hz timer.
pub const PULSE_INTERVAL: f32 = 0.0166;

/// A caller-driven decay timer for cyclical visual emphasis.
///
/// [`trigger`](Self::trigger) snaps the driven value to 1.0; every elapsed
/// fixed interval multiplies it by the reduction factor until
/// [`stop`](Self::stop) is called. This is deliberately not the per-frame
/// clock: the decay rate is tied to the timer interval, not the display
/// refresh.
#[derive(Clone, Copy, Debug)]
pub struct PulseTimer {
    factor: f32,
    interval: f32,
    accumulator: f32,
    value: f32,
    active: bool,
}

impl PulseTimer {
    /// Creates a timer with the given reduction factor in `[0, 1]`,
    /// stepping every [`PULSE_INTERVAL`] seconds.
    pub fn new(factor: f32) -> Self {
        Self::with_interval(factor, PULSE_INTERVAL)
    }

    /// Creates a timer with an explicit step interval in seconds.
    pub fn with_interval(factor: f32, interval: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            interval,
            accumulator: 0.0,
            value: 0.0,
            active: false,
        }
    }

    /// Starts (or restarts) the pulse: value jumps to 1.0 and decay begins.
    pub fn trigger(&mut self) {
        self.value = 1.0;
        self.accumulator = 0.0;
        self.active = true;
    }

    /// Halts decay. The value keeps whatever it decayed to.
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Advances the timer; applies one decay step per fully elapsed interval.
    pub fn advance(&mut self, dt: f32) {
        if !self.active {
            return;
        }
        self.accumulator += dt;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            self.value *= self.factor;
        }
    }

    /// The current driven value.
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Changes the reduction factor for subsequent steps.
    pub fn set_factor(&mut self, factor: f32) {
        self.factor = factor.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn clock_accumulates_and_resets() {
        let mut clock = Clock::new();
        clock.advance(0.5);
        clock.advance(0.25);
        assert!((clock.elapsed() - 0.75).abs() < 1e-6);
        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn first_tick_lands_in_the_next_frame() {
        let mut registry = TickRegistry::new();
        let count = Rc::new(RefCell::new(0u32));

        let c = Rc::clone(&count);
        registry.register(move |_dt: f32| *c.borrow_mut() += 1);

        // Frame N: registered this frame, must not tick.
        registry.advance(1.0);
        assert_eq!(*count.borrow(), 0);

        // Frame N+1: first tick.
        registry.advance(1.0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn ticks_in_registration_order() {
        let mut registry = TickRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let l = Rc::clone(&log);
            registry.register(move |_dt: f32| l.borrow_mut().push(name));
        }

        registry.advance(0.016);
        registry.advance(0.016);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unregister_takes_effect_at_the_next_boundary() {
        let mut registry = TickRegistry::new();
        let count = Rc::new(RefCell::new(0u32));

        let c = Rc::clone(&count);
        let id = registry.register(move |_dt: f32| *c.borrow_mut() += 1);
        registry.advance(1.0); // activates

        registry.unregister(id);
        registry.advance(1.0); // last tick, removal staged mid-frame
        assert_eq!(*count.borrow(), 1);

        registry.advance(1.0);
        registry.advance(1.0);
        assert_eq!(*count.borrow(), 1);

        // Idempotent on unknown/already-removed ids.
        registry.unregister(id);
        registry.advance(1.0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn unregister_before_first_tick_cancels_entirely() {
        let mut registry = TickRegistry::new();
        let count = Rc::new(RefCell::new(0u32));

        let c = Rc::clone(&count);
        let id = registry.register(move |_dt: f32| *c.borrow_mut() += 1);
        registry.unregister(id);

        for _ in 0..3 {
            registry.advance(1.0);
        }
        assert_eq!(*count.borrow(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn pulse_decays_per_interval() {
        let mut pulse = PulseTimer::with_interval(0.7, 0.1);
        pulse.trigger();
        assert_eq!(pulse.value(), 1.0);

        // Three full intervals.
        pulse.advance(0.1);
        pulse.advance(0.1);
        pulse.advance(0.1);
        assert!((pulse.value() - 0.7f32.powi(3)).abs() < 1e-6);

        pulse.stop();
        pulse.advance(1.0);
        assert!((pulse.value() - 0.7f32.powi(3)).abs() < 1e-6);
    }

    #[test]
    fn pulse_accumulates_partial_intervals() {
        let mut pulse = PulseTimer::with_interval(0.5, 0.1);
        pulse.trigger();
        pulse.advance(0.05);
        assert_eq!(pulse.value(), 1.0);
        pulse.advance(0.05);
        assert!((pulse.value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn retrigger_restarts_from_one() {
        let mut pulse = PulseTimer::with_interval(0.7, 0.1);
        pulse.trigger();
        pulse.advance(0.2);
        assert!(pulse.value() < 1.0);
        pulse.trigger();
        assert_eq!(pulse.value(), 1.0);
    }
}
