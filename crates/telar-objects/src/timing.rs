//! Clock-driven objects: all timing flows through the engine's central
//! message queue; none of these spawn anything.

use telar_core::{Message, PatchObject, PendingHandle, PortSpec, Runtime};

/// `delay` / `del`: emits a bang a fixed time after being banged.
pub struct Delay {
    interval_ms: f64,
    pending: Option<PendingHandle>,
}

impl Delay {
    /// The init float sets the delay time in ms.
    pub fn new(init: &Message) -> Self {
        Self {
            interval_ms: f64::from(init.get_float(0).unwrap_or(0.0)).max(0.0),
            pending: None,
        }
    }

    fn arm(&mut self, at: f64, rt: &mut Runtime<'_>) {
        if let Some(handle) = self.pending.take() {
            rt.cancel(handle);
        }
        self.pending = Some(rt.schedule(0, at, Message::bang(at)));
    }
}

impl PatchObject for Delay {
    fn label(&self) -> &'static str {
        "delay"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if message.is_symbol(0, "stop") {
                    if let Some(handle) = self.pending.take() {
                        rt.cancel(handle);
                    }
                    return;
                }
                if let Some(f) = message.get_float(0) {
                    self.interval_ms = f64::from(f).max(0.0);
                } else if !message.is_bang(0) {
                    return;
                }
                self.arm(message.timestamp() + self.interval_ms, rt);
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.interval_ms = f64::from(f).max(0.0);
                }
            }
            _ => {}
        }
    }

    fn deliver_scheduled(&mut self, outlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        self.pending = None;
        rt.outlet(outlet, message);
    }
}

/// `pipe`: delays each incoming float individually; many can be in flight.
pub struct Pipe {
    interval_ms: f64,
    pending: Vec<PendingHandle>,
}

impl Pipe {
    /// The init float sets the pipe time in ms.
    pub fn new(init: &Message) -> Self {
        Self {
            interval_ms: f64::from(init.get_float(0).unwrap_or(0.0)).max(0.0),
            pending: Vec::new(),
        }
    }
}

impl PatchObject for Pipe {
    fn label(&self) -> &'static str {
        "pipe"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if message.is_symbol(0, "clear") {
                    for handle in self.pending.drain(..) {
                        rt.cancel(handle);
                    }
                    return;
                }
                if message.get_float(0).is_some() || message.is_bang(0) {
                    let at = message.timestamp() + self.interval_ms;
                    self.pending.push(rt.schedule(0, at, message.at(at)));
                }
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.interval_ms = f64::from(f).max(0.0);
                }
            }
            _ => {}
        }
    }

    fn deliver_scheduled(&mut self, outlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        // Handles of delivered messages are stale; drop one marker.
        self.pending.pop();
        rt.outlet(outlet, message);
    }
}

/// `metro`: periodic bangs while running. The first bang fires immediately
/// on start, then every interval.
pub struct Metro {
    interval_ms: f64,
    pending: Option<PendingHandle>,
}

impl Metro {
    /// The init float sets the period in ms, floored at 1 ms so a zero
    /// period cannot flood the queue.
    pub fn new(init: &Message) -> Self {
        Self {
            interval_ms: f64::from(init.get_float(0).unwrap_or(1000.0)).max(1.0),
            pending: None,
        }
    }

    fn stop(&mut self, rt: &mut Runtime<'_>) {
        if let Some(handle) = self.pending.take() {
            rt.cancel(handle);
        }
    }
}

impl PatchObject for Metro {
    fn label(&self) -> &'static str {
        "metro"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                let start = if message.is_bang(0) || message.is_symbol(0, "start") {
                    true
                } else if message.is_symbol(0, "stop") {
                    false
                } else if let Some(f) = message.get_float(0) {
                    f != 0.0
                } else {
                    return;
                };
                self.stop(rt);
                if start {
                    // First tick lands on the start timestamp itself.
                    let at = message.timestamp();
                    self.pending = Some(rt.schedule(0, at, Message::bang(at)));
                }
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.interval_ms = f64::from(f).max(1.0);
                }
            }
            _ => {}
        }
    }

    fn deliver_scheduled(&mut self, outlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        // Re-arm before emitting so a handler stopping the metro cancels the
        // tick scheduled here, not a stale handle.
        let next = message.timestamp() + self.interval_ms;
        self.pending = Some(rt.schedule(0, next, Message::bang(next)));
        rt.outlet(outlet, message);
    }
}

/// `timer`: measures elapsed logical time between two bangs.
pub struct Timer {
    started_at: f64,
}

impl Timer {
    /// Creates a timer starting at the epoch.
    pub fn new() -> Self {
        Self { started_at: 0.0 }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for Timer {
    fn label(&self) -> &'static str {
        "timer"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 if message.is_bang(0) => self.started_at = message.timestamp(),
            1 if message.is_bang(0) => {
                let elapsed = message.timestamp() - self.started_at;
                rt.outlet(0, &Message::float(message.timestamp(), elapsed as f32));
            }
            _ => {}
        }
    }
}

/// Interpolation grain of the message-rate `line`, in ms.
const LINE_GRAIN_MS: f64 = 20.0;

/// `line`: message-rate ramp generator. `[target, time(` ramps with a
/// ~20 ms grain; a bare float jumps immediately.
pub struct Line {
    value: f64,
    target: f64,
    ramp_start_value: f64,
    ramp_start: f64,
    ramp_end: f64,
    next_time_ms: f64,
    pending: Option<PendingHandle>,
}

impl Line {
    /// The init float seeds the current value.
    pub fn new(init: &Message) -> Self {
        let value = f64::from(init.get_float(0).unwrap_or(0.0));
        Self {
            value,
            target: value,
            ramp_start_value: value,
            ramp_start: 0.0,
            ramp_end: 0.0,
            next_time_ms: 0.0,
            pending: None,
        }
    }

    fn cancel_ramp(&mut self, rt: &mut Runtime<'_>) {
        if let Some(handle) = self.pending.take() {
            rt.cancel(handle);
        }
    }

    fn arm_tick(&mut self, now: f64, rt: &mut Runtime<'_>) {
        let at = (now + LINE_GRAIN_MS).min(self.ramp_end);
        self.pending = Some(rt.schedule(0, at, Message::bang(at)));
    }
}

impl PatchObject for Line {
    fn label(&self) -> &'static str {
        "line"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                let Some(target) = message.get_float(0) else {
                    return;
                };
                let time_ms = message
                    .get_float(1)
                    .map_or(self.next_time_ms, f64::from);
                self.next_time_ms = 0.0;
                self.cancel_ramp(rt);
                let now = message.timestamp();
                if time_ms <= 0.0 {
                    self.value = f64::from(target);
                    self.target = self.value;
                    rt.outlet(0, &Message::float(now, target));
                    return;
                }
                self.target = f64::from(target);
                self.ramp_start_value = self.value;
                self.ramp_start = now;
                self.ramp_end = now + time_ms;
                self.arm_tick(now, rt);
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.next_time_ms = f64::from(f);
                }
            }
            _ => {}
        }
    }

    fn deliver_scheduled(&mut self, _outlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let now = message.timestamp();
        if now >= self.ramp_end {
            self.pending = None;
            self.value = self.target;
            rt.outlet(0, &Message::float(now, self.target as f32));
            return;
        }
        let span = self.ramp_end - self.ramp_start;
        let progress = (now - self.ramp_start) / span;
        self.value = self.ramp_start_value + (self.target - self.ramp_start_value) * progress;
        self.arm_tick(now, rt);
        rt.outlet(0, &Message::float(now, self.value as f32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Capture, floats, test_engine};

    fn process_blocks(engine: &mut telar_core::Engine, blocks: usize) {
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 128];
        for _ in 0..blocks {
            engine.process(&input, &mut output);
        }
    }

    #[test]
    fn test_delay_fires_after_interval() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        // 64 samples at 44.1 kHz is ~1.45 ms per block.
        let delay = engine
            .add_object(g, Box::new(Delay::new(&Message::float(0.0, 5.0))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(delay, 0, sink, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(delay, 0, &Message::bang(0.0));
        process_blocks(&mut engine, 3); // ~4.35 ms: not yet
        assert!(seen.lock().unwrap().is_empty());
        process_blocks(&mut engine, 1); // ~5.8 ms: fired
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_delay_rebang_resets() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let delay = engine
            .add_object(g, Box::new(Delay::new(&Message::float(0.0, 5.0))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(delay, 0, sink, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(delay, 0, &Message::bang(0.0));
        engine.deliver(delay, 0, &Message::bang(2.0)); // restart: now due at t=7
        process_blocks(&mut engine, 4); // ~5.8 ms: the cancelled t=5 tick is gone
        assert!(seen.lock().unwrap().is_empty());
        process_blocks(&mut engine, 1); // ~7.3 ms
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_metro_cadence() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let metro = engine
            .add_object(g, Box::new(Metro::new(&Message::float(0.0, 10.0))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(metro, 0, sink, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(metro, 0, &Message::bang(0.0));
        // ~1.4512 ms per block; 21 blocks is ~30.5 ms: ticks at 0, 10, 20, 30.
        process_blocks(&mut engine, 21);
        assert_eq!(seen.lock().unwrap().len(), 4);

        engine.deliver(metro, 0, &Message::symbol(engine.block_start(), "stop"));
        process_blocks(&mut engine, 21);
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_timer_measures_elapsed() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let timer = engine.add_object(g, Box::new(Timer::new())).unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(timer, 0, sink, 0).unwrap();

        engine.deliver(timer, 0, &Message::bang(100.0));
        engine.deliver(timer, 1, &Message::bang(350.0));
        assert_eq!(floats(&seen), vec![250.0]);
    }

    #[test]
    fn test_line_ramps_to_target() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let line = engine
            .add_object(g, Box::new(Line::new(&Message::new(0.0, vec![]))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(line, 0, sink, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(
            line,
            0,
            &Message::new(
                0.0,
                vec![telar_core::Atom::Float(100.0), telar_core::Atom::Float(100.0)],
            ),
        );
        process_blocks(&mut engine, 80); // ~116 ms, well past the ramp
        let values = floats(&seen);
        assert!(!values.is_empty());
        // Monotone non-decreasing and ends exactly on target.
        for pair in values.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(*values.last().unwrap(), 100.0);
    }
}
