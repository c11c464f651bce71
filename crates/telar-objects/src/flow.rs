//! Control-flow objects: fan-out, matching, gating.

use telar_core::{Atom, Message, PatchObject, PortSpec, Runtime};

/// One output slot of a `trigger`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TriggerSlot {
    Bang,
    Float,
    Symbol,
    /// `a` / `l`: pass the input through unchanged.
    Anything,
}

/// `trigger` / `t`: distributes one input over several outlets, right to
/// left, converting per slot type.
pub struct Trigger {
    slots: Vec<TriggerSlot>,
}

impl Trigger {
    /// Parses slot letters from the init message (`b`, `f`, `s`, `a`, `l`);
    /// unknown letters fall back to `anything`. A bare `trigger` gets two
    /// bang slots.
    pub fn new(init: &Message) -> Self {
        let mut slots: Vec<TriggerSlot> = init
            .atoms()
            .iter()
            .map(|atom| match atom {
                Atom::Symbol(s) => match s.as_str() {
                    "b" | "bang" => TriggerSlot::Bang,
                    "f" | "float" => TriggerSlot::Float,
                    "s" | "symbol" => TriggerSlot::Symbol,
                    _ => TriggerSlot::Anything,
                },
                Atom::Float(_) => TriggerSlot::Float,
                Atom::Bang => TriggerSlot::Bang,
            })
            .collect();
        if slots.is_empty() {
            slots = vec![TriggerSlot::Bang, TriggerSlot::Bang];
        }
        Self { slots }
    }
}

impl PatchObject for Trigger {
    fn label(&self) -> &'static str {
        "trigger"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, self.slots.len())
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let ts = message.timestamp();
        for outlet in (0..self.slots.len()).rev() {
            match self.slots[outlet] {
                TriggerSlot::Bang => rt.outlet(outlet, &Message::bang(ts)),
                TriggerSlot::Float => {
                    let f = message.get_float(0).unwrap_or(0.0);
                    rt.outlet(outlet, &Message::float(ts, f));
                }
                TriggerSlot::Symbol => {
                    if let Some(s) = message.get_symbol(0) {
                        rt.outlet(outlet, &Message::symbol(ts, s.as_str()));
                    }
                }
                TriggerSlot::Anything => rt.outlet(outlet, message),
            }
        }
    }
}

/// `select` / `sel`: bangs the outlet whose stored value matches the input;
/// everything else passes out the rightmost outlet.
pub struct Select {
    values: Vec<Atom>,
}

impl Select {
    /// Stores the init atoms as match values (a bare `select` matches 0).
    pub fn new(init: &Message) -> Self {
        let mut values = init.atoms().to_vec();
        if values.is_empty() {
            values.push(Atom::Float(0.0));
        }
        Self { values }
    }
}

impl PatchObject for Select {
    fn label(&self) -> &'static str {
        "select"
    }

    fn ports(&self) -> PortSpec {
        // A single-value select exposes a second inlet to replace the value.
        let inlets = if self.values.len() == 1 { 2 } else { 1 };
        PortSpec::new(inlets, self.values.len() + 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if inlet == 1 {
            if let Some(atom) = message.get(0) {
                self.values[0] = atom.clone();
            }
            return;
        }
        let Some(input) = message.get(0) else { return };
        for (i, value) in self.values.iter().enumerate() {
            if value == input {
                rt.outlet(i, &Message::bang(message.timestamp()));
                return;
            }
        }
        rt.outlet(self.values.len(), message);
    }
}

/// `route`: matches the first atom and passes the rest of the message out
/// the matching outlet; non-matches pass whole out the rightmost outlet.
pub struct Route {
    values: Vec<Atom>,
}

impl Route {
    /// Stores the init atoms as routing keys.
    pub fn new(init: &Message) -> Self {
        let mut values = init.atoms().to_vec();
        if values.is_empty() {
            values.push(Atom::Float(0.0));
        }
        Self { values }
    }
}

impl PatchObject for Route {
    fn label(&self) -> &'static str {
        "route"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, self.values.len() + 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let Some(head) = message.get(0) else { return };
        for (i, value) in self.values.iter().enumerate() {
            if value == head {
                let rest: Vec<Atom> = message.atoms()[1..].to_vec();
                let out = if rest.is_empty() {
                    Message::bang(message.timestamp())
                } else {
                    Message::new(message.timestamp(), rest)
                };
                rt.outlet(i, &out);
                return;
            }
        }
        rt.outlet(self.values.len(), message);
    }
}

/// `moses`: floats below the threshold go left, the rest go right.
pub struct Moses {
    threshold: f32,
}

impl Moses {
    /// The init float sets the threshold (default 0).
    pub fn new(init: &Message) -> Self {
        Self {
            threshold: init.get_float(0).unwrap_or(0.0),
        }
    }
}

impl PatchObject for Moses {
    fn label(&self) -> &'static str {
        "moses"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 2)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if let Some(f) = message.get_float(0) {
                    let outlet = usize::from(f >= self.threshold);
                    rt.outlet(outlet, message);
                }
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.threshold = f;
                }
            }
            _ => {}
        }
    }
}

/// `spigot`: passes messages while the control inlet holds nonzero.
pub struct Spigot {
    open: bool,
}

impl Spigot {
    /// The init float sets the initial gate state.
    pub fn new(init: &Message) -> Self {
        Self {
            open: init.get_float(0).unwrap_or(0.0) != 0.0,
        }
    }
}

impl PatchObject for Spigot {
    fn label(&self) -> &'static str {
        "spigot"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 if self.open => rt.outlet(0, message),
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.open = f != 0.0;
                }
            }
            _ => {}
        }
    }
}

/// `change`: forwards floats only when they differ from the previous one.
pub struct Change {
    last: Option<f32>,
}

impl Change {
    /// The init float seeds the comparison value.
    pub fn new(init: &Message) -> Self {
        Self {
            last: init.get_float(0),
        }
    }
}

impl PatchObject for Change {
    fn label(&self) -> &'static str {
        "change"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if message.is_bang(0) {
            if let Some(last) = self.last {
                rt.outlet(0, &Message::float(message.timestamp(), last));
            }
            return;
        }
        if let Some(f) = message.get_float(0)
            && self.last != Some(f)
        {
            self.last = Some(f);
            rt.outlet(0, &Message::float(message.timestamp(), f));
        }
    }
}

/// `swap`: exchanges its two operands, right outlet first.
pub struct Swap {
    right: f32,
}

impl Swap {
    /// The init float seeds the right operand.
    pub fn new(init: &Message) -> Self {
        Self {
            right: init.get_float(0).unwrap_or(0.0),
        }
    }
}

impl PatchObject for Swap {
    fn label(&self) -> &'static str {
        "swap"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 2)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if let Some(f) = message.get_float(0) {
                    rt.outlet(1, &Message::float(message.timestamp(), f));
                    rt.outlet(0, &Message::float(message.timestamp(), self.right));
                }
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.right = f;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Capture, test_engine};
    use telar_core::Message;

    #[test]
    fn test_trigger_fires_right_to_left() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let t = engine
            .add_object(
                g,
                Box::new(Trigger::new(&Message::new(
                    0.0,
                    vec![Atom::symbol("b"), Atom::symbol("f")],
                ))),
            )
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(t, 0, sink, 0).unwrap();
        engine.connect(t, 1, sink, 1).unwrap();

        engine.deliver(t, 0, &Message::float(0.0, 3.0));
        let seen = seen.lock().unwrap();
        // Right outlet (inlet 1 of the capture) first.
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[0].1.get_float(0), Some(3.0));
        assert_eq!(seen[1].0, 0);
        assert!(seen[1].1.is_bang(0));
    }

    #[test]
    fn test_select_matches_and_falls_through() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let sel = engine
            .add_object(
                g,
                Box::new(Select::new(&Message::new(
                    0.0,
                    vec![Atom::Float(1.0), Atom::Float(2.0)],
                ))),
            )
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        for outlet in 0..3 {
            engine.connect(sel, outlet, sink, outlet).unwrap();
        }

        engine.deliver(sel, 0, &Message::float(0.0, 2.0));
        engine.deliver(sel, 0, &Message::float(0.0, 9.0));
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, 1);
        assert!(seen[0].1.is_bang(0));
        assert_eq!(seen[1].0, 2);
        assert_eq!(seen[1].1.get_float(0), Some(9.0));
    }

    #[test]
    fn test_route_strips_matched_head() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let route = engine
            .add_object(
                g,
                Box::new(Route::new(&Message::new(0.0, vec![Atom::symbol("freq")]))),
            )
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(route, 0, sink, 0).unwrap();
        engine.connect(route, 1, sink, 1).unwrap();

        engine.deliver(
            route,
            0,
            &Message::new(0.0, vec![Atom::symbol("freq"), Atom::Float(440.0)]),
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[0].1.get_float(0), Some(440.0));
    }

    #[test]
    fn test_moses_splits_at_threshold() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let moses = engine
            .add_object(g, Box::new(Moses::new(&Message::float(0.0, 5.0))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(moses, 0, sink, 0).unwrap();
        engine.connect(moses, 1, sink, 1).unwrap();

        engine.deliver(moses, 0, &Message::float(0.0, 4.9));
        engine.deliver(moses, 0, &Message::float(0.0, 5.0));
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[1].0, 1);
    }

    #[test]
    fn test_spigot_gates() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let spigot = engine
            .add_object(g, Box::new(Spigot::new(&Message::new(0.0, vec![]))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(spigot, 0, sink, 0).unwrap();

        engine.deliver(spigot, 0, &Message::float(0.0, 1.0)); // closed
        engine.deliver(spigot, 1, &Message::float(0.0, 1.0)); // open
        engine.deliver(spigot, 0, &Message::float(0.0, 2.0));
        assert_eq!(crate::testutil::floats(&seen), vec![2.0]);
    }

    #[test]
    fn test_change_suppresses_repeats() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let change = engine
            .add_object(g, Box::new(Change::new(&Message::new(0.0, vec![]))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(change, 0, sink, 0).unwrap();

        for v in [1.0, 1.0, 2.0, 2.0, 1.0] {
            engine.deliver(change, 0, &Message::float(0.0, v));
        }
        assert_eq!(crate::testutil::floats(&seen), vec![1.0, 2.0, 1.0]);
    }
}
