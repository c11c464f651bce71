//! `pack` and `unpack`: list assembly and disassembly.

use telar_core::{Atom, Message, PatchObject, PortSpec, Runtime};

fn slot_defaults(init: &Message) -> Vec<Atom> {
    let mut slots: Vec<Atom> = init
        .atoms()
        .iter()
        .map(|atom| match atom {
            Atom::Symbol(s) if s.as_str() == "f" => Atom::Float(0.0),
            Atom::Symbol(s) if s.as_str() == "s" => Atom::symbol(""),
            other => other.clone(),
        })
        .collect();
    if slots.is_empty() {
        slots = vec![Atom::Float(0.0), Atom::Float(0.0)];
    }
    slots
}

/// `pack`: collects one atom per inlet and emits them as a list when the
/// hot (leftmost) inlet fires.
pub struct Pack {
    slots: Vec<Atom>,
}

impl Pack {
    /// Init atoms give slot count and defaults; `f`/`s` letters declare
    /// typed slots. A bare `pack` is two floats.
    pub fn new(init: &Message) -> Self {
        Self {
            slots: slot_defaults(init),
        }
    }

    fn store(&mut self, slot: usize, message: &Message) {
        // A list on the hot inlet distributes across slots.
        for (offset, atom) in message.atoms().iter().enumerate() {
            if atom.is_bang() {
                continue;
            }
            if let Some(target) = self.slots.get_mut(slot + offset) {
                *target = atom.clone();
            }
        }
    }
}

impl PatchObject for Pack {
    fn label(&self) -> &'static str {
        "pack"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(self.slots.len(), 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if inlet >= self.slots.len() {
            return;
        }
        self.store(inlet, message);
        if inlet == 0 {
            rt.outlet(0, &Message::new(message.timestamp(), self.slots.clone()));
        }
    }
}

/// `unpack`: distributes list elements to one outlet each, right to left.
pub struct Unpack {
    slots: usize,
}

impl Unpack {
    /// Init atoms give the outlet count. A bare `unpack` is two.
    pub fn new(init: &Message) -> Self {
        Self {
            slots: slot_defaults(init).len(),
        }
    }
}

impl PatchObject for Unpack {
    fn label(&self) -> &'static str {
        "unpack"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, self.slots)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let count = self.slots.min(message.len());
        for outlet in (0..count).rev() {
            if let Some(atom) = message.get(outlet) {
                rt.outlet(
                    outlet,
                    &Message::new(message.timestamp(), vec![atom.clone()]),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Capture, test_engine};

    #[test]
    fn test_pack_then_unpack_is_identity() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let types = Message::new(0.0, vec![Atom::symbol("f"), Atom::symbol("f"), Atom::symbol("f")]);
        let pack = engine.add_object(g, Box::new(Pack::new(&types))).unwrap();
        let unpack = engine.add_object(g, Box::new(Unpack::new(&types))).unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(pack, 0, unpack, 0).unwrap();
        for outlet in 0..3 {
            engine.connect(unpack, outlet, sink, outlet).unwrap();
        }

        engine.deliver(pack, 2, &Message::float(0.0, 3.0));
        engine.deliver(pack, 1, &Message::float(0.0, 2.0));
        engine.deliver(pack, 0, &Message::float(0.0, 1.0));

        let seen = seen.lock().unwrap();
        let mut by_inlet: Vec<(usize, f32)> = seen
            .iter()
            .map(|(inlet, m)| (*inlet, m.get_float(0).unwrap()))
            .collect();
        // Delivery is right-to-left; the value sequence survives intact.
        assert_eq!(by_inlet.remove(0), (2, 3.0));
        assert_eq!(by_inlet.remove(0), (1, 2.0));
        assert_eq!(by_inlet.remove(0), (0, 1.0));
    }

    #[test]
    fn test_pack_hot_inlet_distributes_list() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let pack = engine
            .add_object(g, Box::new(Pack::new(&Message::new(0.0, vec![]))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(pack, 0, sink, 0).unwrap();

        engine.deliver(
            pack,
            0,
            &Message::new(0.0, vec![Atom::Float(5.0), Atom::Float(6.0)]),
        );
        assert_eq!(seen.lock().unwrap()[0].1.to_string(), "5 6");
    }
}
