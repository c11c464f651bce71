//! MIDI-domain objects: note input, velocity gating, pitch conversion.

use libm::{log2f, powf};
use telar_core::{Message, PatchObject, PortSpec, Registration, Runtime, Symbol};

/// `notein`: receives notes injected through the engine's MIDI entry point.
///
/// Without an argument it listens omni (`zg_notein_omni`) and exposes a
/// channel outlet; with a channel argument it listens on
/// `zg_notein_<channel>` and drops the channel outlet.
pub struct Notein {
    channel: Option<u8>,
}

impl Notein {
    /// The init float selects a channel (0..15); absent means omni.
    pub fn new(init: &Message) -> Self {
        Self {
            channel: init.get_float(0).map(|f| f as u8),
        }
    }
}

impl PatchObject for Notein {
    fn label(&self) -> &'static str {
        "notein"
    }

    fn ports(&self) -> PortSpec {
        let outlets = if self.channel.is_some() { 2 } else { 3 };
        PortSpec::new(1, outlets)
    }

    fn is_root(&self) -> bool {
        true
    }

    fn registration(&self) -> Option<Registration> {
        let name = match self.channel {
            Some(channel) => format!("zg_notein_{channel}"),
            None => String::from("zg_notein_omni"),
        };
        Some(Registration::MessageReceive(Symbol::new(name)))
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let (Some(note), Some(velocity)) = (message.get_float(0), message.get_float(1)) else {
            return;
        };
        let ts = message.timestamp();
        if self.channel.is_none() {
            let channel = message.get_float(2).unwrap_or(0.0);
            rt.outlet(2, &Message::float(ts, channel));
        }
        rt.outlet(1, &Message::float(ts, velocity));
        rt.outlet(0, &Message::float(ts, note));
    }
}

/// `stripnote`: passes note/velocity pairs only for note-ons (velocity > 0).
pub struct StripNote {
    velocity: f32,
}

impl StripNote {
    /// Creates the object.
    pub fn new() -> Self {
        Self { velocity: 0.0 }
    }
}

impl Default for StripNote {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for StripNote {
    fn label(&self) -> &'static str {
        "stripnote"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 2)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                let Some(note) = message.get_float(0) else {
                    return;
                };
                // A pair on the left inlet carries its own velocity.
                if let Some(velocity) = message.get_float(1) {
                    self.velocity = velocity;
                }
                if self.velocity > 0.0 {
                    let ts = message.timestamp();
                    rt.outlet(1, &Message::float(ts, self.velocity));
                    rt.outlet(0, &Message::float(ts, note));
                }
            }
            1 => {
                if let Some(velocity) = message.get_float(0) {
                    self.velocity = velocity;
                }
            }
            _ => {}
        }
    }
}

/// `mtof`: MIDI note number to frequency in Hz.
pub struct MidiToFreq;

impl PatchObject for MidiToFreq {
    fn label(&self) -> &'static str {
        "mtof"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if let Some(note) = message.get_float(0) {
            let freq = 440.0 * powf(2.0, (note - 69.0) / 12.0);
            rt.outlet(0, &Message::float(message.timestamp(), freq));
        }
    }
}

/// `ftom`: frequency in Hz to MIDI note number; non-positive input yields
/// -1500.
pub struct FreqToMidi;

impl PatchObject for FreqToMidi {
    fn label(&self) -> &'static str {
        "ftom"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if let Some(freq) = message.get_float(0) {
            let note = if freq > 0.0 {
                69.0 + 12.0 * log2f(freq / 440.0)
            } else {
                -1500.0
            };
            rt.outlet(0, &Message::float(message.timestamp(), note));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Capture, floats, test_engine};
    use proptest::prelude::*;

    #[test]
    fn test_mtof_concert_pitch() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let mtof = engine.add_object(g, Box::new(MidiToFreq)).unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(mtof, 0, sink, 0).unwrap();

        engine.deliver(mtof, 0, &Message::float(0.0, 69.0));
        let values = floats(&seen);
        assert!((values[0] - 440.0).abs() < 1e-3);
    }

    #[test]
    fn test_stripnote_drops_note_offs() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let strip = engine.add_object(g, Box::new(StripNote::new())).unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(strip, 0, sink, 0).unwrap();
        engine.connect(strip, 1, sink, 1).unwrap();

        engine.deliver(strip, 1, &Message::float(0.0, 0.0));
        engine.deliver(strip, 0, &Message::float(0.0, 60.0)); // note-off: dropped
        engine.deliver(strip, 1, &Message::float(0.0, 100.0));
        engine.deliver(strip, 0, &Message::float(0.0, 60.0)); // note-on: passes
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[0].1.get_float(0), Some(100.0));
        assert_eq!(seen[1].0, 0);
        assert_eq!(seen[1].1.get_float(0), Some(60.0));
    }

    #[test]
    fn test_notein_routes_from_midi_entry_point() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let notein = engine
            .add_object(g, Box::new(Notein::new(&Message::new(0.0, vec![]))))
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        for outlet in 0..3 {
            engine.connect(notein, outlet, sink, outlet).unwrap();
        }
        engine.attach_graph(g).unwrap();

        engine.send_midi_note(3, 64, 90, 0.0);
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 128];
        engine.process(&input, &mut output);

        let seen = seen.lock().unwrap();
        // channel, velocity, note — right to left.
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].1.get_float(0), Some(3.0));
        assert_eq!(seen[1].1.get_float(0), Some(90.0));
        assert_eq!(seen[2].1.get_float(0), Some(64.0));
    }

    proptest! {
        #[test]
        fn prop_mtof_ftom_round_trip(note in 0u8..=127) {
            let freq = 440.0 * powf(2.0, (f32::from(note) - 69.0) / 12.0);
            let back = 69.0 + 12.0 * log2f(freq / 440.0);
            prop_assert!((back - f32::from(note)).abs() < 1e-3);
        }
    }
}
