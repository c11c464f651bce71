//! `line~`: signal-rate linear ramp generator.

use std::ops::Range;

use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Runtime, SignalInbox,
};

/// `line~` ramps to a target over a time given in ms; a bare float jumps.
/// Retargeting mid-block is sample-accurate.
pub struct LineSig {
    value: f32,
    increment: f32,
    remaining: usize,
    next_time_ms: f32,
    inbox: SignalInbox,
}

impl LineSig {
    /// Creates the ramp at 0.
    pub fn new() -> Self {
        Self {
            value: 0.0,
            increment: 0.0,
            remaining: 0,
            next_time_ms: 0.0,
            inbox: SignalInbox::new(),
        }
    }

    fn retarget(&mut self, target: f32, time_ms: f32, sample_rate: f32) {
        if time_ms <= 0.0 {
            self.value = target;
            self.remaining = 0;
            self.increment = 0.0;
            return;
        }
        let samples = (time_ms / 1000.0 * sample_rate).round().max(1.0) as usize;
        self.increment = (target - self.value) / samples as f32;
        self.remaining = samples;
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let out_id = ctx.outlet_buffer(0);
        let out = ctx.pool.write(out_id);
        for sample in &mut out[range] {
            if self.remaining > 0 {
                self.value += self.increment;
                self.remaining -= 1;
            }
            *sample = self.value;
        }
    }
}

impl Default for LineSig {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for LineSig {
    fn label(&self) -> &'static str {
        "line~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn is_root(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn receive_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if message.is_float(0) {
            self.inbox.push(inlet, message);
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let sr = ctx.sample_rate();
        let mut start = 0;
        for (ts, inlet, message) in pending {
            let split = ctx.index_of(ts);
            self.render(ctx, start..split);
            start = split.max(start);
            match inlet {
                0 => {
                    if let Some(target) = message.get_float(0) {
                        let time = message.get_float(1).unwrap_or(self.next_time_ms);
                        self.next_time_ms = 0.0;
                        self.retarget(target, time, sr);
                    }
                }
                1 => {
                    if let Some(t) = message.get_float(0) {
                        self.next_time_ms = t;
                    }
                }
                _ => {}
            }
        }
        self.render(ctx, start..block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig_io::Dac;
    use crate::testutil::test_engine;
    use telar_core::{Atom, Engine, Message};

    fn one_block(engine: &mut Engine) -> Vec<f32> {
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 128];
        engine.process(&input, &mut output);
        output[..64].to_vec()
    }

    #[test]
    fn test_jump_without_time() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let line = engine.add_object(g, Box::new(LineSig::new())).unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(line, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(line, 0, &Message::float(0.0, 0.8));
        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| (s - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_ramp_reaches_target_linearly() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let line = engine.add_object(g, Box::new(LineSig::new())).unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(line, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        // 64 samples at 44.1 kHz is ~1.45125 ms: ramp over exactly one block.
        let time_ms = 64.0 / 44.1;
        engine.deliver(
            line,
            0,
            &Message::new(0.0, vec![Atom::Float(1.0), Atom::Float(time_ms)]),
        );
        let out = one_block(&mut engine);
        // Linear climb, final sample on target.
        assert!((out[63] - 1.0).abs() < 1e-5);
        assert!((out[31] - 0.5).abs() < 0.02);
        for pair in out.windows(2) {
            assert!(pair[1] >= pair[0]);
        }

        // Holds the target afterwards.
        let next = one_block(&mut engine);
        assert!(next.iter().all(|&s| (s - 1.0).abs() < 1e-5));
    }
}
