//! Signal-rate arithmetic: `+~`, `-~`, `*~`, `/~`.
//!
//! The right operand is either a second signal (when a signal connection
//! drives inlet 1) or a scalar set by init argument and float messages. In
//! scalar mode the block is split at each message's sample index, so a float
//! landing mid-block takes effect exactly there.

use std::ops::Range;

use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Runtime, SignalInbox,
};

/// Which operation a [`SigBinop`] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigBinopKind {
    /// `+~`
    Add,
    /// `-~`
    Sub,
    /// `*~`
    Mul,
    /// `/~` — division by zero yields 0.
    Div,
}

impl SigBinopKind {
    /// The patch label for this operation.
    pub fn label(self) -> &'static str {
        match self {
            SigBinopKind::Add => "+~",
            SigBinopKind::Sub => "-~",
            SigBinopKind::Mul => "*~",
            SigBinopKind::Div => "/~",
        }
    }

    #[inline]
    fn apply(self, left: f32, right: f32) -> f32 {
        match self {
            SigBinopKind::Add => left + right,
            SigBinopKind::Sub => left - right,
            SigBinopKind::Mul => left * right,
            SigBinopKind::Div => {
                if right == 0.0 {
                    0.0
                } else {
                    left / right
                }
            }
        }
    }
}

/// A signal-rate binary operator.
pub struct SigBinop {
    kind: SigBinopKind,
    scalar: f32,
    inbox: SignalInbox,
}

impl SigBinop {
    /// The init float seeds the scalar right operand.
    pub fn new(kind: SigBinopKind, init: &Message) -> Self {
        Self {
            kind,
            scalar: init.get_float(0).unwrap_or(0.0),
            inbox: SignalInbox::new(),
        }
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let in0 = ctx.inlet_buffer(0);
        let out = ctx.outlet_buffer(0);
        if ctx.has_signal_source(1) {
            let in1 = ctx.inlet_buffer(1);
            let (a, b, o) = ctx.pool.in2_out(in0, in1, out);
            for i in range {
                o[i] = self.kind.apply(a[i], b[i]);
            }
        } else {
            let (a, o) = ctx.pool.in_out(in0, out);
            for i in range {
                o[i] = self.kind.apply(a[i], self.scalar);
            }
        }
    }
}

impl PatchObject for SigBinop {
    fn label(&self) -> &'static str {
        self.kind.label()
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn receive_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if inlet == 1 && message.is_float(0) {
            self.inbox.push(inlet, message);
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let mut start = 0;
        for (ts, _inlet, message) in pending {
            let split = ctx.index_of(ts);
            self.render(ctx, start..split);
            start = split.max(start);
            if let Some(f) = message.get_float(0) {
                self.scalar = f;
            }
        }
        self.render(ctx, start..block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig_gen::SigConst;
    use crate::sig_io::Dac;
    use crate::testutil::test_engine;
    use telar_core::{Engine, Message};

    fn one_block(engine: &mut Engine) -> Vec<f32> {
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 128];
        engine.process(&input, &mut output);
        output[..64].to_vec()
    }

    #[test]
    fn test_scalar_multiply() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let src = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.5))))
            .unwrap();
        let mul = engine
            .add_object(
                g,
                Box::new(SigBinop::new(SigBinopKind::Mul, &Message::float(0.0, 4.0))),
            )
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(src, 0, mul, 0).unwrap();
        engine.connect(mul, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| (s - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_vector_add() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let a = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.25))))
            .unwrap();
        let b = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.5))))
            .unwrap();
        let add = engine
            .add_object(
                g,
                Box::new(SigBinop::new(SigBinopKind::Add, &Message::new(0.0, vec![]))),
            )
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(a, 0, add, 0).unwrap();
        engine.connect(b, 0, add, 1).unwrap();
        engine.connect(add, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_divide_by_zero_scalar_is_silence() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let src = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 1.0))))
            .unwrap();
        let div = engine
            .add_object(
                g,
                Box::new(SigBinop::new(SigBinopKind::Div, &Message::new(0.0, vec![]))),
            )
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(src, 0, div, 0).unwrap();
        engine.connect(div, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mid_block_scalar_change_splits() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let src = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 1.0))))
            .unwrap();
        let mul = engine
            .add_object(
                g,
                Box::new(SigBinop::new(SigBinopKind::Mul, &Message::float(0.0, 1.0))),
            )
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(src, 0, mul, 0).unwrap();
        engine.connect(mul, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        // Sample 32 of a 64-sample block at 44.1 kHz.
        let ts = 32.0 / 44100.0 * 1000.0;
        engine.deliver(mul, 1, &Message::float(ts, 3.0));
        let out = one_block(&mut engine);
        assert!(out[..32].iter().all(|&s| (s - 1.0).abs() < 1e-6));
        assert!(out[32..].iter().all(|&s| (s - 3.0).abs() < 1e-6));
    }
}
