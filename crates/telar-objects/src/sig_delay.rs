//! Named delay lines: `delwrite~`, `delread~`, `vd~`.
//!
//! The line itself lives in the engine registry; the writer deposits one
//! block per pass and readers address samples relative to the write head.
//! Writers are ordered before readers, so a `delread~` sees the current
//! block once the delay time reaches into written territory. In feedback
//! loops the reader sits upstream of the writer and reads the previous
//! block, which is the one-block feedback latency delay loops always have.

use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Registration, Runtime, Symbol,
};

fn name_of(init: &Message) -> Symbol {
    init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new(""))
}

/// `delwrite~ name length-ms`: owns the named delay line and writes its
/// inlet into it each block.
pub struct DelayWriter {
    name: Symbol,
    length_ms: f64,
}

impl DelayWriter {
    /// Init: endpoint name and line length in ms.
    pub fn new(init: &Message) -> Self {
        Self {
            name: name_of(init),
            length_ms: f64::from(init.get_float(1).unwrap_or(0.0)).max(1.0),
        }
    }
}

impl PatchObject for DelayWriter {
    fn label(&self) -> &'static str {
        "delwrite~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 0)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::DelayWrite(self.name.clone(), self.length_ms))
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let input = ctx.inlet_buffer(0);
        if let Some(line) = ctx.registry.delay_line_mut(&self.name) {
            line.write_block(ctx.pool.read(input));
        }
    }
}

/// `delread~ name delay-ms`: reads the named line at a fixed delay,
/// quantized to whole samples. The delay time is a message parameter.
pub struct DelayRead {
    name: Symbol,
    delay_ms: f32,
}

impl DelayRead {
    /// Init: endpoint name and delay in ms.
    pub fn new(init: &Message) -> Self {
        Self {
            name: name_of(init),
            delay_ms: init.get_float(1).unwrap_or(0.0).max(0.0),
        }
    }
}

impl PatchObject for DelayRead {
    fn label(&self) -> &'static str {
        "delread~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
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

    fn process_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if inlet == 0
            && let Some(f) = message.get_float(0)
        {
            self.delay_ms = f.max(0.0);
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let out = ctx.outlet_buffer(0);
        let delay_samples = (self.delay_ms / 1000.0 * ctx.sample_rate()).round() as usize;
        match ctx.registry.delay_line(&self.name) {
            Some(line) => line.read_block(delay_samples, ctx.pool.write(out)),
            None => ctx.pool.clear(out),
        }
    }
}

/// `vd~ name`: reads the named line at a signal-rate delay given in ms,
/// with linear interpolation between samples.
pub struct VariableDelay {
    name: Symbol,
}

impl VariableDelay {
    /// The init symbol names the delay line.
    pub fn new(init: &Message) -> Self {
        Self { name: name_of(init) }
    }
}

impl PatchObject for VariableDelay {
    fn label(&self) -> &'static str {
        "vd~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let in_buf = ctx.inlet_buffer(0);
        let out_buf = ctx.outlet_buffer(0);
        let sr = ctx.sample_rate();
        let block = ctx.block_size();
        match ctx.registry.delay_line(&self.name) {
            Some(line) => {
                let (delay_ms, out) = ctx.pool.in_out(in_buf, out_buf);
                for i in 0..block {
                    let delay_samples = (delay_ms[i] / 1000.0 * sr).max(0.0);
                    out[i] = line.read_fractional(block, i, delay_samples);
                }
            }
            None => ctx.pool.clear(out_buf),
        }
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

    /// Builds `sig~ 1 → delwrite~ d 100` and `delread~ d <delay> → dac~`.
    fn delay_patch(delay_ms: f32) -> telar_core::Engine {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let src = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 1.0))))
            .unwrap();
        let write = engine
            .add_object(
                g,
                Box::new(DelayWriter::new(&Message::new(
                    0.0,
                    vec![telar_core::Atom::symbol("d"), telar_core::Atom::Float(100.0)],
                ))),
            )
            .unwrap();
        let read = engine
            .add_object(
                g,
                Box::new(DelayRead::new(&Message::new(
                    0.0,
                    vec![
                        telar_core::Atom::symbol("d"),
                        telar_core::Atom::Float(delay_ms),
                    ],
                ))),
            )
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(src, 0, write, 0).unwrap();
        engine.connect(read, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();
        engine
    }

    #[test]
    fn test_delread_before_delay_elapses_is_silent() {
        let mut engine = delay_patch(50.0);
        // 50 ms at 44.1 kHz is 2205 samples; a 64-sample block is silent.
        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_delread_after_delay_elapses_carries_signal() {
        let mut engine = delay_patch(50.0);
        // 50 ms / 1.45 ms per block: the boundary falls in block 34.
        let blocks_needed = (50.0f64 / (64.0 / 44.1)).ceil() as usize + 1;
        let mut last = Vec::new();
        for _ in 0..blocks_needed {
            last = one_block(&mut engine);
        }
        assert_eq!(*last.last().unwrap(), 1.0);
    }

    #[test]
    fn test_zero_delay_reads_current_block() {
        let mut engine = delay_patch(0.0);
        // Writer runs before reader, so a zero delay sees this block.
        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_missing_delay_line_is_silent() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let read = engine
            .add_object(
                g,
                Box::new(DelayRead::new(&Message::symbol(0.0, "ghost"))),
            )
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(read, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();
        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
