//! Long-range signal wires: `send~`/`receive~` and `throw~`/`catch~`.
//!
//! None of these connect through graph edges. They register named endpoints
//! with the engine, which aliases buffers (`send~`/`receive~`) or sums them
//! (`throw~`/`catch~`). That registration is also what breaks feedback
//! cycles out of the signal DAG.

use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Registration, Symbol,
};

fn name_of(init: &Message) -> Symbol {
    init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new(""))
}

/// `send~` / `s~`: publishes its inlet buffer under a name. Duplicate names
/// are rejected at registration with a console error.
pub struct DspSend {
    name: Symbol,
}

impl DspSend {
    /// The init symbol is the endpoint name.
    pub fn new(init: &Message) -> Self {
        Self { name: name_of(init) }
    }
}

impl PatchObject for DspSend {
    fn label(&self) -> &'static str {
        "send~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 0)
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::DspSend(self.name.clone()))
    }
}

/// `receive~` / `r~`: its outlet aliases the same-named `send~` input
/// buffer; unbound it reads as silence. Costs nothing per block.
pub struct DspReceive {
    name: Symbol,
}

impl DspReceive {
    /// The init symbol is the endpoint name.
    pub fn new(init: &Message) -> Self {
        Self { name: name_of(init) }
    }
}

impl PatchObject for DspReceive {
    fn label(&self) -> &'static str {
        "receive~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, 1)
    }

    fn is_root(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::DspReceive(self.name.clone()))
    }
}

/// `throw~`: contributes its inlet buffer to the same-named `catch~` sum.
pub struct Throw {
    name: Symbol,
}

impl Throw {
    /// The init symbol is the endpoint name.
    pub fn new(init: &Message) -> Self {
        Self { name: name_of(init) }
    }
}

impl PatchObject for Throw {
    fn label(&self) -> &'static str {
        "throw~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 0)
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::DspThrow(self.name.clone()))
    }
}

/// `catch~`: sums every same-named `throw~` buffer each block. No throws
/// means silence; one means a copy; several accumulate.
pub struct Catch {
    name: Symbol,
}

impl Catch {
    /// The init symbol is the endpoint name. Duplicate catches are rejected
    /// at registration.
    pub fn new(init: &Message) -> Self {
        Self { name: name_of(init) }
    }
}

impl PatchObject for Catch {
    fn label(&self) -> &'static str {
        "catch~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, 1)
    }

    fn is_root(&self) -> bool {
        true
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::DspCatch(self.name.clone()))
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let out = ctx.outlet_buffer(0);
        ctx.pool.clear(out);
        let throws: Vec<_> = ctx.registry.throw_buffers(&self.name).collect();
        for buffer in throws {
            ctx.pool.accumulate(buffer, out);
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

    #[test]
    fn test_send_receive_carries_signal() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let src = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.5))))
            .unwrap();
        let send = engine
            .add_object(g, Box::new(DspSend::new(&Message::symbol(0.0, "x"))))
            .unwrap();
        let recv = engine
            .add_object(g, Box::new(DspReceive::new(&Message::symbol(0.0, "x"))))
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(src, 0, send, 0).unwrap();
        engine.connect(recv, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_catch_with_no_throws_is_silence() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let catch = engine
            .add_object(g, Box::new(Catch::new(&Message::symbol(0.0, "mix"))))
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(catch, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_catch_sums_throws() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let a = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.25))))
            .unwrap();
        let b = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.5))))
            .unwrap();
        let throw_a = engine
            .add_object(g, Box::new(Throw::new(&Message::symbol(0.0, "mix"))))
            .unwrap();
        let throw_b = engine
            .add_object(g, Box::new(Throw::new(&Message::symbol(0.0, "mix"))))
            .unwrap();
        let catch = engine
            .add_object(g, Box::new(Catch::new(&Message::symbol(0.0, "mix"))))
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(a, 0, throw_a, 0).unwrap();
        engine.connect(b, 0, throw_b, 0).unwrap();
        engine.connect(catch, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }
}
