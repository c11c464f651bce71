//! Signal-rate array access: `tabread~`, `tabread4~`, `tabplay~`,
//! `tabwrite~`.

use std::ops::Range;

use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Runtime, SignalInbox, Symbol,
    Table,
};

fn name_of(init: &Message) -> Symbol {
    init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new(""))
}

fn set_target(message: &Message) -> Option<Symbol> {
    (message.is_symbol(0, "set")).then(|| message.get_symbol(1).cloned()).flatten()
}

/// `tabread~`: truncating table lookup driven by a signal-rate index.
/// Out-of-range indices read 0. The table can be retargeted mid-block with
/// a `set` message.
pub struct TabReadSig {
    name: Symbol,
    inbox: SignalInbox,
}

impl TabReadSig {
    /// The init symbol names the array.
    pub fn new(init: &Message) -> Self {
        Self {
            name: name_of(init),
            inbox: SignalInbox::new(),
        }
    }

    fn render(&self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let in_buf = ctx.inlet_buffer(0);
        let out_buf = ctx.outlet_buffer(0);
        match ctx.registry.table(&self.name) {
            Some(table) => {
                let (index, out) = ctx.pool.in_out(in_buf, out_buf);
                for i in range {
                    out[i] = table.read(index[i] as i64);
                }
            }
            None => {
                let out = ctx.pool.write(out_buf);
                out[range].fill(0.0);
            }
        }
    }
}

impl PatchObject for TabReadSig {
    fn label(&self) -> &'static str {
        "tabread~"
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

    fn receive_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 if set_target(message).is_some() => self.inbox.push(inlet, message),
            1 => rt.print_err("tabread~ onset is not supported"),
            _ => {}
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
            if let Some(name) = set_target(&message) {
                self.name = name;
            }
        }
        self.render(ctx, start..block);
    }
}

/// Pd-style 4-point interpolation around integer index `i` with fraction
/// `frac`, sampling the table with zero padding outside its range.
fn interpolate4(table: &Table, i: i64, frac: f32) -> f32 {
    let a = table.read(i - 1);
    let b = table.read(i);
    let c = table.read(i + 1);
    let d = table.read(i + 2);
    let cmb = c - b;
    b + frac * (cmb - 0.1666667 * (1.0 - frac) * ((d - a - 3.0 * cmb) * frac + (d + 2.0 * a - 3.0 * b)))
}

/// `tabread4~`: interpolating table lookup. Indices at or beyond the array
/// extremes yield 0.
pub struct TabRead4 {
    name: Symbol,
    inbox: SignalInbox,
}

impl TabRead4 {
    /// The init symbol names the array.
    pub fn new(init: &Message) -> Self {
        Self {
            name: name_of(init),
            inbox: SignalInbox::new(),
        }
    }

    fn render(&self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let in_buf = ctx.inlet_buffer(0);
        let out_buf = ctx.outlet_buffer(0);
        match ctx.registry.table(&self.name) {
            Some(table) => {
                let last = (table.len() as f32) - 1.0;
                let (index, out) = ctx.pool.in_out(in_buf, out_buf);
                for i in range {
                    let x = index[i];
                    out[i] = if x < 0.0 || x > last {
                        0.0
                    } else {
                        interpolate4(table, x as i64, x - x.floor())
                    };
                }
            }
            None => {
                let out = ctx.pool.write(out_buf);
                out[range].fill(0.0);
            }
        }
    }
}

impl PatchObject for TabRead4 {
    fn label(&self) -> &'static str {
        "tabread4~"
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

    fn receive_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 if set_target(message).is_some() => self.inbox.push(inlet, message),
            1 => rt.print_err("tabread4~ onset is not supported"),
            _ => {}
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
            if let Some(name) = set_target(&message) {
                self.name = name;
            }
        }
        self.render(ctx, start..block);
    }
}

/// `tabplay~`: plays the named array from a start index at sample rate.
/// Outlet 1 bangs when playback completes (delivered next block, as all
/// DSP-originated messages are).
pub struct TabPlay {
    name: Symbol,
    position: Option<usize>,
    end: usize,
}

impl TabPlay {
    /// The init symbol names the array.
    pub fn new(init: &Message) -> Self {
        Self {
            name: name_of(init),
            position: None,
            end: usize::MAX,
        }
    }
}

impl PatchObject for TabPlay {
    fn label(&self) -> &'static str {
        "tabplay~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 2)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn is_root(&self) -> bool {
        true
    }

    fn connection_type(&self, outlet: usize) -> ConnectionType {
        if outlet == 0 {
            ConnectionType::Signal
        } else {
            ConnectionType::Message
        }
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if message.is_bang(0) {
            self.position = Some(0);
            self.end = usize::MAX;
        } else if let Some(start) = message.get_float(0) {
            let start = start.max(0.0) as usize;
            self.position = Some(start);
            self.end = message
                .get_float(1)
                .map_or(usize::MAX, |len| start + len.max(0.0) as usize);
        } else if message.is_symbol(0, "stop") {
            self.position = None;
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let out_buf = ctx.outlet_buffer(0);
        let block = ctx.block_size();
        let Some(mut pos) = self.position else {
            ctx.pool.clear(out_buf);
            return;
        };
        let mut finished = false;
        {
            let Some(table) = ctx.registry.table(&self.name) else {
                ctx.pool.clear(out_buf);
                return;
            };
            let stop = self.end.min(table.len());
            let out = ctx.pool.write(out_buf);
            for sample in out.iter_mut().take(block) {
                if pos < stop {
                    *sample = table.read(pos as i64);
                    pos += 1;
                } else {
                    *sample = 0.0;
                    finished = true;
                }
            }
        }
        if finished {
            self.position = None;
            ctx.post_message(1, Message::bang(ctx.block_start()));
        } else {
            self.position = Some(pos);
        }
    }
}

/// `tabwrite~`: records its signal inlet into the named array, starting on
/// bang, stopping when the array is full or on `stop`.
pub struct TabWriteSig {
    name: Symbol,
    position: Option<usize>,
}

impl TabWriteSig {
    /// The init symbol names the array.
    pub fn new(init: &Message) -> Self {
        Self {
            name: name_of(init),
            position: None,
        }
    }
}

impl PatchObject for TabWriteSig {
    fn label(&self) -> &'static str {
        "tabwrite~"
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

    fn process_message(&mut self, _inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if message.is_bang(0) {
            self.position = Some(0);
        } else if message.is_symbol(0, "stop") {
            self.position = None;
        } else if let Some(name) = set_target(message) {
            self.name = name;
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let Some(mut pos) = self.position.take() else {
            return;
        };
        let in_buf = ctx.inlet_buffer(0);
        let block = ctx.block_size();
        let input = ctx.pool.read(in_buf);
        if let Some(table) = ctx.registry.table_mut(&self.name) {
            let len = table.len();
            for &sample in input.iter().take(block) {
                if pos >= len {
                    return; // full: recording ends
                }
                table.data_mut()[pos] = sample;
                pos += 1;
            }
            self.position = Some(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig_gen::SigConst;
    use crate::sig_io::Dac;
    use crate::table::TableObject;
    use crate::testutil::test_engine;
    use telar_core::{Atom, Engine, Message};

    fn one_block(engine: &mut Engine) -> Vec<f32> {
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 128];
        engine.process(&input, &mut output);
        output[..64].to_vec()
    }

    fn make_table(engine: &mut Engine, g: telar_core::GraphId, name: &str, len: usize) {
        let init = Message::new(
            0.0,
            vec![Atom::symbol(name), Atom::Float(len as f32)],
        );
        engine.add_object(g, Box::new(TableObject::new(&init))).unwrap();
    }

    #[test]
    fn test_tabread4_extremes_read_zero() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        make_table(&mut engine, g, "wave", 16);
        for i in 0..16 {
            engine
                .registry_mut()
                .table_mut(&Symbol::new("wave"))
                .unwrap()
                .write(i, 1.0);
        }
        let index = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, -1.0))))
            .unwrap();
        let reader = engine
            .add_object(g, Box::new(TabRead4::new(&Message::symbol(0.0, "wave"))))
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(index, 0, reader, 0).unwrap();
        engine.connect(reader, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 0.0));

        engine.deliver(index, 0, &Message::float(engine.block_start(), 99.0));
        let out = one_block(&mut engine);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_tabread4_interior_interpolates_constant() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        make_table(&mut engine, g, "wave", 16);
        for i in 0..16 {
            engine
                .registry_mut()
                .table_mut(&Symbol::new("wave"))
                .unwrap()
                .write(i, 0.5);
        }
        let index = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 7.25))))
            .unwrap();
        let reader = engine
            .add_object(g, Box::new(TabRead4::new(&Message::symbol(0.0, "wave"))))
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        engine.connect(index, 0, reader, 0).unwrap();
        engine.connect(reader, 0, dac, 0).unwrap();
        engine.attach_graph(g).unwrap();

        let out = one_block(&mut engine);
        // A constant table interpolates to the constant.
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_tabplay_plays_then_posts_done() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        make_table(&mut engine, g, "clip", 32);
        for i in 0..32 {
            engine
                .registry_mut()
                .table_mut(&Symbol::new("clip"))
                .unwrap()
                .write(i, i as f32);
        }
        let play = engine
            .add_object(g, Box::new(TabPlay::new(&Message::symbol(0.0, "clip"))))
            .unwrap();
        let dac = engine
            .add_object(g, Box::new(Dac::new(&Message::new(0.0, vec![]), 2)))
            .unwrap();
        let (capture, seen) = crate::testutil::Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(play, 0, dac, 0).unwrap();
        engine.connect(play, 1, sink, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(play, 0, &Message::bang(0.0));
        let out = one_block(&mut engine);
        for i in 0..32 {
            assert_eq!(out[i], i as f32);
        }
        assert!(out[32..].iter().all(|&s| s == 0.0));
        // The done bang was posted during DSP: it lands next block.
        assert!(seen.lock().unwrap().is_empty());
        one_block(&mut engine);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_tabwrite_records() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        make_table(&mut engine, g, "rec", 16);
        let src = engine
            .add_object(g, Box::new(SigConst::new(&Message::float(0.0, 0.25))))
            .unwrap();
        let write = engine
            .add_object(g, Box::new(TabWriteSig::new(&Message::symbol(0.0, "rec"))))
            .unwrap();
        engine.connect(src, 0, write, 0).unwrap();
        engine.attach_graph(g).unwrap();

        engine.deliver(write, 0, &Message::bang(0.0));
        one_block(&mut engine);
        let table = engine.registry().table(&Symbol::new("rec")).unwrap();
        assert!(table.data().iter().all(|&s| s == 0.25));
    }
}
