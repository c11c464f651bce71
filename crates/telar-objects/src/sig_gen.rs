//! Signal generators: `osc~`, `phasor~`, `noise~`, `sig~`.

use std::f64::consts::TAU;
use std::ops::Range;

use libm::sin;
use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Runtime, SignalInbox,
};

/// `osc~`: sinusoid with a phase accumulator kept in f64 so long renders
/// stay on pitch.
pub struct Osc {
    freq: f32,
    phase: f64,
    inbox: SignalInbox,
}

impl Osc {
    /// The init float sets the frequency in Hz.
    pub fn new(init: &Message) -> Self {
        Self {
            freq: init.get_float(0).unwrap_or(0.0),
            phase: 0.0,
            inbox: SignalInbox::new(),
        }
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let sr = f64::from(ctx.sample_rate());
        let out_id = ctx.outlet_buffer(0);
        if ctx.has_signal_source(0) {
            // Frequency-modulated: read the rate per sample.
            let in_id = ctx.inlet_buffer(0);
            let (freq_in, out) = ctx.pool.in_out(in_id, out_id);
            for i in range {
                out[i] = sin(TAU * self.phase) as f32;
                self.phase += f64::from(freq_in[i]) / sr;
                self.phase -= self.phase.floor();
            }
        } else {
            let inc = f64::from(self.freq) / sr;
            let out = ctx.pool.write(out_id);
            for sample in &mut out[range] {
                *sample = sin(TAU * self.phase) as f32;
                self.phase += inc;
                self.phase -= self.phase.floor();
            }
        }
    }
}

impl PatchObject for Osc {
    fn label(&self) -> &'static str {
        "osc~"
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
        if message.is_float(0) {
            self.inbox.push(inlet, message);
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let mut start = 0;
        for (ts, inlet, message) in pending {
            let split = ctx.index_of(ts);
            self.render(ctx, start..split);
            start = split.max(start);
            match (inlet, message.get_float(0)) {
                (0, Some(f)) => self.freq = f,
                (1, Some(p)) => {
                    self.phase = f64::from(p);
                    self.phase -= self.phase.floor();
                }
                _ => {}
            }
        }
        self.render(ctx, start..block);
    }
}

/// `phasor~`: a 0..1 ramp at the given rate.
pub struct Phasor {
    freq: f32,
    phase: f64,
    inbox: SignalInbox,
}

impl Phasor {
    /// The init float sets the rate in Hz.
    pub fn new(init: &Message) -> Self {
        Self {
            freq: init.get_float(0).unwrap_or(0.0),
            phase: 0.0,
            inbox: SignalInbox::new(),
        }
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let sr = f64::from(ctx.sample_rate());
        let out_id = ctx.outlet_buffer(0);
        if ctx.has_signal_source(0) {
            let in_id = ctx.inlet_buffer(0);
            let (freq_in, out) = ctx.pool.in_out(in_id, out_id);
            for i in range {
                out[i] = self.phase as f32;
                self.phase += f64::from(freq_in[i]) / sr;
                self.phase -= self.phase.floor();
            }
        } else {
            let inc = f64::from(self.freq) / sr;
            let out = ctx.pool.write(out_id);
            for sample in &mut out[range] {
                *sample = self.phase as f32;
                self.phase += inc;
                self.phase -= self.phase.floor();
            }
        }
    }
}

impl PatchObject for Phasor {
    fn label(&self) -> &'static str {
        "phasor~"
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
        if message.is_float(0) {
            self.inbox.push(inlet, message);
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let mut start = 0;
        for (ts, inlet, message) in pending {
            let split = ctx.index_of(ts);
            self.render(ctx, start..split);
            start = split.max(start);
            match (inlet, message.get_float(0)) {
                (0, Some(f)) => self.freq = f,
                (1, Some(p)) => {
                    self.phase = f64::from(p);
                    self.phase -= self.phase.floor();
                }
                _ => {}
            }
        }
        self.render(ctx, start..block);
    }
}

/// `noise~`: white noise in [-1, 1] from a small LCG.
pub struct Noise {
    state: u32,
}

impl Noise {
    /// Creates the generator.
    pub fn new() -> Self {
        Self { state: 0x12345678 }
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for Noise {
    fn label(&self) -> &'static str {
        "noise~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, 1)
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

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let out_id = ctx.outlet_buffer(0);
        let out = ctx.pool.write(out_id);
        for sample in out.iter_mut() {
            self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
            *sample = (self.state >> 8) as f32 / 8388608.0 - 1.0;
        }
    }
}

/// `sig~`: a constant signal settable by float messages, sample-accurate.
pub struct SigConst {
    value: f32,
    inbox: SignalInbox,
}

impl SigConst {
    /// The init float sets the output level.
    pub fn new(init: &Message) -> Self {
        Self {
            value: init.get_float(0).unwrap_or(0.0),
            inbox: SignalInbox::new(),
        }
    }
}

impl PatchObject for SigConst {
    fn label(&self) -> &'static str {
        "sig~"
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

    fn receive_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if message.is_float(0) {
            self.inbox.push(inlet, message);
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let out_id = ctx.outlet_buffer(0);
        let mut start = 0;
        for (ts, _inlet, message) in pending {
            let split = ctx.index_of(ts);
            if split > start {
                ctx.pool.write(out_id)[start..split].fill(self.value);
                start = split;
            }
            if let Some(f) = message.get_float(0) {
                self.value = f;
            }
        }
        ctx.pool.write(out_id)[start..block].fill(self.value);
    }
}
