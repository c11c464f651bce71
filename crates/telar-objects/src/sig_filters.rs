//! Signal-rate filters: `lop~`, `hip~`, `bp~`, `vcf~`, `clip~`.

use std::f32::consts::TAU;
use std::ops::Range;

use libm::{cosf, expf, sinf};
use telar_core::{
    ConnectionType, DspContext, Message, PatchObject, PortSpec, Runtime, SignalInbox,
};

/// `lop~`: one-pole lowpass, 6 dB/octave.
///
/// Difference equation `y[n] = x[n] + c * (y[n-1] - x[n])` with
/// `c = exp(-2π f / sr)`. Cutoff changes land sample-accurately.
pub struct Lowpass {
    cutoff: f32,
    coeff: f32,
    state: f32,
    inbox: SignalInbox,
}

impl Lowpass {
    /// The init float sets the cutoff in Hz.
    pub fn new(init: &Message, sample_rate: f32) -> Self {
        let cutoff = init.get_float(0).unwrap_or(0.0).max(0.0);
        Self {
            cutoff,
            coeff: Self::coeff_for(cutoff, sample_rate),
            state: 0.0,
            inbox: SignalInbox::new(),
        }
    }

    fn coeff_for(cutoff: f32, sample_rate: f32) -> f32 {
        expf(-TAU * cutoff.max(0.0) / sample_rate).clamp(0.0, 1.0)
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let (in_buf, out_buf) = (ctx.inlet_buffer(0), ctx.outlet_buffer(0));
        let (input, output) = ctx.pool.in_out(in_buf, out_buf);
        for i in range {
            self.state = input[i] + self.coeff * (self.state - input[i]);
            output[i] = self.state;
        }
    }
}

impl PatchObject for Lowpass {
    fn label(&self) -> &'static str {
        "lop~"
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
        } else if inlet == 0 && message.is_symbol(0, "clear") {
            self.state = 0.0;
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let sr = ctx.sample_rate();
        let mut start = 0;
        for (ts, _inlet, message) in pending {
            let split = ctx.index_of(ts);
            self.render(ctx, start..split);
            start = split.max(start);
            if let Some(f) = message.get_float(0) {
                self.cutoff = f.max(0.0);
                self.coeff = Self::coeff_for(self.cutoff, sr);
            }
        }
        self.render(ctx, start..block);
    }
}

/// `hip~`: one-pole highpass.
///
/// `y[n] = c * (y[n-1] + x[n] - x[n-1])` with `c = 1 - 2π f / sr`,
/// clamped to [0, 1].
pub struct Highpass {
    cutoff: f32,
    coeff: f32,
    prev_in: f32,
    state: f32,
    inbox: SignalInbox,
}

impl Highpass {
    /// The init float sets the cutoff in Hz.
    pub fn new(init: &Message, sample_rate: f32) -> Self {
        let cutoff = init.get_float(0).unwrap_or(0.0).max(0.0);
        Self {
            cutoff,
            coeff: Self::coeff_for(cutoff, sample_rate),
            prev_in: 0.0,
            state: 0.0,
            inbox: SignalInbox::new(),
        }
    }

    fn coeff_for(cutoff: f32, sample_rate: f32) -> f32 {
        (1.0 - TAU * cutoff.max(0.0) / sample_rate).clamp(0.0, 1.0)
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let (in_buf, out_buf) = (ctx.inlet_buffer(0), ctx.outlet_buffer(0));
        let (input, output) = ctx.pool.in_out(in_buf, out_buf);
        for i in range {
            self.state = self.coeff * (self.state + input[i] - self.prev_in);
            self.prev_in = input[i];
            output[i] = self.state;
        }
    }
}

impl PatchObject for Highpass {
    fn label(&self) -> &'static str {
        "hip~"
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
        } else if inlet == 0 && message.is_symbol(0, "clear") {
            self.state = 0.0;
            self.prev_in = 0.0;
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let pending = self.inbox.drain_sorted();
        let block = ctx.block_size();
        let sr = ctx.sample_rate();
        let mut start = 0;
        for (ts, _inlet, message) in pending {
            let split = ctx.index_of(ts);
            self.render(ctx, start..split);
            start = split.max(start);
            if let Some(f) = message.get_float(0) {
                self.cutoff = f.max(0.0);
                self.coeff = Self::coeff_for(self.cutoff, sr);
            }
        }
        self.render(ctx, start..block);
    }
}

/// `bp~`: two-pole resonant bandpass with center frequency and Q set by
/// message.
pub struct Bandpass {
    center: f32,
    q: f32,
    a1: f32,
    a2: f32,
    gain: f32,
    y1: f32,
    y2: f32,
    inbox: SignalInbox,
}

impl Bandpass {
    /// Init floats set center frequency and Q.
    pub fn new(init: &Message, sample_rate: f32) -> Self {
        let mut filter = Self {
            center: init.get_float(0).unwrap_or(0.0).max(0.0),
            q: init.get_float(1).unwrap_or(0.0).max(0.0),
            a1: 0.0,
            a2: 0.0,
            gain: 0.0,
            y1: 0.0,
            y2: 0.0,
            inbox: SignalInbox::new(),
        };
        filter.recalculate(sample_rate);
        filter
    }

    fn recalculate(&mut self, sample_rate: f32) {
        let omega = (TAU * self.center / sample_rate).max(0.0);
        let q = self.q.max(0.001);
        let r = (1.0 - omega / (2.0 * q)).max(0.0);
        self.a1 = 2.0 * r * cosf(omega);
        self.a2 = -r * r;
        self.gain = 1.0 - r;
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let (in_buf, out_buf) = (ctx.inlet_buffer(0), ctx.outlet_buffer(0));
        let (input, output) = ctx.pool.in_out(in_buf, out_buf);
        for i in range {
            let y = self.gain * input[i] + self.a1 * self.y1 + self.a2 * self.y2;
            self.y2 = self.y1;
            self.y1 = y;
            output[i] = y;
        }
    }
}

impl PatchObject for Bandpass {
    fn label(&self) -> &'static str {
        "bp~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(3, 1)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn receive_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if (inlet == 1 || inlet == 2) && message.is_float(0) {
            self.inbox.push(inlet, message);
        } else if inlet == 0 && message.is_symbol(0, "clear") {
            self.y1 = 0.0;
            self.y2 = 0.0;
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
            if let Some(f) = message.get_float(0) {
                match inlet {
                    1 => self.center = f.max(0.0),
                    2 => self.q = f.max(0.0),
                    _ => {}
                }
                self.recalculate(sr);
            }
        }
        self.render(ctx, start..block);
    }
}

/// `vcf~`: bandpass with a signal-rate center frequency.
///
/// Complex one-pole resonator; outlet 0 is the real (bandpass) part,
/// outlet 1 the imaginary part. Q arrives by message on inlet 2.
pub struct Vcf {
    q: f32,
    re: f32,
    im: f32,
    /// Imaginary-part staging: both outlets come from one recursion, but the
    /// pool hands out one write buffer at a time.
    im_scratch: Vec<f32>,
    inbox: SignalInbox,
}

impl Vcf {
    /// The init float sets Q.
    pub fn new(init: &Message, block_size: usize) -> Self {
        Self {
            q: init.get_float(0).unwrap_or(0.0).max(0.0),
            re: 0.0,
            im: 0.0,
            im_scratch: vec![0.0; block_size],
            inbox: SignalInbox::new(),
        }
    }

    fn render(&mut self, ctx: &mut DspContext<'_>, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let sr = ctx.sample_rate();
        let qinv = if self.q > 0.0 { 1.0 / self.q } else { 0.0 };
        let ampcorrect = 2.0 - 2.0 / (self.q + 2.0);
        let in0 = ctx.inlet_buffer(0);
        let freq_in = ctx.inlet_buffer(1);
        {
            let (input, freq, out_re) = ctx.pool.in2_out(in0, freq_in, ctx.outlet_buffer(0));
            for i in range.clone() {
                let cf = (freq[i] * TAU / sr).max(0.0);
                let r = (1.0 - cf * qinv).max(0.0);
                let oneminusr = 1.0 - r;
                let cre = r * cosf(cf);
                let cim = r * sinf(cf);
                let re = ampcorrect * oneminusr * input[i] + cre * self.re - cim * self.im;
                let im = cim * self.re + cre * self.im;
                self.re = re;
                self.im = im;
                out_re[i] = re;
                self.im_scratch[i] = im;
            }
        }
        let im_buf = ctx.outlet_buffer(1);
        let out_im = ctx.pool.write(im_buf);
        out_im[range.clone()].copy_from_slice(&self.im_scratch[range]);
    }
}

impl PatchObject for Vcf {
    fn label(&self) -> &'static str {
        "vcf~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(3, 2)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn receive_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if inlet == 2 && message.is_float(0) {
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
                self.q = f.max(0.0);
            }
        }
        self.render(ctx, start..block);
    }
}

/// `clip~`: clamps the signal between two bounds.
pub struct ClipSig {
    lo: f32,
    hi: f32,
}

impl ClipSig {
    /// Init floats set the bounds (default -1..1).
    pub fn new(init: &Message) -> Self {
        Self {
            lo: init.get_float(0).unwrap_or(-1.0),
            hi: init.get_float(1).unwrap_or(1.0),
        }
    }
}

impl PatchObject for ClipSig {
    fn label(&self) -> &'static str {
        "clip~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(3, 1)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn process_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
        if let Some(f) = message.get_float(0) {
            match inlet {
                1 => self.lo = f,
                2 => self.hi = f,
                _ => {}
            }
        }
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let (in_buf, out_buf) = (ctx.inlet_buffer(0), ctx.outlet_buffer(0));
        let (input, output) = ctx.pool.in_out(in_buf, out_buf);
        for (o, i) in output.iter_mut().zip(input.iter()) {
            *o = i.clamp(self.lo, self.hi);
        }
    }
}
