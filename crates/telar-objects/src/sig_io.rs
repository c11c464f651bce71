//! Engine audio I/O and signal graph boundaries:
//! `adc~`, `dac~`, `inlet~`, `outlet~`.

use telar_core::{ConnectionType, DspContext, Message, PatchObject, PortSpec, Registration};

/// `adc~`: engine input channels. Its outlets alias the engine ADC buffers
/// directly, so there is nothing to compute per block.
pub struct Adc {
    channels: usize,
}

impl Adc {
    /// One outlet per engine input channel.
    pub fn new(input_channels: usize) -> Self {
        Self {
            channels: input_channels.max(1),
        }
    }
}

impl PatchObject for Adc {
    fn label(&self) -> &'static str {
        "adc~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, self.channels)
    }

    fn is_root(&self) -> bool {
        true
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::AudioIn)
    }
}

/// `dac~`: accumulates its inlets into engine output channels. Several
/// `dac~` objects may coexist; they sum.
pub struct Dac {
    /// 0-based engine output channels, one per inlet.
    channels: Vec<usize>,
}

impl Dac {
    /// Init floats are 1-based channel numbers as written in patches;
    /// a bare `dac~` is channels 1 and 2 (clamped to the engine width).
    pub fn new(init: &Message, output_channels: usize) -> Self {
        let mut channels: Vec<usize> = init
            .atoms()
            .iter()
            .filter_map(telar_core::Atom::as_float)
            .map(|f| (f.max(1.0) as usize) - 1)
            .collect();
        if channels.is_empty() {
            channels = (0..output_channels.min(2)).collect();
        }
        Self { channels }
    }
}

impl PatchObject for Dac {
    fn label(&self) -> &'static str {
        "dac~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(self.channels.len(), 0)
    }

    fn processes_audio(&self) -> bool {
        true
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        for (inlet, &channel) in self.channels.iter().enumerate() {
            if let Some(dac) = ctx.dac_buffer(channel) {
                let src = ctx.inlet_buffer(inlet);
                ctx.pool.accumulate(src, dac);
            }
        }
    }
}

/// `inlet~`: signal boundary of a subpatch. Pure alias: its outlet carries
/// whatever buffer the outer producer bound, at zero cost.
pub struct SigInlet;

impl PatchObject for SigInlet {
    fn label(&self) -> &'static str {
        "inlet~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::GraphInlet { signal: true })
    }
}

/// `outlet~`: signal boundary of a subpatch; alias like [`SigInlet`].
pub struct SigOutlet;

impl PatchObject for SigOutlet {
    fn label(&self) -> &'static str {
        "outlet~"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::GraphOutlet { signal: true })
    }
}
