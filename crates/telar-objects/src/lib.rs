//! Built-in objects for the telar patch runtime.
//!
//! One module per object family, message domain first, signal domain below.
//! Every type here implements [`telar_core::PatchObject`]; the
//! `telar-registry` crate maps patch labels (`osc~`, `metro`, `t`, ...) onto
//! these constructors.

pub mod arith;
pub mod data;
pub mod flow;
pub mod list;
pub mod midi;
pub mod pack;
pub mod ports;
pub mod table;
pub mod timing;

pub mod sig_arith;
pub mod sig_delay;
pub mod sig_filters;
pub mod sig_gen;
pub mod sig_io;
pub mod sig_line;
pub mod sig_route;
pub mod sig_table;

pub use arith::{Binop, BinopKind, Unary, UnaryKind};
pub use data::{BangObject, FloatObject, IntObject, Loadbang, MessageBox, Print, Random, SymbolObject, Text, Toggle};
pub use flow::{Change, Moses, Route, Select, Spigot, Swap, Trigger};
pub use list::{ListAppend, ListLength, ListPrepend, ListSplit, ListTrim};
pub use midi::{FreqToMidi, MidiToFreq, Notein, StripNote};
pub use pack::{Pack, Unpack};
pub use ports::{MessageInlet, MessageOutlet, MessageReceive, MessageSend};
pub use table::{TabRead, TabWrite, TableObject};
pub use timing::{Delay, Line, Metro, Pipe, Timer};

pub use sig_arith::{SigBinop, SigBinopKind};
pub use sig_delay::{DelayRead, DelayWriter, VariableDelay};
pub use sig_filters::{Bandpass, ClipSig, Highpass, Lowpass, Vcf};
pub use sig_gen::{Noise, Osc, Phasor, SigConst};
pub use sig_io::{Adc, Dac, SigInlet, SigOutlet};
pub use sig_line::LineSig;
pub use sig_route::{Catch, DspReceive, DspSend, Throw};
pub use sig_table::{TabPlay, TabRead4, TabReadSig, TabWriteSig};

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::{Arc, Mutex};

    use telar_core::{Engine, EngineConfig, Message, PatchObject, PortSpec, Runtime};

    /// Records every message delivered to it, for wiring downstream of an
    /// object under test.
    pub struct Capture {
        pub seen: Arc<Mutex<Vec<(usize, Message)>>>,
    }

    impl Capture {
        pub fn new() -> (Self, Arc<Mutex<Vec<(usize, Message)>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    impl PatchObject for Capture {
        fn label(&self) -> &'static str {
            "capture"
        }
        fn ports(&self) -> PortSpec {
            PortSpec::new(8, 0)
        }
        fn process_message(&mut self, inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
            self.seen.lock().unwrap().push((inlet, message.clone()));
        }
    }

    pub fn test_engine() -> Engine {
        Engine::new(EngineConfig {
            input_channels: 1,
            output_channels: 2,
            block_size: 64,
            sample_rate: 44100.0,
        })
    }

    /// Collected float payloads, in delivery order.
    pub fn floats(seen: &Arc<Mutex<Vec<(usize, Message)>>>) -> Vec<f32> {
        seen.lock()
            .unwrap()
            .iter()
            .filter_map(|(_, m)| m.get_float(0))
            .collect()
    }
}
