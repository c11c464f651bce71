//! Object factory for the telar patch runtime.
//!
//! Maps the textual labels that appear in patch files (`osc~`, `metro`,
//! `t`, ...) onto constructors from `telar-objects`. The parser asks the
//! factory first; a label the factory does not know falls back to
//! abstraction loading, and only then becomes a patch error.
//!
//! # Example
//!
//! ```rust
//! use telar_core::{Engine, EngineConfig, Message};
//! use telar_registry::ObjectRegistry;
//!
//! let engine = Engine::new(EngineConfig {
//!     input_channels: 2,
//!     output_channels: 2,
//!     block_size: 64,
//!     sample_rate: 48000.0,
//! });
//! let registry = ObjectRegistry::new();
//! let osc = registry
//!     .create("osc~", &Message::float(0.0, 440.0), &engine.object_env())
//!     .unwrap();
//! assert_eq!(osc.label(), "osc~");
//! ```

use telar_core::{Message, ObjectEnv, PatchObject};
use telar_objects::{
    Adc, Bandpass, BangObject, Binop, BinopKind, Catch, Change, ClipSig, Dac, Delay, DelayRead,
    DelayWriter, DspReceive, DspSend, FloatObject, FreqToMidi, Highpass, IntObject, Line, LineSig,
    ListAppend, ListLength, ListPrepend, ListSplit, ListTrim, Loadbang, Lowpass, MessageInlet,
    MessageOutlet, MessageReceive, MessageSend, Metro, MidiToFreq, Moses, Noise, Notein, Osc,
    Pack, Phasor, Pipe, Print, Random, Route, Select, SigBinop, SigBinopKind, SigConst, SigInlet,
    SigOutlet, Spigot, StripNote, Swap, SymbolObject, TabPlay, TabRead, TabRead4, TabReadSig,
    TabWrite, TabWriteSig, TableObject, Throw, Timer, Toggle, Trigger, Unary, UnaryKind, Unpack,
    VariableDelay, Vcf,
};
use thiserror::Error;

/// Errors from object construction.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The label names nothing the factory knows; the caller should try
    /// abstraction loading before giving up.
    #[error("unknown object \"{0}\"")]
    Unknown(String),

    /// A recognized label whose implementation needs a platform primitive
    /// this build does not carry (the FFT pair).
    #[error("object \"{0}\" is not supported in this build")]
    Unsupported(String),
}

/// Every label the factory recognizes, for discovery and diagnostics.
pub const LABELS: &[&str] = &[
    "+", "-", "*", "/", "%", "pow", "min", "max", ">", ">=", "<", "<=", "==", "!=", "&&", "||",
    "atan2", "abs", "sin", "cos", "tan", "atan", "exp", "log", "sqrt", "mtof", "ftom", "float",
    "int", "symbol", "bang", "toggle", "print", "loadbang", "random", "list", "pack",
    "unpack", "trigger", "select", "route", "moses", "spigot", "change", "swap", "delay", "pipe",
    "metro", "timer", "line", "notein", "stripnote", "send", "receive", "inlet", "outlet",
    "table", "tabread", "tabwrite", "+~", "-~", "*~", "/~", "osc~", "phasor~", "noise~", "sig~",
    "line~", "lop~", "hip~", "bp~", "vcf~", "clip~", "adc~", "dac~", "inlet~", "outlet~",
    "send~", "receive~", "throw~", "catch~", "delwrite~", "delread~", "vd~", "tabread~",
    "tabread4~", "tabplay~", "tabwrite~",
];

/// The label-to-constructor table.
#[derive(Default)]
pub struct ObjectRegistry;

impl ObjectRegistry {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }

    /// Constructs the object for a patch label.
    ///
    /// `init` carries the pre-parsed, `$n`-resolved creation arguments.
    pub fn create(
        &self,
        label: &str,
        init: &Message,
        env: &ObjectEnv,
    ) -> Result<Box<dyn PatchObject>, FactoryError> {
        let object: Box<dyn PatchObject> = match label {
            // --- scalar arithmetic and comparison ---
            "+" => Box::new(Binop::new(BinopKind::Add, init)),
            "-" => Box::new(Binop::new(BinopKind::Sub, init)),
            "*" => Box::new(Binop::new(BinopKind::Mul, init)),
            "/" => Box::new(Binop::new(BinopKind::Div, init)),
            "%" | "mod" => Box::new(Binop::new(BinopKind::Mod, init)),
            "pow" => Box::new(Binop::new(BinopKind::Pow, init)),
            "min" => Box::new(Binop::new(BinopKind::Min, init)),
            "max" => Box::new(Binop::new(BinopKind::Max, init)),
            ">" => Box::new(Binop::new(BinopKind::Gt, init)),
            ">=" => Box::new(Binop::new(BinopKind::Ge, init)),
            "<" => Box::new(Binop::new(BinopKind::Lt, init)),
            "<=" => Box::new(Binop::new(BinopKind::Le, init)),
            "==" => Box::new(Binop::new(BinopKind::Eq, init)),
            "!=" => Box::new(Binop::new(BinopKind::Ne, init)),
            "&&" => Box::new(Binop::new(BinopKind::And, init)),
            "||" => Box::new(Binop::new(BinopKind::Or, init)),
            "atan2" => Box::new(Binop::new(BinopKind::Atan2, init)),
            "abs" => Box::new(Unary::new(UnaryKind::Abs)),
            "sin" => Box::new(Unary::new(UnaryKind::Sin)),
            "cos" => Box::new(Unary::new(UnaryKind::Cos)),
            "tan" => Box::new(Unary::new(UnaryKind::Tan)),
            "atan" => Box::new(Unary::new(UnaryKind::Atan)),
            "exp" => Box::new(Unary::new(UnaryKind::Exp)),
            "log" => Box::new(Unary::new(UnaryKind::Log)),
            "sqrt" => Box::new(Unary::new(UnaryKind::Sqrt)),
            "mtof" => Box::new(MidiToFreq),
            "ftom" => Box::new(FreqToMidi),

            // --- values, console, GUI atoms ---
            "float" | "f" => Box::new(FloatObject::new(init)),
            "int" | "i" => Box::new(IntObject::new(init)),
            "symbol" => Box::new(SymbolObject::new(init)),
            "bang" | "b" | "bng" => Box::new(BangObject),
            "toggle" | "tgl" => Box::new(Toggle::new(init)),
            // GUI number boxes and sliders are modelled as float objects.
            "nbx" | "hsl" | "vsl" => Box::new(FloatObject::new(init)),
            "print" => Box::new(Print::new(init)),
            "loadbang" => Box::new(Loadbang),
            "random" => Box::new(Random::new(init)),

            // --- lists ---
            "list" => return Ok(create_list(init)),
            "pack" => Box::new(Pack::new(init)),
            "unpack" => Box::new(Unpack::new(init)),

            // --- control flow ---
            "trigger" | "t" => Box::new(Trigger::new(init)),
            "select" | "sel" => Box::new(Select::new(init)),
            "route" => Box::new(Route::new(init)),
            "moses" => Box::new(Moses::new(init)),
            "spigot" => Box::new(Spigot::new(init)),
            "change" => Box::new(Change::new(init)),
            "swap" => Box::new(Swap::new(init)),

            // --- timing ---
            "delay" | "del" => Box::new(Delay::new(init)),
            "pipe" => Box::new(Pipe::new(init)),
            "metro" => Box::new(Metro::new(init)),
            "timer" => Box::new(Timer::new()),
            "line" => Box::new(Line::new(init)),

            // --- MIDI ---
            "notein" => Box::new(Notein::new(init)),
            "stripnote" => Box::new(StripNote::new()),

            // --- named message bus and graph boundaries ---
            "send" | "s" => Box::new(MessageSend::new(init)),
            "receive" | "r" => Box::new(MessageReceive::new(init)),
            "inlet" => Box::new(MessageInlet),
            "outlet" => Box::new(MessageOutlet),

            // --- arrays, message rate ---
            "table" => Box::new(TableObject::new(init)),
            "tabread" => Box::new(TabRead::new(init)),
            "tabwrite" => Box::new(TabWrite::new(init)),

            // --- signal arithmetic ---
            "+~" => Box::new(SigBinop::new(SigBinopKind::Add, init)),
            "-~" => Box::new(SigBinop::new(SigBinopKind::Sub, init)),
            "*~" => Box::new(SigBinop::new(SigBinopKind::Mul, init)),
            "/~" => Box::new(SigBinop::new(SigBinopKind::Div, init)),

            // --- generators ---
            "osc~" => Box::new(Osc::new(init)),
            "phasor~" => Box::new(Phasor::new(init)),
            "noise~" => Box::new(Noise::new()),
            "sig~" => Box::new(SigConst::new(init)),
            "line~" => Box::new(LineSig::new()),

            // --- filters ---
            "lop~" => Box::new(Lowpass::new(init, env.sample_rate)),
            "hip~" => Box::new(Highpass::new(init, env.sample_rate)),
            "bp~" => Box::new(Bandpass::new(init, env.sample_rate)),
            "vcf~" => Box::new(Vcf::new(init, env.block_size)),
            "clip~" => Box::new(ClipSig::new(init)),

            // --- engine I/O and signal boundaries ---
            "adc~" => Box::new(Adc::new(env.input_channels)),
            "dac~" => Box::new(Dac::new(init, env.output_channels)),
            "inlet~" => Box::new(SigInlet),
            "outlet~" => Box::new(SigOutlet),

            // --- long-range signal wires ---
            "send~" | "s~" => Box::new(DspSend::new(init)),
            "receive~" | "r~" => Box::new(DspReceive::new(init)),
            "throw~" => Box::new(Throw::new(init)),
            "catch~" => Box::new(Catch::new(init)),
            "delwrite~" => Box::new(DelayWriter::new(init)),
            "delread~" => Box::new(DelayRead::new(init)),
            "vd~" => Box::new(VariableDelay::new(init)),

            // --- signal-rate array access ---
            "tabread~" => Box::new(TabReadSig::new(init)),
            "tabread4~" => Box::new(TabRead4::new(init)),
            "tabplay~" => Box::new(TabPlay::new(init)),
            "tabwrite~" => Box::new(TabWriteSig::new(init)),

            // The FFT pair needs a platform transform backend.
            "rfft~" | "rifft~" => return Err(FactoryError::Unsupported(label.to_string())),

            other => {
                // A bare number is a float object initialized to it.
                if let Ok(value) = other.parse::<f32>() {
                    return Ok(Box::new(FloatObject::new(&Message::float(0.0, value))));
                }
                return Err(FactoryError::Unknown(other.to_string()));
            }
        };
        Ok(object)
    }
}

impl ObjectRegistry {
    /// Constructs an object from a `"label arg arg…"` string, the form the
    /// host facade's dynamic-patching entry point uses.
    pub fn create_from_text(
        &self,
        text: &str,
        env: &ObjectEnv,
    ) -> Result<Box<dyn PatchObject>, FactoryError> {
        let mut tokens = text.split_whitespace();
        let label = tokens.next().unwrap_or("");
        let atoms = tokens.map(telar_core::Atom::parse_token).collect();
        self.create(label, &Message::new(0.0, atoms), env)
    }
}

/// `list <verb>` dispatch: the verb chooses the object, and for the
/// storing variants the remaining init atoms seed it.
fn create_list(init: &Message) -> Box<dyn PatchObject> {
    let rest = Message::new(init.timestamp(), init.atoms().get(1..).unwrap_or(&[]).to_vec());
    match init.get_symbol(0).map(|s| s.as_str()) {
        Some("append") => Box::new(ListAppend::new(&rest)),
        Some("prepend") => Box::new(ListPrepend::new(&rest)),
        Some("split") => Box::new(ListSplit::new(&rest)),
        Some("trim") => Box::new(ListTrim),
        Some("length") => Box::new(ListLength),
        _ => Box::new(ListAppend::new(init)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telar_core::{Engine, EngineConfig};

    fn env() -> ObjectEnv {
        Engine::new(EngineConfig {
            input_channels: 2,
            output_channels: 2,
            block_size: 64,
            sample_rate: 48000.0,
        })
        .object_env()
    }

    #[test]
    fn test_every_listed_label_constructs_or_is_flagged() {
        let registry = ObjectRegistry::new();
        let env = env();
        for &label in LABELS {
            match registry.create(label, &Message::new(0.0, vec![]), &env) {
                Ok(object) => assert!(!object.label().is_empty(), "label {label}"),
                Err(err) => panic!("label {label} failed: {err}"),
            }
        }
    }

    #[test]
    fn test_aliases_resolve() {
        let registry = ObjectRegistry::new();
        let env = env();
        for (alias, canonical) in [
            ("t", "trigger"),
            ("sel", "select"),
            ("f", "float"),
            ("b", "bang"),
            ("del", "delay"),
            ("r", "receive"),
            ("s", "send"),
            ("r~", "receive~"),
            ("s~", "send~"),
        ] {
            let object = registry
                .create(alias, &Message::new(0.0, vec![]), &env)
                .unwrap();
            assert_eq!(object.label(), canonical);
        }
    }

    #[test]
    fn test_create_from_text_splits_label_and_args() {
        let registry = ObjectRegistry::new();
        let object = registry.create_from_text("osc~ 440", &env()).unwrap();
        assert_eq!(object.label(), "osc~");
        assert!(registry.create_from_text("", &env()).is_err());
    }

    #[test]
    fn test_numeric_label_is_a_float() {
        let registry = ObjectRegistry::new();
        let object = registry
            .create("3.5", &Message::new(0.0, vec![]), &env())
            .unwrap();
        assert_eq!(object.label(), "float");
    }

    #[test]
    fn test_unknown_label_errors() {
        let registry = ObjectRegistry::new();
        let result = registry.create("frobnicate", &Message::new(0.0, vec![]), &env());
        assert!(matches!(result, Err(FactoryError::Unknown(_))));
    }

    #[test]
    fn test_fft_pair_is_flagged_unsupported() {
        let registry = ObjectRegistry::new();
        let result = registry.create("rfft~", &Message::new(0.0, vec![]), &env());
        assert!(matches!(result, Err(FactoryError::Unsupported(_))));
    }
}
