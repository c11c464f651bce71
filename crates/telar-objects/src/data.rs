//! Scalar value holders, message boxes, and console objects.

use telar_core::{Atom, Message, PatchObject, PortSpec, Runtime, Symbol};

/// `float` / `f`, and the GUI number boxes (`nbx`, `floatatom`) which are
/// modelled as plain float objects.
pub struct FloatObject {
    value: f32,
}

impl FloatObject {
    /// Creates the object; the init message's first float seeds the value.
    pub fn new(init: &Message) -> Self {
        Self {
            value: init.get_float(0).unwrap_or(0.0),
        }
    }
}

impl PatchObject for FloatObject {
    fn label(&self) -> &'static str {
        "float"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if let Some(f) = message.get_float(0) {
                    self.value = f;
                } else if !message.is_bang(0) {
                    return;
                }
                rt.outlet(0, &Message::float(message.timestamp(), self.value));
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.value = f;
                }
            }
            _ => {}
        }
    }
}

/// `int` / `i`: like `float` but truncates.
pub struct IntObject {
    value: f32,
}

impl IntObject {
    /// Creates the object with a truncated initial value.
    pub fn new(init: &Message) -> Self {
        Self {
            value: init.get_float(0).unwrap_or(0.0).trunc(),
        }
    }
}

impl PatchObject for IntObject {
    fn label(&self) -> &'static str {
        "int"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if let Some(f) = message.get_float(0) {
                    self.value = f.trunc();
                } else if !message.is_bang(0) {
                    return;
                }
                rt.outlet(0, &Message::float(message.timestamp(), self.value));
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.value = f.trunc();
                }
            }
            _ => {}
        }
    }
}

/// `symbol`: stores and re-emits a symbol.
pub struct SymbolObject {
    value: Option<Symbol>,
}

impl SymbolObject {
    /// Creates the object, optionally seeded by the init message.
    pub fn new(init: &Message) -> Self {
        Self {
            value: init.get_symbol(0).cloned(),
        }
    }
}

impl PatchObject for SymbolObject {
    fn label(&self) -> &'static str {
        "symbol"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if let Some(s) = message.get_symbol(0) {
                    self.value = Some(s.clone());
                } else if !message.is_bang(0) {
                    return;
                }
                if let Some(s) = &self.value {
                    rt.outlet(0, &Message::symbol(message.timestamp(), s.as_str()));
                }
            }
            1 => {
                if let Some(s) = message.get_symbol(0) {
                    self.value = Some(s.clone());
                }
            }
            _ => {}
        }
    }
}

/// `bang` / `b` / `bng`: collapses any input to a bang.
pub struct BangObject;

impl PatchObject for BangObject {
    fn label(&self) -> &'static str {
        "bang"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        rt.outlet(0, &Message::bang(message.timestamp()));
    }
}

/// `toggle` / `tgl`: flips between zero and nonzero on bang.
pub struct Toggle {
    value: f32,
    nonzero: f32,
}

impl Toggle {
    /// Creates a toggle, off by default.
    pub fn new(init: &Message) -> Self {
        Self {
            value: init.get_float(0).unwrap_or(0.0),
            nonzero: 1.0,
        }
    }
}

impl PatchObject for Toggle {
    fn label(&self) -> &'static str {
        "toggle"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if message.is_bang(0) {
            self.value = if self.value == 0.0 { self.nonzero } else { 0.0 };
        } else if let Some(f) = message.get_float(0) {
            self.value = f;
            if f != 0.0 {
                self.nonzero = f;
            }
        } else {
            return;
        }
        rt.outlet(0, &Message::float(message.timestamp(), self.value));
    }
}

/// One template element of a message box.
enum Template {
    Literal(Atom),
    /// `$n`: replaced by atom `n-1` of the triggering message.
    Dollar(usize),
}

/// One semicolon-delimited part of a message box: either local output or a
/// remote send to a named receiver.
struct BoxPart {
    remote: Option<Symbol>,
    atoms: Vec<Template>,
}

/// A message box (`#X msg`): emits its literal atoms when triggered, with
/// `$n` slots filled from the triggering message. Comma-separated groups
/// emit as separate messages; segments after a semicolon address named
/// receivers.
pub struct MessageBox {
    parts: Vec<BoxPart>,
}

impl MessageBox {
    /// Parses the raw message-box text.
    pub fn new(text: &str) -> Self {
        let mut parts = Vec::new();
        for (si, segment) in text.split(';').enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let mut tokens: Vec<&str> = segment.split_whitespace().collect();
            let remote = if si == 0 {
                None
            } else {
                Some(Symbol::new(tokens.remove(0)))
            };
            // Commas split one segment into several messages to the same
            // destination.
            let mut atoms = Vec::new();
            let flush = |atoms: &mut Vec<Template>, parts: &mut Vec<BoxPart>| {
                if !atoms.is_empty() {
                    parts.push(BoxPart {
                        remote: remote.clone(),
                        atoms: std::mem::take(atoms),
                    });
                }
            };
            for token in tokens {
                let (token, ends_message) = match token.strip_suffix(',') {
                    Some(stripped) => (stripped, true),
                    None => (token, false),
                };
                if !token.is_empty() {
                    atoms.push(Self::parse_template(token));
                }
                if ends_message {
                    flush(&mut atoms, &mut parts);
                }
            }
            flush(&mut atoms, &mut parts);
        }
        Self { parts }
    }

    fn parse_template(token: &str) -> Template {
        if let Some(digits) = token.strip_prefix('$')
            && let Ok(n) = digits.parse::<usize>()
            && n >= 1
        {
            return Template::Dollar(n);
        }
        Template::Literal(Atom::parse_token(token))
    }

    fn resolve(&self, part: &BoxPart, incoming: &Message) -> Message {
        let atoms = part
            .atoms
            .iter()
            .map(|t| match t {
                Template::Literal(atom) => atom.clone(),
                Template::Dollar(n) => incoming
                    .get(n - 1)
                    .cloned()
                    .unwrap_or(Atom::Float(0.0)),
            })
            .collect();
        Message::new(incoming.timestamp(), atoms)
    }
}

impl PatchObject for MessageBox {
    fn label(&self) -> &'static str {
        "msg"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        for part in &self.parts {
            let resolved = self.resolve(part, message);
            match &part.remote {
                None => rt.outlet(0, &resolved),
                Some(name) => rt.send_named(name, &resolved),
            }
        }
    }
}

/// `print`: writes messages to the engine console.
pub struct Print {
    prefix: String,
}

impl Print {
    /// Creates the object; an init symbol becomes the line prefix.
    pub fn new(init: &Message) -> Self {
        let prefix = init
            .get_symbol(0)
            .map_or_else(|| String::from("print"), |s| s.as_str().to_string());
        Self { prefix }
    }
}

impl PatchObject for Print {
    fn label(&self) -> &'static str {
        "print"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 0)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        rt.print(&format!("{}: {}", self.prefix, message));
    }
}

/// `loadbang`: fires a bang when the containing graph is attached.
pub struct Loadbang;

impl PatchObject for Loadbang {
    fn label(&self) -> &'static str {
        "loadbang"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, 1)
    }

    fn is_root(&self) -> bool {
        true
    }

    fn on_attach(&mut self, rt: &mut Runtime<'_>) {
        rt.outlet(0, &Message::bang(rt.block_start()));
    }
}

/// `random`: uniform integers in `[0, max)`.
pub struct Random {
    max: f32,
    state: u64,
}

impl Random {
    /// Creates the generator; the init float sets the exclusive maximum.
    pub fn new(init: &Message) -> Self {
        Self {
            max: init.get_float(0).unwrap_or(1.0),
            state: 0x853c49e6748fea9b,
        }
    }

    fn next_unit(&mut self) -> f32 {
        // Plain LCG, plenty for patch-level randomness.
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 33) as f32) / (u32::MAX >> 1) as f32
    }
}

impl PatchObject for Random {
    fn label(&self) -> &'static str {
        "random"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 if message.is_bang(0) => {
                let value = (self.next_unit() * self.max.max(0.0)).floor();
                let value = value.min((self.max - 1.0).max(0.0));
                rt.outlet(0, &Message::float(message.timestamp(), value));
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.max = f;
                }
            }
            _ => {}
        }
    }
}

/// `#X text`: an inert comment. Occupies a graph ordinal, does nothing.
pub struct Text;

impl PatchObject for Text {
    fn label(&self) -> &'static str {
        "text"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, 0)
    }
}
