//! `list` manipulation objects: append, prepend, split, trim, length.

use telar_core::{Atom, Message, PatchObject, PortSpec, Runtime};

fn incoming_atoms(message: &Message) -> Vec<Atom> {
    if message.is_bang(0) && message.len() == 1 {
        Vec::new()
    } else {
        message.atoms().to_vec()
    }
}

/// `list append`: output is the input followed by the stored list.
pub struct ListAppend {
    stored: Vec<Atom>,
}

impl ListAppend {
    /// Stores the init atoms as the appended tail.
    pub fn new(init: &Message) -> Self {
        Self {
            stored: init.atoms().to_vec(),
        }
    }
}

impl PatchObject for ListAppend {
    fn label(&self) -> &'static str {
        "list append"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                let mut atoms = incoming_atoms(message);
                atoms.extend(self.stored.iter().cloned());
                let out = if atoms.is_empty() {
                    Message::bang(message.timestamp())
                } else {
                    Message::new(message.timestamp(), atoms)
                };
                rt.outlet(0, &out);
            }
            1 => self.stored = incoming_atoms(message),
            _ => {}
        }
    }
}

/// `list prepend`: output is the stored list followed by the input.
pub struct ListPrepend {
    stored: Vec<Atom>,
}

impl ListPrepend {
    /// Stores the init atoms as the prepended head.
    pub fn new(init: &Message) -> Self {
        Self {
            stored: init.atoms().to_vec(),
        }
    }
}

impl PatchObject for ListPrepend {
    fn label(&self) -> &'static str {
        "list prepend"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                let mut atoms = self.stored.clone();
                atoms.extend(incoming_atoms(message));
                let out = if atoms.is_empty() {
                    Message::bang(message.timestamp())
                } else {
                    Message::new(message.timestamp(), atoms)
                };
                rt.outlet(0, &out);
            }
            1 => self.stored = incoming_atoms(message),
            _ => {}
        }
    }
}

/// `list split n`: first `n` atoms out the left, the rest out the middle;
/// inputs shorter than `n` pass whole out the right.
pub struct ListSplit {
    split_at: usize,
}

impl ListSplit {
    /// The init float sets the split point.
    pub fn new(init: &Message) -> Self {
        Self {
            split_at: init.get_float(0).unwrap_or(0.0).max(0.0) as usize,
        }
    }
}

impl PatchObject for ListSplit {
    fn label(&self) -> &'static str {
        "list split"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 3)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                let atoms = incoming_atoms(message);
                let ts = message.timestamp();
                if atoms.len() < self.split_at {
                    rt.outlet(2, message);
                    return;
                }
                let (head, tail) = atoms.split_at(self.split_at);
                // Right-to-left, like every multi-outlet object.
                if !tail.is_empty() {
                    rt.outlet(1, &Message::new(ts, tail.to_vec()));
                }
                rt.outlet(0, &Message::new(ts, head.to_vec()));
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.split_at = f.max(0.0) as usize;
                }
            }
            _ => {}
        }
    }
}

/// `list trim`: drops a leading `list` selector symbol, passes the rest.
pub struct ListTrim;

impl PatchObject for ListTrim {
    fn label(&self) -> &'static str {
        "list trim"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if message.is_symbol(0, "list") {
            let rest = message.atoms()[1..].to_vec();
            let out = if rest.is_empty() {
                Message::bang(message.timestamp())
            } else {
                Message::new(message.timestamp(), rest)
            };
            rt.outlet(0, &out);
        } else {
            rt.outlet(0, message);
        }
    }
}

/// `list length`: emits the atom count.
pub struct ListLength;

impl PatchObject for ListLength {
    fn label(&self) -> &'static str {
        "list length"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let len = incoming_atoms(message).len();
        rt.outlet(0, &Message::float(message.timestamp(), len as f32));
    }
}
