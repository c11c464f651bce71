//! Graph boundary objects and the message-domain named bus.

use telar_core::{Message, PatchObject, PortSpec, Registration, Runtime, Symbol};

/// `inlet`: message boundary of a subpatch or abstraction. Connections from
/// outside are re-targeted here at connect time; it just forwards.
pub struct MessageInlet;

impl PatchObject for MessageInlet {
    fn label(&self) -> &'static str {
        "inlet"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::GraphInlet { signal: false })
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        rt.outlet(0, message);
    }
}

/// `outlet`: message boundary of a subpatch or abstraction.
pub struct MessageOutlet;

impl PatchObject for MessageOutlet {
    fn label(&self) -> &'static str {
        "outlet"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::GraphOutlet { signal: false })
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        rt.outlet(0, message);
    }
}

/// `receive` / `r`: subscribes to the named message bus and forwards
/// everything that arrives there.
pub struct MessageReceive {
    name: Symbol,
}

impl MessageReceive {
    /// The init symbol is the bus name; a nameless receive listens to an
    /// empty name nothing sends to.
    pub fn new(init: &Message) -> Self {
        Self {
            name: init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new("")),
        }
    }

    /// The subscribed name.
    pub fn name(&self) -> &Symbol {
        &self.name
    }
}

impl PatchObject for MessageReceive {
    fn label(&self) -> &'static str {
        "receive"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn is_root(&self) -> bool {
        true
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::MessageReceive(self.name.clone()))
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        rt.outlet(0, message);
    }
}

/// `send` / `s`: forwards every message to the named bus. A send with no
/// matching `receive` delivers to nobody, silently.
pub struct MessageSend {
    name: Symbol,
}

impl MessageSend {
    /// The init symbol is the bus name.
    pub fn new(init: &Message) -> Self {
        Self {
            name: init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new("")),
        }
    }
}

impl PatchObject for MessageSend {
    fn label(&self) -> &'static str {
        "send"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 0)
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        let name = self.name.clone();
        rt.send_named(&name, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Capture, floats, test_engine};

    #[test]
    fn test_send_reaches_matching_receive() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let send = engine
            .add_object(g, Box::new(MessageSend::new(&Message::symbol(0.0, "bus"))))
            .unwrap();
        let recv = engine
            .add_object(
                g,
                Box::new(MessageReceive::new(&Message::symbol(0.0, "bus"))),
            )
            .unwrap();
        let (capture, seen) = Capture::new();
        let sink = engine.add_object(g, Box::new(capture)).unwrap();
        engine.connect(recv, 0, sink, 0).unwrap();

        engine.deliver(send, 0, &Message::float(0.0, 5.5));
        assert_eq!(floats(&seen), vec![5.5]);
    }

    #[test]
    fn test_send_without_receiver_is_silent() {
        let mut engine = test_engine();
        let g = engine.new_top_graph(vec![]);
        let send = engine
            .add_object(
                g,
                Box::new(MessageSend::new(&Message::symbol(0.0, "nowhere"))),
            )
            .unwrap();
        engine.deliver(send, 0, &Message::float(0.0, 1.0));
        // Nothing to assert beyond "did not panic / did not error".
    }
}
