//! Property tests for the ordering and boundary contracts.

use proptest::prelude::*;
use telar_core::{Message, Table};

mod queue_props {
    use super::*;
    use telar_core::{Engine, EngineConfig, PatchObject, PortSpec, Registration, Runtime, Symbol};

    use std::sync::{Arc, Mutex};

    struct Probe {
        seen: Arc<Mutex<Vec<f64>>>,
    }

    impl PatchObject for Probe {
        fn label(&self) -> &'static str {
            "probe"
        }
        fn ports(&self) -> PortSpec {
            PortSpec::new(1, 0)
        }
        fn registration(&self) -> Option<Registration> {
            Some(Registration::MessageReceive(Symbol::new("in")))
        }
        fn process_message(&mut self, _inlet: usize, message: &Message, _rt: &mut Runtime<'_>) {
            self.seen.lock().unwrap().push(message.timestamp());
        }
    }

    proptest! {
        /// Whatever order timestamps are injected in, delivery is sorted and
        /// never precedes the block start.
        #[test]
        fn prop_delivery_is_timestamp_sorted(mut offsets in proptest::collection::vec(0.0f64..200.0, 1..40)) {
            let mut engine = Engine::new(EngineConfig {
                input_channels: 1,
                output_channels: 1,
                block_size: 64,
                sample_rate: 1000.0,
            });
            let g = engine.new_top_graph(vec![]);
            let seen = Arc::new(Mutex::new(Vec::new()));
            engine
                .add_object(g, Box::new(Probe { seen: Arc::clone(&seen) }))
                .unwrap();
            engine.attach_graph(g).unwrap();

            for &offset in &offsets {
                engine.schedule_message("in", Message::float(offset, 0.0));
            }

            let input = vec![0.0; 64];
            let mut output = vec![0.0; 64];
            for _ in 0..5 {
                engine.process(&input, &mut output);
            }

            let seen = seen.lock().unwrap();
            prop_assert_eq!(seen.len(), offsets.len());
            for pair in seen.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            offsets.sort_by(f64::total_cmp);
            // Clamping aside, each message lands at or after its requested time.
            for (delivered, requested) in seen.iter().zip(offsets.iter()) {
                prop_assert!(delivered + 1e-9 >= *requested);
            }
        }
    }
}

proptest! {
    /// Array reads outside `0..len` are always exactly zero.
    #[test]
    fn prop_table_out_of_range_reads_zero(len in 1usize..64, index in -200i64..200) {
        let mut table = Table::new(len);
        for i in 0..len {
            table.write(i as i64, 1.0 + i as f32);
        }
        let value = table.read(index);
        if index < 0 || index >= len as i64 {
            prop_assert_eq!(value, 0.0);
        } else {
            prop_assert_eq!(value, 1.0 + index as f32);
        }
    }
}
