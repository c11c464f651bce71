//! Benchmarks for the block scheduler and buffer pool.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use telar_core::{
    BufferPool, ConnectionType, DspContext, Engine, EngineConfig, PatchObject, PortSpec,
};

struct Const(f32);

impl PatchObject for Const {
    fn label(&self) -> &'static str {
        "const~"
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
        let out = ctx.outlet_buffer(0);
        ctx.pool.write(out).fill(self.0);
    }
}

struct Amp(f32);

impl PatchObject for Amp {
    fn label(&self) -> &'static str {
        "amp~"
    }
    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }
    fn processes_audio(&self) -> bool {
        true
    }
    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Signal
    }
    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        let (in_buf, out_buf) = (ctx.inlet_buffer(0), ctx.outlet_buffer(0));
        let (input, output) = ctx.pool.in_out(in_buf, out_buf);
        for (o, i) in output.iter_mut().zip(input.iter()) {
            *o = i * self.0;
        }
    }
}

struct ToDac;

impl PatchObject for ToDac {
    fn label(&self) -> &'static str {
        "todac~"
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
    fn process_dsp(&mut self, ctx: &mut DspContext<'_>) {
        if let Some(dac) = ctx.dac_buffer(0) {
            let src = ctx.inlet_buffer(0);
            ctx.pool.accumulate(src, dac);
        }
    }
}

fn bench_process_chain(c: &mut Criterion) {
    let config = EngineConfig {
        input_channels: 2,
        output_channels: 2,
        block_size: 64,
        sample_rate: 48000.0,
    };
    let mut engine = Engine::new(config);
    let g = engine.new_top_graph(vec![]);
    let src = engine.add_object(g, Box::new(Const(0.5))).unwrap();
    let mut prev = src;
    for _ in 0..20 {
        let amp = engine.add_object(g, Box::new(Amp(0.99))).unwrap();
        engine.connect(prev, 0, amp, 0).unwrap();
        prev = amp;
    }
    let dac = engine.add_object(g, Box::new(ToDac)).unwrap();
    engine.connect(prev, 0, dac, 0).unwrap();
    engine.attach_graph(g).unwrap();

    let input = vec![0.0f32; 128];
    let mut output = vec![0.0f32; 128];

    c.bench_function("process_20_node_chain", |b| {
        b.iter(|| {
            engine.process(black_box(&input), black_box(&mut output));
        });
    });
}

fn bench_pool_split_borrow(c: &mut Criterion) {
    let mut pool = BufferPool::new(8, 64);
    let a = pool.allocate();
    let b = pool.allocate();
    c.bench_function("pool_in_out_copy", |bencher| {
        bencher.iter(|| {
            let (src, dst) = pool.in_out(black_box(a), black_box(b));
            dst.copy_from_slice(src);
        });
    });
}

criterion_group!(benches, bench_process_chain, bench_pool_split_borrow);
criterion_main!(benches);
