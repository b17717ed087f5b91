//! Stress test - many choosers racing over shared channels
//!
//! `n` choosers each offer an input on both `a` and `b`, while `n`
//! senders each offer a single value on one of them. Every chooser must
//! take exactly one value, so the received sum equals the sent sum.
//!
//! Usage: `stress [choosers] [workers]`

use pithread::{
    Branch, PiResult, ProcRef, Procedure, SchedulerConfig, StepContext, StepResult, ThreadState, Value, Runtime,
    exit_on_error,
};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

fn send_slot1(s: &ThreadState) -> PiResult<Value> {
    Ok(s.get(1)?.clone())
}

/// `ch!v`
struct Send1;

impl Procedure for Send1 {
    fn name(&self) -> &str {
        "Send"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let ch = ctx.channel(0)?;
                ctx.output(ch, send_slot1, 1)
            }
            _ => Ok(StepResult::Ended),
        }
    }
}

/// `a?x. done + b?x. done`
struct Chooser {
    sum: Arc<AtomicI64>,
    taken: Arc<AtomicU64>,
}

impl Procedure for Chooser {
    fn name(&self) -> &str {
        "Chooser"
    }
    fn env_size(&self) -> usize {
        3
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let a = ctx.channel(0)?;
                let b = ctx.channel(1)?;
                ctx.choice(&[Branch::input(a, 2, 1), Branch::input(b, 2, 1)])
            }
            _ => {
                self.sum.fetch_add(ctx.int(2)?, Ordering::Relaxed);
                self.taken.fetch_add(1, Ordering::Relaxed);
                Ok(StepResult::Ended)
            }
        }
    }
}

struct Main {
    choosers: usize,
    chooser: ProcRef,
}

impl Procedure for Main {
    fn name(&self) -> &str {
        "Main"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        let a = ctx.new_channel(0)?;
        let b = ctx.new_channel(1)?;
        let send: ProcRef = Arc::new(Send1);
        for i in 0..self.choosers {
            ctx.spawn(&self.chooser, vec![Value::Channel(a.clone()), Value::Channel(b.clone())])?;
            let ch = if i % 2 == 0 { a.clone() } else { b.clone() };
            ctx.spawn(&send, vec![Value::Channel(ch), Value::Int(i as i64 + 1)])?;
        }
        ctx.forget(0)?;
        ctx.forget(1)?;
        Ok(StepResult::Ended)
    }
}

fn main() {
    println!("=== PiThread Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let choosers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let workers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(8);

    println!("Spawning {} choosers and {} senders...", choosers, choosers);

    let sum = Arc::new(AtomicI64::new(0));
    let taken = Arc::new(AtomicU64::new(0));
    let chooser: ProcRef = Arc::new(Chooser { sum: sum.clone(), taken: taken.clone() });

    let config = SchedulerConfig::from_env().num_workers(workers);
    let runtime = exit_on_error(Runtime::new(config));
    exit_on_error(runtime.spawn(Arc::new(Main { choosers, chooser }), Vec::new()));

    let start = Instant::now();
    let report = exit_on_error(runtime.run());
    let elapsed = start.elapsed();

    let n = choosers as i64;
    let expected = n * (n + 1) / 2;

    println!("\n=== Results ===");
    println!("Choosers:        {}", choosers);
    println!("Values taken:    {}", taken.load(Ordering::Relaxed));
    println!("Sum received:    {} (expected {})", sum.load(Ordering::Relaxed), expected);
    println!("Threads ended:   {}", report.ended);
    println!("Threads blocked: {}", report.blocked);
    println!("Left parked:     {}", report.parked_at_exit);
    println!("Sweeps:          {} ({} threads reclaimed)", report.sweeps, report.swept);
    println!("Run time:        {:?}", elapsed);
    println!("Throughput:      {:.0} rendezvous/sec", choosers as f64 / elapsed.as_secs_f64());

    if sum.load(Ordering::Relaxed) != expected || !report.is_clean() {
        println!("\n=== Stress Test FAILED ===");
        std::process::exit(2);
    }
    println!("\n=== Stress Test Complete ===");
}
