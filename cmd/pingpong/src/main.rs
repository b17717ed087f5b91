//! Ping-pong over two rendezvous channels
//!
//! Hand-written step code for
//!
//! ```text
//! Ping(ping, pong, n) = if n = 0 then 0 else ping!n. pong?r. Ping(ping, pong, n - 1)
//! Pong(ping, pong)    = ping?v. pong!v. if v = 1 then 0 else Pong(ping, pong)
//! Main(n)             = new(ping, pong). (Ping(ping, pong, n) | Pong(ping, pong))
//! ```
//!
//! Usage: `pingpong [rounds] [workers]`

use pithread::{
    PiResult, ProcRef, Procedure, SchedulerConfig, StepContext, StepResult, ThreadState, Value, Runtime,
    exit_on_error, kinfo, pi_err, ErrorKind,
};
use std::sync::Arc;
use std::time::Instant;

const PING: usize = 0;
const PONG: usize = 1;

fn send_slot2(s: &ThreadState) -> PiResult<Value> {
    Ok(s.get(2)?.clone())
}

struct Ping;

impl Procedure for Ping {
    fn name(&self) -> &str {
        "Ping"
    }
    fn env_size(&self) -> usize {
        4
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                if ctx.int(2)? == 0 {
                    return Ok(StepResult::Ended);
                }
                let ping = ctx.channel(PING)?;
                ctx.output(ping, send_slot2, 1)
            }
            1 => {
                let pong = ctx.channel(PONG)?;
                ctx.input(pong, 3, 2)
            }
            2 => {
                let n = ctx.int(2)?;
                let reply = ctx.int(3)?;
                if reply != n {
                    return Err(pi_err!(ErrorKind::Contract, "sent {} but got {} back", n, reply));
                }
                ctx.set(2, n - 1)?;
                Ok(StepResult::Continue(0))
            }
            pc => Err(pi_err!(ErrorKind::Contract, "Ping has no label {}", pc)),
        }
    }
}

struct Pong;

impl Procedure for Pong {
    fn name(&self) -> &str {
        "Pong"
    }
    fn env_size(&self) -> usize {
        3
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let ping = ctx.channel(PING)?;
                ctx.input(ping, 2, 1)
            }
            1 => {
                let pong = ctx.channel(PONG)?;
                ctx.output(pong, send_slot2, 2)
            }
            2 => {
                if ctx.int(2)? == 1 {
                    Ok(StepResult::Ended)
                } else {
                    Ok(StepResult::Continue(0))
                }
            }
            pc => Err(pi_err!(ErrorKind::Contract, "Pong has no label {}", pc)),
        }
    }
}

struct Main {
    rounds: i64,
}

impl Procedure for Main {
    fn name(&self) -> &str {
        "Main"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        let ping = ctx.new_channel(PING)?;
        let pong = ctx.new_channel(PONG)?;
        let p: ProcRef = Arc::new(Pong);
        ctx.spawn(&p, vec![Value::Channel(ping.clone()), Value::Channel(pong.clone())])?;
        let p: ProcRef = Arc::new(Ping);
        ctx.spawn(&p, vec![Value::Channel(ping), Value::Channel(pong), Value::Int(self.rounds)])?;
        ctx.forget(PING)?;
        ctx.forget(PONG)?;
        Ok(StepResult::Ended)
    }
}

fn main() {
    println!("=== PiThread Ping-Pong ===\n");

    let mut args = std::env::args().skip(1);
    let rounds: i64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let workers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(2);

    let config = SchedulerConfig::from_env().num_workers(workers);
    let runtime = exit_on_error(Runtime::new(config));
    exit_on_error(runtime.spawn(Arc::new(Main { rounds }), Vec::new()));

    kinfo!("ping-pong: {} rounds on {} workers", rounds, workers);
    let start = Instant::now();
    let report = exit_on_error(runtime.run());
    let elapsed = start.elapsed();

    println!("Rounds:      {}", rounds);
    println!("Workers:     {}", workers);
    println!("Threads:     {} spawned, {} ended", report.spawned, report.ended);
    println!("Time:        {:?}", elapsed);
    println!("Throughput:  {:.0} messages/sec", (2 * rounds) as f64 / elapsed.as_secs_f64());

    if !report.is_clean() {
        println!("\n{} threads left parked, {} deadlocks", report.parked_at_exit, report.deadlocks.len());
        std::process::exit(2);
    }
    println!("\n=== Ping-Pong Complete ===");
}
