//! Hand-written procedures in the shape generated code takes
#![allow(dead_code)]

use pithread_runtime::{
    Branch, ChannelRef, Label, PiResult, ProcRef, Procedure, SchedPool, SchedulerConfig, StepContext, StepResult,
    ThreadState, Value,
};
use std::sync::{Arc, Mutex};

pub fn send_slot1(s: &ThreadState) -> PiResult<Value> {
    Ok(s.get(1)?.clone())
}

pub fn forty_two(_: &ThreadState) -> PiResult<Value> {
    Ok(Value::Int(42))
}

pub fn pool(workers: usize) -> Arc<SchedPool> {
    SchedPool::new(SchedulerConfig::new().num_workers(workers).gc_threshold(0)).unwrap()
}

/// Values received by sinks, in arrival order
#[derive(Clone, Default)]
pub struct Sink(Arc<Mutex<Vec<i64>>>);

impl Sink {
    pub fn put(&self, v: i64) {
        self.0.lock().unwrap().push(v);
    }

    pub fn values(&self) -> Vec<i64> {
        self.0.lock().unwrap().clone()
    }
}

/// Channels created by procedures, kept for inspection after a run
#[derive(Clone, Default)]
pub struct Channels(Arc<Mutex<Vec<ChannelRef>>>);

impl Channels {
    pub fn keep(&self, ch: &ChannelRef) {
        self.0.lock().unwrap().push(ch.clone());
    }

    pub fn all(&self) -> Vec<ChannelRef> {
        self.0.lock().unwrap().clone()
    }
}

/// `(ch, v) = ch!v`
pub struct Emit;

impl Procedure for Emit {
    fn name(&self) -> &str {
        "Emit"
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

/// `(ch) = ch?x. sink(x)`
pub struct Recv {
    pub sink: Sink,
}

impl Procedure for Recv {
    fn name(&self) -> &str {
        "Recv"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let ch = ctx.channel(0)?;
                ctx.input(ch, 1, 1)
            }
            1 => {
                self.sink.put(ctx.int(1)?);
                ctx.forget(0)?;
                Ok(StepResult::Ended)
            }
            l => Err(pithread_core::pi_err!(pithread_runtime::ErrorKind::Contract, "bad label {}", l)),
        }
    }
}

/// `new(c). (Recv(c) | c!value)`
pub struct Pair {
    pub value: i64,
    pub recv: ProcRef,
    pub channels: Channels,
}

impl Procedure for Pair {
    fn name(&self) -> &str {
        "Pair"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let ch = ctx.new_channel(0)?;
                self.channels.keep(&ch);
                ctx.set(1, self.value)?;
                ctx.spawn(&self.recv, vec![Value::Channel(ch)])?;
                Ok(StepResult::Continue(1))
            }
            1 => {
                let ch = ctx.channel(0)?;
                ctx.output(ch, send_slot1, 2)
            }
            _ => {
                ctx.forget(0)?;
                Ok(StepResult::Ended)
            }
        }
    }
}

/// `new(c). c?x` with nobody else knowing `c`
pub struct Lonely {
    pub safe: bool,
}

impl Procedure for Lonely {
    fn name(&self) -> &str {
        "Lonely"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                ctx.new_channel(0)?;
                Ok(StepResult::Continue(1))
            }
            1 => {
                let ch = ctx.channel(0)?;
                ctx.input(ch, 1, 2)
            }
            _ => Ok(StepResult::Ended),
        }
    }
    fn is_safe_choice(&self, label: Label) -> bool {
        self.safe && label == 1
    }
}

/// `(a, b) = a?x. sink(x) + b?x. sink(x)`
pub struct Chooser {
    pub sink: Sink,
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
                self.sink.put(ctx.int(2)?);
                Ok(StepResult::Ended)
            }
        }
    }
}

/// `new(a, b). (Chooser(a, b) | a!1 | b!2)`
pub struct Race {
    pub chooser: ProcRef,
    pub channels: Channels,
}

impl Procedure for Race {
    fn name(&self) -> &str {
        "Race"
    }
    fn env_size(&self) -> usize {
        2
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        let a = ctx.new_channel(0)?;
        let b = ctx.new_channel(1)?;
        self.channels.keep(&a);
        self.channels.keep(&b);
        ctx.spawn(&self.chooser, vec![Value::Channel(a.clone()), Value::Channel(b.clone())])?;
        let send: ProcRef = Arc::new(Emit);
        ctx.spawn(&send, vec![Value::Channel(a), Value::Int(1)])?;
        ctx.spawn(&send, vec![Value::Channel(b), Value::Int(2)])?;
        Ok(StepResult::Ended)
    }
}

/// `new(c). (Listen(c) | Listen(c))`, leaving both listeners stuck
pub struct Stuck {
    pub listener: ProcRef,
    pub channels: Channels,
}

impl Procedure for Stuck {
    fn name(&self) -> &str {
        "Stuck"
    }
    fn env_size(&self) -> usize {
        1
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        let ch = ctx.new_channel(0)?;
        self.channels.keep(&ch);
        ctx.spawn(&self.listener, vec![Value::Channel(ch.clone())])?;
        ctx.spawn(&self.listener, vec![Value::Channel(ch)])?;
        Ok(StepResult::Ended)
    }
}

/// Tail-calls `next` after `hops` calls to itself
pub struct Hop {
    pub hops: u32,
    pub next: ProcRef,
}

impl Procedure for Hop {
    fn name(&self) -> &str {
        "Hop"
    }
    fn env_size(&self) -> usize {
        1
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        let n = match ctx.get(0)? {
            Value::Int(n) => *n,
            _ => 0,
        };
        if n as u32 >= self.hops {
            return Ok(StepResult::Call(self.next.clone(), 0));
        }
        ctx.set(0, n + 1)?;
        Ok(StepResult::Continue(0))
    }
}

fn send_slot3(s: &ThreadState) -> PiResult<Value> {
    Ok(s.get(3)?.clone())
}

/// Branches over the channels in slots 0..3, starting at the rotation in slot 4
fn rotated(ctx: &StepContext<'_>, make: impl Fn(ChannelRef) -> Branch) -> PiResult<Vec<Branch>> {
    let rot = ctx.int(4)? as usize;
    (0..3).map(|i| -> PiResult<Branch> { Ok(make(ctx.channel((i + rot) % 3)?)) }).collect()
}

/// `(a, b, c, v, r) = a!v + b!v + c!v`
pub struct Offer;

impl Procedure for Offer {
    fn name(&self) -> &str {
        "Offer"
    }
    fn env_size(&self) -> usize {
        5
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let branches = rotated(ctx, |ch| Branch::output(ch, send_slot3, 1))?;
                ctx.choice(&branches)
            }
            _ => Ok(StepResult::Ended),
        }
    }
}

/// `(a, b, c, x, r) = a?x. sink(x) + b?x. sink(x) + c?x. sink(x)`
pub struct Take {
    pub sink: Sink,
}

impl Procedure for Take {
    fn name(&self) -> &str {
        "Take"
    }
    fn env_size(&self) -> usize {
        5
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        match ctx.pc() {
            0 => {
                let branches = rotated(ctx, |ch| Branch::input(ch, 3, 1))?;
                ctx.choice(&branches)
            }
            _ => {
                self.sink.put(ctx.int(3)?);
                Ok(StepResult::Ended)
            }
        }
    }
}

/// `new(a, b, c). (Take | Offer)^n`, each side choosing over all three
pub struct Crowd {
    pub n: usize,
    pub take: ProcRef,
    pub channels: Channels,
}

impl Procedure for Crowd {
    fn name(&self) -> &str {
        "Crowd"
    }
    fn env_size(&self) -> usize {
        3
    }
    fn step(&self, ctx: &mut StepContext<'_>) -> PiResult<StepResult> {
        let mut chans = Vec::new();
        for slot in 0..3 {
            let ch = ctx.new_channel(slot)?;
            self.channels.keep(&ch);
            chans.push(Value::Channel(ch));
        }
        let offer: ProcRef = Arc::new(Offer);
        for i in 0..self.n {
            let rot = Value::Int((i % 3) as i64);
            let mut args = chans.clone();
            args.extend([Value::NoValue, rot.clone()]);
            ctx.spawn(&self.take, args)?;
            let mut args = chans.clone();
            args.extend([Value::Int(i as i64 + 1), rot]);
            ctx.spawn(&offer, args)?;
        }
        for slot in 0..3 {
            ctx.forget(slot)?;
        }
        Ok(StepResult::Ended)
    }
}
