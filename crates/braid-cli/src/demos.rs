// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Classic channel programs, runnable by name.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use braid_rt::{
    fan_in, now, sleep, spawn, Channel, Choose, Error, Receiver, Select, Sender, Ticker,
};
use futures::StreamExt;

/// Name and one-line description of every demo.
pub const DEMOS: &[(&str, &str)] = &[
    ("buffering", "buffered channel accepts values without a receiver"),
    ("directions", "send-only and receive-only channel handles"),
    ("closing", "close a job channel and drain it"),
    ("range", "iterate a channel until it closes"),
    ("select", "wait on two channels at once"),
    ("timeouts", "select with a deadline"),
    ("non-blocking", "select with an otherwise clause"),
    ("ping-pong", "two routines passing a ball"),
    ("fibonacci", "send until told to quit"),
    ("whispers", "a long chain of routines"),
    ("worker-pool", "three workers sharing a job queue"),
    ("tickers", "periodic ticks until stopped"),
    ("fan-in", "merge several producers into one channel"),
];

pub fn exists(name: &str) -> bool {
    DEMOS.iter().any(|(n, _)| *n == name)
}

/// Run the named demo. Unknown names are a no-op; check with [`exists`].
pub async fn run(name: &str) -> Result<(), Error> {
    match name {
        "buffering" => buffering().await,
        "directions" => directions().await,
        "closing" => closing().await,
        "range" => range().await,
        "select" => select().await,
        "timeouts" => timeouts().await,
        "non-blocking" => non_blocking().await,
        "ping-pong" => ping_pong().await,
        "fibonacci" => fibonacci().await,
        "whispers" => whispers(1000).await,
        "worker-pool" => worker_pool().await,
        "tickers" => tickers().await,
        "fan-in" => fan_in_demo().await,
        _ => Ok(()),
    }
}

async fn buffering() -> Result<(), Error> {
    let messages = Channel::buffered(2);
    messages.send("buffered").await?;
    messages.send("channel").await?;
    for _ in 0..2 {
        if let Some(m) = messages.recv().await {
            println!("{m}");
        }
    }
    Ok(())
}

async fn ping(pings: &Sender<String>, msg: &str) -> Result<(), Error> {
    pings.send(msg.to_string()).await?;
    Ok(())
}

async fn pong(pings: &Receiver<String>, pongs: &Sender<String>) -> Result<(), Error> {
    if let Some(msg) = pings.recv().await {
        pongs.send(msg).await?;
    }
    Ok(())
}

async fn directions() -> Result<(), Error> {
    let (pings_tx, pings_rx) = Channel::buffered(1).split();
    let (pongs_tx, pongs_rx) = Channel::buffered(1).split();
    ping(&pings_tx, "passed message").await?;
    pong(&pings_rx, &pongs_tx).await?;
    if let Some(msg) = pongs_rx.recv().await {
        println!("{msg}");
    }
    Ok(())
}

async fn range() -> Result<(), Error> {
    let queue = Channel::buffered(2);
    queue.send("one").await?;
    queue.send("two").await?;
    queue.close()?;

    let mut items = queue.stream();
    while let Some(item) = items.next().await {
        println!("{item}");
    }
    Ok(())
}

async fn closing() -> Result<(), Error> {
    let jobs = Channel::buffered(5);
    let done = Channel::unbuffered();

    let (rx, signal) = (jobs.duplicate(), done.duplicate());
    spawn(async move {
        while let Some(j) = rx.recv().await {
            println!("received job {j}");
        }
        println!("received all jobs");
        let _ = signal.send(true).await;
    })?;

    for j in 1..=3 {
        jobs.send(j).await?;
        println!("sent job {j}");
    }
    jobs.close()?;
    println!("sent all jobs");
    done.recv().await;
    Ok(())
}

async fn select() -> Result<(), Error> {
    let one = Channel::unbuffered();
    let two = Channel::unbuffered();

    let tx = one.duplicate();
    spawn(async move {
        sleep(Duration::from_millis(10)).await;
        let _ = tx.send("one").await;
    })?;
    let tx = two.duplicate();
    spawn(async move {
        sleep(Duration::from_millis(20)).await;
        let _ = tx.send("two").await;
    })?;

    for _ in 0..2 {
        let msg = Choose::new()
            .recv(&one, |m| m)
            .recv(&two, |m| m)
            .run()
            .await?;
        if let Some(m) = msg {
            println!("received {m}");
        }
    }
    Ok(())
}

async fn timeouts() -> Result<(), Error> {
    for (n, (work, limit)) in [(20, 10), (20, 30)].into_iter().enumerate() {
        let n = n + 1;
        let results = Channel::buffered(1);
        let tx = results.duplicate();
        spawn(async move {
            sleep(Duration::from_millis(work)).await;
            let _ = tx.send(format!("result {n}")).await;
        })?;

        let line = Choose::new()
            .recv(&results, |r| r.unwrap_or_default())
            .timeout(now() + Duration::from_millis(limit), || format!("timeout {n}"))
            .run()
            .await?;
        println!("{line}");
    }
    Ok(())
}

async fn non_blocking() -> Result<(), Error> {
    let messages = Channel::<&str>::unbuffered();
    let signals = Channel::<bool>::unbuffered();

    let mut sel = Select::new();
    let msg = sel.recv(&messages, 0);
    sel.otherwise(1);
    match sel.wait().await? {
        0 => println!("received message {:?}", msg.take()),
        _ => println!("no message received"),
    }

    let mut sel = Select::new();
    sel.send(&messages, "hi", 0).otherwise(1);
    match sel.wait().await? {
        0 => println!("sent message hi"),
        _ => println!("no message sent"),
    }

    let mut sel = Select::new();
    let m = sel.recv(&messages, 0);
    let s = sel.recv(&signals, 1);
    sel.otherwise(2);
    match sel.wait().await? {
        0 => println!("received message {:?}", m.take()),
        1 => println!("received signal {:?}", s.take()),
        _ => println!("no activity"),
    }
    Ok(())
}

struct Ball {
    hits: u32,
}

async fn ping_pong() -> Result<(), Error> {
    let table = Channel::<Ball>::unbuffered();
    for name in ["ping", "pong"] {
        let table = table.duplicate();
        spawn(async move {
            while let Some(mut ball) = table.recv().await {
                ball.hits += 1;
                println!("{name} {}", ball.hits);
                sleep(Duration::from_millis(10)).await;
                if table.send(ball).await.is_err() {
                    break;
                }
            }
        })?;
    }

    table.send(Ball { hits: 0 }).await?;
    sleep(Duration::from_millis(55)).await;
    if let Some(ball) = table.recv().await {
        println!("final hits {}", ball.hits);
    }
    table.close()
}

async fn fibonacci() -> Result<(), Error> {
    let numbers = Channel::unbuffered();
    let quit = Channel::<()>::unbuffered();

    let (rx, q) = (numbers.duplicate(), quit.duplicate());
    spawn(async move {
        for _ in 0..10 {
            if let Some(n) = rx.recv().await {
                println!("{n}");
            }
        }
        let _ = q.send(()).await;
    })?;

    let (mut x, mut y) = (0u64, 1u64);
    let done = Rc::new(Cell::new(false));
    while !done.get() {
        let sent = Choose::new()
            .send(&numbers, x, || true)
            .recv(&quit, |_| {
                println!("quit");
                done.set(true);
                false
            })
            .run()
            .await?;
        if sent {
            (x, y) = (y, x + y);
        }
    }
    Ok(())
}

async fn whispers(n: usize) -> Result<(), Error> {
    let leftmost = Channel::<u64>::unbuffered();
    let mut left = leftmost.duplicate();
    for _ in 0..n {
        let right = Channel::unbuffered();
        let (l, r) = (left, right.duplicate());
        spawn(async move {
            if let Some(v) = r.recv().await {
                let _ = l.send(v + 1).await;
            }
        })?;
        left = right;
    }
    spawn(async move {
        let _ = left.send(1).await;
    })?;
    if let Some(v) = leftmost.recv().await {
        println!("{v}");
    }
    Ok(())
}

async fn worker_pool() -> Result<(), Error> {
    let jobs = Channel::buffered(100);
    let results = Channel::buffered(100);

    for id in 1..=3 {
        let (jobs, results) = (jobs.duplicate(), results.duplicate());
        spawn(async move {
            while let Some(j) = jobs.recv().await {
                println!("worker {id} processing job {j}");
                sleep(Duration::from_millis(5)).await;
                if results.send(j * 2).await.is_err() {
                    break;
                }
            }
        })?;
    }

    for j in 1..=9 {
        jobs.send(j).await?;
    }
    jobs.close()?;

    let mut total = 0;
    for _ in 1..=9 {
        total += results.recv().await.unwrap_or(0);
    }
    println!("sum of results {total}");
    Ok(())
}

async fn tickers() -> Result<(), Error> {
    let ticker = Ticker::new(Duration::from_millis(20))?;
    let ticks = Rc::new(Cell::new(0u32));

    let (ch, count) = (ticker.channel().duplicate(), ticks.clone());
    spawn(async move {
        let start = now();
        while let Some(at) = ch.recv().await {
            count.set(count.get() + 1);
            println!("tick at {:?}", at - start);
        }
    })?;

    sleep(Duration::from_millis(70)).await;
    ticker.stop();
    println!("ticker stopped after {} ticks", ticks.get());
    ticker.channel().close()
}

async fn fan_in_demo() -> Result<(), Error> {
    let producers: Vec<Channel<String>> = (0..3).map(|_| Channel::unbuffered()).collect();
    for (i, p) in producers.iter().enumerate() {
        let tx = p.duplicate();
        spawn(async move {
            for n in 0..2 {
                if tx.send(format!("producer {i} item {n}")).await.is_err() {
                    return;
                }
            }
            let _ = tx.close();
        })?;
    }

    let merged = fan_in(producers)?;
    let mut count = 0;
    while let Some(line) = merged.recv().await {
        println!("{line}");
        count += 1;
    }
    println!("merged {count} items");
    Ok(())
}
