use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use indoc::printdoc;

use focus_wm::{ComponentId, ComponentTree, DispatchThread, EventQueue, EventRecord, EventSink};

#[derive(Parser, Debug)]
#[command(
    name = "queue-bench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Post events from several threads and measure dispatch throughput"
)]
struct BenchCli {
    /// Number of posting threads.
    #[arg(short = 'p', long = "producers", value_name = "N", default_value_t = 4)]
    producers: usize,

    /// Events posted by each producer.
    #[arg(short = 'e', long = "events", value_name = "N", default_value_t = 100_000)]
    events: u64,
}

struct CountingSink {
    dispatched: Arc<AtomicU64>,
}

impl EventSink for CountingSink {
    fn dispatch_event(&mut self, event: &mut EventRecord) {
        event.consume();
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }
}

struct BenchResult {
    posted: u64,
    dispatched: u64,
    post_elapsed: Duration,
    total_elapsed: Duration,
}

fn run(cli: &BenchCli) -> Result<BenchResult, String> {
    let mut tree = ComponentTree::new();
    let frame = tree.add_frame("bench");
    let target: ComponentId = tree.add_component(frame, "target").map_err(|e| e.to_string())?;

    let queue = EventQueue::new();
    let dispatched = Arc::new(AtomicU64::new(0));
    let edt = DispatchThread::spawn(
        queue.clone(),
        CountingSink {
            dispatched: dispatched.clone(),
        },
        "bench-dispatch",
    )
    .map_err(|e| e.to_string())?;

    let start = Instant::now();
    let producers: Vec<_> = (0..cli.producers)
        .map(|_| {
            let queue = queue.clone();
            let events = cli.events;
            thread::spawn(move || {
                for n in 0..events {
                    let event = if n % 2 == 0 {
                        EventRecord::focus_gained(target, None, false)
                    } else {
                        EventRecord::focus_lost(target, None, false)
                    };
                    queue.post_event(event);
                }
            })
        })
        .collect();
    for producer in producers {
        producer
            .join()
            .map_err(|_| "producer thread panicked".to_string())?;
    }
    let post_elapsed = start.elapsed();

    // Everything posted before the marker is dispatched before it runs.
    queue.invoke_and_wait(|| ()).map_err(|e| e.to_string())?;
    let total_elapsed = start.elapsed();
    edt.shutdown();

    Ok(BenchResult {
        posted: cli.events * cli.producers as u64,
        dispatched: dispatched.load(Ordering::Relaxed),
        post_elapsed,
        total_elapsed,
    })
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
}

fn main() {
    let cli = BenchCli::parse();
    match run(&cli) {
        Ok(result) => {
            printdoc! {"
                producers:   {producers}
                posted:      {posted}
                dispatched:  {dispatched}
                post time:   {post:?} ({post_rate:.0} events/s)
                total time:  {total:?} ({total_rate:.0} events/s)
                ",
                producers = cli.producers,
                posted = result.posted,
                dispatched = result.dispatched,
                post = result.post_elapsed,
                post_rate = rate(result.posted, result.post_elapsed),
                total = result.total_elapsed,
                total_rate = rate(result.dispatched, result.total_elapsed),
            }
        }
        Err(err) => {
            eprintln!("queue-bench: {err}");
            std::process::exit(1);
        }
    }
}
