//! Fan-in combiner scenarios: two producers, one combiner, one consumer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use trk_shm::{Combine, FanIn, RateCheck, ShmResult, Sink, Source, Wait};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_address(tag: &str) -> String {
    format!(
        "fi_{}_{}_{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

struct Sum;

impl Combine<u32> for Sum {
    type Output = u64;

    fn combine(&mut self, inputs: &[u32], out: &mut u64) {
        *out = inputs.iter().map(|&v| v as u64).sum();
    }
}

/// Collects the messages of WARN events.
#[derive(Clone, Default)]
struct WarnCapture(Arc<Mutex<Vec<String>>>);

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for WarnCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut message = String::new();
            event.record(&mut MessageVisitor(&mut message));
            self.0.lock().unwrap().push(message);
        }
    }
}

fn connect_capturing_warnings(
    fanin: &mut FanIn<u32, Sum>,
) -> (ShmResult<RateCheck>, Vec<String>) {
    let capture = WarnCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let result = tracing::subscriber::with_default(subscriber, || fanin.connect_to_nodes());
    let warnings = capture.0.lock().unwrap().clone();
    (result, warnings)
}

fn wait_drained<T: trk::shm::payload::Payload>(sink: &Sink<T>) {
    let start = Instant::now();
    while sink.pending_acks() > 0 && start.elapsed() < Duration::from_secs(10) {
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn produce(mut sink: Sink<u32>, values: Vec<u32>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for v in values {
            let Wait::Running(mut guard) = sink.wait() else {
                return;
            };
            *guard.retrieve() = v;
            guard.post();
        }
        wait_drained(&sink);
    })
}

#[test]
fn test_mixed_rates_run_at_slowest() -> ShmResult<()> {
    let a = unique_address("a");
    let b = unique_address("b");
    let out = unique_address("out");

    let mut sink_a = Sink::<u32>::new(0.02)?;
    sink_a.bind(&a)?;
    let mut sink_b = Sink::<u32>::new(0.025)?;
    sink_b.bind(&b)?;

    let mut fanin = FanIn::new(&[a.as_str(), b.as_str()], &out, Sum);
    let check = fanin.connect_to_nodes()?;
    assert!(!check.consistent);
    assert!((check.effective_rate_hz - 40.0).abs() < 1e-9);
    let out_period = fanin.sink().expect("bound").period_sec();
    assert!((out_period - 0.025).abs() < 1e-12);

    let mut consumer = Source::<u64>::new();
    consumer.touch(&out)?;
    consumer.connect()?;
    assert!((consumer.retrieve()?.period_sec - 0.025).abs() < 1e-12);

    let producer_a = produce(sink_a, vec![1, 2, 3, 4, 5]);
    let producer_b = produce(sink_b, vec![10, 20, 30, 40, 50]);
    let combiner = std::thread::spawn(move || {
        let mut cycles = 0;
        while !fanin.process() {
            cycles += 1;
        }
        if let Some(sink) = fanin.sink() {
            wait_drained(sink);
        }
        cycles
    });

    let mut outputs = Vec::new();
    while let Wait::Running(guard) = consumer.wait() {
        outputs.push(guard.clone());
    }

    producer_a.join().unwrap();
    producer_b.join().unwrap();
    assert_eq!(combiner.join().unwrap(), 5);
    assert_eq!(outputs, [11, 22, 33, 44, 55]);
    Ok(())
}

#[test]
fn test_upstream_end_stops_without_publishing() -> ShmResult<()> {
    let a = unique_address("a");
    let b = unique_address("b");
    let out = unique_address("out");

    let mut sink_a = Sink::<u32>::new(0.02)?;
    sink_a.bind(&a)?;
    let mut sink_b = Sink::<u32>::new(0.02)?;
    sink_b.bind(&b)?;

    let mut fanin = FanIn::new(&[a.as_str(), b.as_str()], &out, Sum);
    let check = fanin.connect_to_nodes()?;
    assert!(check.consistent);
    assert!((check.effective_rate_hz - 50.0).abs() < 1e-9);

    // First producer publishes, second one shuts down
    if let Wait::Running(mut guard) = sink_a.wait() {
        *guard.retrieve() = 7;
        guard.post();
    }
    drop(sink_b);

    assert!(fanin.process());
    assert_eq!(fanin.sink().expect("bound").sample_number(), 0);
    Ok(())
}

#[test]
fn test_sources_connected_in_any_start_order() -> ShmResult<()> {
    let a = unique_address("a");
    let b = unique_address("b");
    let out = unique_address("out");

    // Only the first producer is up when the combiner starts
    let mut sink_a = Sink::<u32>::new(0.01)?;
    sink_a.bind(&a)?;

    let mut fanin = FanIn::new(&[a.as_str(), b.as_str()], &out, Sum);
    assert!(fanin.connect_to_nodes().is_err());
    // Touching `a` already registered the combiner there
    assert_eq!(sink_a.reader_count(), 1);

    let mut sink_b = Sink::<u32>::new(0.01)?;
    sink_b.bind(&b)?;
    fanin.connect_to_nodes()?;
    assert_eq!(sink_a.reader_count(), 1);
    assert_eq!(sink_b.reader_count(), 1);
    Ok(())
}

#[test]
fn test_rate_mismatch_is_warned() -> ShmResult<()> {
    let a = unique_address("a");
    let b = unique_address("b");
    let out = unique_address("out");

    let mut sink_a = Sink::<u32>::new(0.02)?;
    sink_a.bind(&a)?;
    let mut sink_b = Sink::<u32>::new(0.025)?;
    sink_b.bind(&b)?;

    let mut fanin = FanIn::new(&[a.as_str(), b.as_str()], &out, Sum);
    let (check, warnings) = connect_capturing_warnings(&mut fanin);
    assert!(!check?.consistent);
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains(&format!("{a}=0.02s")), "{}", warnings[0]);
    assert!(warnings[0].contains(&format!("{b}=0.025s")), "{}", warnings[0]);
    Ok(())
}

#[test]
fn test_equal_rates_are_not_warned() -> ShmResult<()> {
    let a = unique_address("a");
    let b = unique_address("b");
    let out = unique_address("out");

    let mut sink_a = Sink::<u32>::new(0.02)?;
    sink_a.bind(&a)?;
    let mut sink_b = Sink::<u32>::new(0.02)?;
    sink_b.bind(&b)?;

    let mut fanin = FanIn::new(&[a.as_str(), b.as_str()], &out, Sum);
    let (check, warnings) = connect_capturing_warnings(&mut fanin);
    assert!(check?.consistent);
    assert!(warnings.is_empty(), "{warnings:?}");
    Ok(())
}
