//! Reference fan-in combiner: N sources of `T`, one sink of `C::Output`.

use crate::error::ShmResult;
use crate::node::Wait;
use crate::rate::{RateCheck, check_sample_periods};
use crate::sink::{ShutdownHandle, Sink};
use crate::source::NamedSource;
use tracing::{debug, info, warn};
use trk::shm::payload::Payload;

/// Pure combination step of a fan-in.
pub trait Combine<T> {
    /// Type published by the combiner's sink
    type Output: Payload;

    /// Write the combination of `inputs` (in configured source order) into
    /// `out`. `out` holds the previously published value.
    fn combine(&mut self, inputs: &[T], out: &mut Self::Output);
}

/// Fan-in component: waits for one sample from every source, combines them
/// and publishes the result.
pub struct FanIn<T: Payload, C: Combine<T>> {
    sources: Vec<NamedSource<T>>,
    inputs: Vec<T>,
    combiner: C,
    sink: Option<Sink<C::Output>>,
    sink_address: String,
}

impl<T: Payload, C: Combine<T>> FanIn<T, C> {
    /// Fan-in reading `source_addresses` (also used as the source names) and
    /// publishing to `sink_address`. Nothing is attached or bound yet.
    pub fn new<S: AsRef<str>>(source_addresses: &[S], sink_address: &str, combiner: C) -> Self {
        let sources: Vec<_> = source_addresses
            .iter()
            .map(|a| NamedSource::new(a.as_ref()))
            .collect();
        Self {
            inputs: vec![T::default(); sources.len()],
            sources,
            combiner,
            sink: None,
            sink_address: sink_address.to_string(),
        }
    }

    /// Touch every source, then connect every source, check that their
    /// sample periods agree and bind the sink at the slowest period.
    ///
    /// Touching all sources first registers this component with every
    /// upstream producer that is already bound before blocking on any one of
    /// them.
    pub fn connect_to_nodes(&mut self) -> ShmResult<RateCheck> {
        for named in &mut self.sources {
            named.source.touch(&named.name)?;
        }

        let mut periods = Vec::with_capacity(self.sources.len());
        for named in &mut self.sources {
            named.source.connect()?;
            let sample = named.source.retrieve()?;
            debug!("Source '{}' period {} s", named.name, sample.period_sec);
            periods.push(sample.period_sec);
        }

        let check = check_sample_periods(&periods)?;
        if !check.consistent {
            let names: Vec<String> = self
                .sources
                .iter()
                .zip(&periods)
                .map(|(s, p)| format!("{}={}s", s.name, p))
                .collect();
            warn!(
                "Sources run at different rates [{}]; output limited to {:.3} Hz",
                names.join(", "),
                check.effective_rate_hz
            );
        }

        let mut sink = Sink::new(1.0 / check.effective_rate_hz)?;
        sink.bind(&self.sink_address)?;
        info!(
            "Fan-in of {} source(s) publishing to '{}' at {:.3} Hz",
            self.sources.len(),
            self.sink_address,
            check.effective_rate_hz
        );
        self.sink = Some(sink);
        Ok(check)
    }

    /// Run one cycle. Returns `true` once END was observed on any source or
    /// on the sink; nothing is published in that cycle.
    pub fn process(&mut self) -> bool {
        for (named, input) in self.sources.iter_mut().zip(self.inputs.iter_mut()) {
            match named.source.wait() {
                Wait::Running(guard) => {
                    *input = guard.clone();
                    guard.post();
                }
                Wait::End => {
                    info!("Source '{}' ended", named.name);
                    return true;
                }
            }
        }

        let Some(sink) = self.sink.as_mut() else {
            return true;
        };
        match sink.wait() {
            Wait::Running(mut guard) => {
                self.combiner.combine(&self.inputs, guard.retrieve());
                guard.post();
                false
            }
            Wait::End => true,
        }
    }

    /// Run until END.
    pub fn run(&mut self) {
        while !self.process() {}
    }

    /// Sources in configured order.
    pub fn sources(&self) -> &[NamedSource<T>] {
        &self.sources
    }

    /// Output sink, `None` before `connect_to_nodes()`.
    pub fn sink(&self) -> Option<&Sink<C::Output>> {
        self.sink.as_ref()
    }

    /// Handle ending the output node, `None` before `connect_to_nodes()`.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.sink.as_ref().and_then(|s| s.shutdown_handle())
    }
}
