use std::io::Write;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Context, Result};

use crate::config::{Sweep, Transport};
use crate::events::{EventSink, ProbeEvent};
use crate::exchange::Exchanger;
use crate::probe::TransportProbe;
use crate::progress::Multiplexer;

/// Starts one probe thread per sweep and waits for all of them to finish
pub struct Dispatcher<W: Write> {
    progress: Arc<Multiplexer<W>>,
    exchanger: Arc<dyn Exchanger>,
    events: Arc<dyn EventSink>,
}

impl<W: Write + Send + 'static> Dispatcher<W> {
    pub fn new(
        progress: Arc<Multiplexer<W>>,
        exchanger: Arc<dyn Exchanger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            progress,
            exchanger,
            events,
        }
    }

    /// Run every sweep concurrently and block until each has signalled completion
    pub fn run(&self, sweeps: Vec<Sweep>) -> Result<()> {
        let (done_tx, done_rx) = mpsc::channel::<Transport>();
        let mut workers = Vec::with_capacity(sweeps.len());
        let mut running = 0usize;

        for sweep in sweeps {
            let transport = sweep.transport;
            let probe = TransportProbe::new(sweep, self.exchanger.clone(), self.events.clone());
            let progress = self.progress.clone();
            let done = done_tx.clone();

            let worker = thread::Builder::new()
                .name(format!("probe-{}", transport))
                .spawn(move || {
                    probe.run(&progress);
                    // The receiver outlives every worker unless run() bailed out
                    let _ = done.send(transport);
                })
                .with_context(|| format!("failed to start {} probe", transport))?;

            workers.push(worker);
            running += 1;
        }
        drop(done_tx);

        while running > 0 {
            done_rx
                .recv()
                .map_err(|_| anyhow!("{} probe(s) stopped without finishing", running))?;
            running -= 1;
        }

        for worker in workers {
            worker.join().map_err(|_| anyhow!("probe thread panicked"))?;
        }

        self.events.event(&ProbeEvent::AllFinished);

        Ok(())
    }
}
