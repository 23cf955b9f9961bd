use std::io::Write;
use std::sync::Arc;

use crate::config::Sweep;
use crate::events::{EventSink, ProbeEvent};
use crate::exchange::Exchanger;
use crate::progress::Multiplexer;

/// Runs one transport's sweep, one exchange at a time
pub struct TransportProbe {
    sweep: Sweep,
    exchanger: Arc<dyn Exchanger>,
    events: Arc<dyn EventSink>,
}

impl TransportProbe {
    pub fn new(sweep: Sweep, exchanger: Arc<dyn Exchanger>, events: Arc<dyn EventSink>) -> Self {
        Self {
            sweep,
            exchanger,
            events,
        }
    }

    /// Probe every server with every query, in order, reporting each outcome
    /// before moving on. Failures are counted, never retried or propagated.
    pub fn run<W: Write>(&self, progress: &Multiplexer<W>) {
        let transport = self.sweep.transport;
        let total = self.sweep.total();

        self.events.event(&ProbeEvent::SweepStarted { transport, total });

        let mut succeeded = 0;

        for server in self.sweep.servers.iter() {
            for name in self.sweep.queries.iter() {
                self.events.event(&ProbeEvent::Attempt {
                    transport,
                    server,
                    name,
                });

                let success = match self
                    .exchanger
                    .exchange(transport, server, name, self.sweep.timeout)
                {
                    Ok(reply) if reply.is_success() => {
                        self.events.event(&ProbeEvent::Resolved {
                            transport,
                            server,
                            name,
                            answers: reply.answer_count,
                            truncated: reply.truncated,
                        });
                        true
                    }
                    Ok(reply) => {
                        self.events.event(&ProbeEvent::Rejected {
                            transport,
                            server,
                            name,
                            rcode: reply.rcode,
                        });
                        false
                    }
                    Err(error) => {
                        self.events.event(&ProbeEvent::ExchangeFailed {
                            transport,
                            server,
                            name,
                            error: &error,
                        });
                        false
                    }
                };

                if success {
                    succeeded += 1;
                }

                if let Err(error) = progress.record(transport.as_str(), total, success) {
                    self.events.event(&ProbeEvent::DisplayFailed {
                        transport,
                        error: &error,
                    });
                }
            }
        }

        self.events.event(&ProbeEvent::SweepFinished {
            transport,
            succeeded,
            failed: total - succeeded,
        });
    }
}
