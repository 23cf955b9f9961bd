use crate::config::Transport;
use crate::dns_header::rcode_name;
use crate::exchange::ExchangeError;

/// Something worth telling the operator about while sweeps run
#[derive(Debug)]
pub enum ProbeEvent<'a> {
    SweepStarted {
        transport: Transport,
        total: usize,
    },
    Attempt {
        transport: Transport,
        server: &'a str,
        name: &'a str,
    },
    Resolved {
        transport: Transport,
        server: &'a str,
        name: &'a str,
        answers: u16,
        truncated: bool,
    },
    Rejected {
        transport: Transport,
        server: &'a str,
        name: &'a str,
        rcode: u8,
    },
    ExchangeFailed {
        transport: Transport,
        server: &'a str,
        name: &'a str,
        error: &'a ExchangeError,
    },
    DisplayFailed {
        transport: Transport,
        error: &'a std::io::Error,
    },
    SweepFinished {
        transport: Transport,
        succeeded: usize,
        failed: usize,
    },
    AllFinished,
}

/// Receiver for probe diagnostics, handed to every component that reports
pub trait EventSink: Send + Sync {
    fn event(&self, event: &ProbeEvent<'_>);
}

/// Discards everything; used when the live progress display owns the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn event(&self, _event: &ProbeEvent<'_>) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn event(&self, event: &ProbeEvent<'_>) {
        match *event {
            ProbeEvent::SweepStarted { transport, total } => {
                tracing::info!(%transport, total, "beginning sweep");
            }
            ProbeEvent::Attempt {
                transport,
                server,
                name,
            } => {
                tracing::debug!(%transport, "testing {} @ {}", name, server);
            }
            ProbeEvent::Resolved {
                transport,
                server,
                name,
                answers,
                truncated,
            } => {
                tracing::info!(%transport, server, answers, truncated, "resolved {}", name);
            }
            ProbeEvent::Rejected {
                transport,
                server,
                name,
                rcode,
            } => {
                tracing::warn!(
                    %transport,
                    server,
                    rcode = rcode_name(rcode),
                    "failed to resolve {}",
                    name
                );
            }
            ProbeEvent::ExchangeFailed {
                transport,
                server,
                name,
                error,
            } => {
                tracing::warn!(%transport, server, "request for {} failed: {}", name, error);
            }
            ProbeEvent::DisplayFailed { transport, error } => {
                tracing::error!(%transport, "progress display write failed: {}", error);
            }
            ProbeEvent::SweepFinished {
                transport,
                succeeded,
                failed,
            } => {
                tracing::info!(%transport, succeeded, failed, "finished sweep");
            }
            ProbeEvent::AllFinished => {
                tracing::info!("exiting");
            }
        }
    }
}
