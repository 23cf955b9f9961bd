mod config;
mod dispatcher;
mod dns_header;
mod dns_message;
mod dns_question;
mod events;
mod exchange;
mod probe;
mod progress;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{parse_timeout, plan};
use dispatcher::Dispatcher;
use events::{EventSink, NullSink, TracingSink};
use exchange::WireExchanger;
use progress::Multiplexer;

#[derive(Parser, Debug)]
#[command(name = "dns-probe", about = "Probe public DNS resolvers over UDP, TCP and TLS")]
struct Args {
    /// Print diagnostics to stderr instead of the live progress display
    #[arg(long)]
    debug: bool,

    /// Probe resolvers over TCP
    #[arg(long)]
    tcp: bool,

    /// Probe resolvers over UDP
    #[arg(long)]
    udp: bool,

    /// Probe resolvers over DNS-over-TLS
    #[arg(long)]
    dot: bool,

    /// Per-query timeout (e.g. 250ms, 1s)
    #[arg(long, value_parser = parse_timeout, default_value = "250ms")]
    timeout: Duration,
}

fn setup_logging(debug: bool) -> Arc<dyn EventSink> {
    if !debug {
        return Arc::new(NullSink);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .without_time()
        .try_init()
        .ok();

    Arc::new(TracingSink)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let events = setup_logging(args.debug);

    let sweeps = plan(args.tcp, args.udp, args.dot, args.timeout);
    let progress = Arc::new(Multiplexer::stdout(!args.debug));
    let exchanger = Arc::new(WireExchanger::new()?);

    Dispatcher::new(progress, exchanger, events).run(sweeps)
}
