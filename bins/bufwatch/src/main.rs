//! bufwatch - watch kernel socket buffers for queue buildup and drops.
//!
//! Registers the given sockets with a table monitor and polls on a fixed
//! interval, printing one line per change. Exits once every watched socket
//! has closed, or after `--cycles` polls.

use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use sockmon::{
    LifecycleListener, ProtocolCounter, SocketMonitor, SocketTable, StatisticsUpdate, Tcp, Udp,
};

#[derive(Parser)]
#[command(name = "bufwatch", version, about = "Watch kernel socket buffers for queue buildup and drops")]
struct Cli {
    /// Sockets to watch, as ADDR:PORT (e.g. 10.0.0.1:5000).
    #[arg(required = true)]
    sockets: Vec<SocketAddrV4>,

    /// Watch the TCP table instead of the UDP table.
    #[arg(short, long)]
    tcp: bool,

    /// Poll interval in milliseconds.
    #[arg(short, long, default_value_t = 500)]
    interval: u64,

    /// Stop after this many poll cycles (0 = run until interrupted).
    #[arg(short = 'n', long, default_value_t = 0)]
    cycles: u64,

    /// Read the table from this path instead of the default /proc/net one.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Print updates as JSON lines.
    #[arg(short, long)]
    json: bool,
}

/// Reports socket lifecycle transitions on stderr, keeping stdout for the
/// update stream.
struct PrintLifecycle;

impl LifecycleListener for PrintLifecycle {
    fn socket_monitoring_started(&self, address: SocketAddrV4) {
        eprintln!("bufwatch: watching {address}");
    }

    fn socket_monitoring_stopped(&self, address: SocketAddrV4) {
        eprintln!("bufwatch: {address} closed");
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let result = if cli.tcp {
        run::<Tcp>(&cli)
    } else {
        run::<Udp>(&cli)
    };

    if let Err(e) = result {
        eprintln!("bufwatch: {e}");
        process::exit(1);
    }
}

fn run<T: SocketTable>(cli: &Cli) -> sockmon::Result<()> {
    let lifecycle: Arc<dyn LifecycleListener> = Arc::new(PrintLifecycle);
    let mut monitor = match &cli.path {
        Some(path) => SocketMonitor::<T>::with_path(lifecycle, path),
        None => SocketMonitor::<T>::new(lifecycle),
    };
    for socket in &cli.sockets {
        monitor.begin_monitoring_of(*socket);
    }

    let json = cli.json;
    let mut on_update = move |update: &StatisticsUpdate| print_update(update, json);

    let mut completed = 0u64;
    loop {
        monitor.poll(&mut on_update)?;
        completed += 1;
        if cli.cycles != 0 && completed >= cli.cycles {
            return Ok(());
        }
        if monitor.registry().is_empty() {
            // Every watched socket has closed; nothing left to report.
            return Ok(());
        }
        thread::sleep(Duration::from_millis(cli.interval));
    }
}

fn print_update(update: &StatisticsUpdate, json: bool) {
    if json {
        match serde_json::to_string(update) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("bufwatch: {e}"),
        }
    } else {
        let counter = match update.counter {
            ProtocolCounter::Drops(n) => format!("drops={n}"),
            ProtocolCounter::TransmitQueueDepth(n) => format!("tx_queue={n}"),
        };
        println!(
            "{} inode={} rx_queue={} {counter}",
            update.address, update.inode, update.receive_queue_depth
        );
    }
}
