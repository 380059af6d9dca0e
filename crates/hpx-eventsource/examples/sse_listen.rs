//! Event Source Example
//!
//! Prints every event of a server-sent event stream until Ctrl-C.
//!
//! Run with: `cargo run -p hpx-eventsource --example sse_listen -- <url>`

use std::time::Duration;

use hpx_eventsource::{Event, EventListener, EventSource, EventSourceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/events".to_string());

    let config = EventSourceConfig::new(url)
        .reconnection_time(Duration::from_secs(1))
        .connect_timeout(Duration::from_secs(5));

    let printer = EventListener::new(|event| match event {
        Event::Open => println!("-- open"),
        Event::Error(err) => println!("-- error: {err}"),
        Event::Message(message) => println!(
            "[{}] id={:?} {}",
            message.event_type(),
            message.last_event_id(),
            message.data()
        ),
    });

    let mut source = EventSource::builder(config)?
        .on_open(printer.clone())
        .on_error(printer.clone())
        .on_message(printer)
        .connect()?;

    let handle = source.handle();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => handle.close(),
        _ = source.closed() => {}
    }

    println!("-- closed ({})", handle.ready_state());
    Ok(())
}
