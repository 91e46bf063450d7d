//! Print notifications of a family as they arrive.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features serde --example ntf_monitor -- netdev.json mgmt
//! ```
//!
//! Press Ctrl-C to stop.

use std::sync::Arc;

use tokio_stream::StreamExt;
use ynl::{SpecFamily, YnlFamily};

#[tokio::main]
async fn main() -> ynl::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: ntf_monitor <family.json> [group...]");
        std::process::exit(2);
    };

    let spec = Arc::new(SpecFamily::from_json(&std::fs::read_to_string(&path)?)?);
    let family = YnlFamily::new(spec).await?;

    let groups: Vec<String> = args.collect();
    let groups = if groups.is_empty() {
        family.mcast_groups().keys().cloned().collect()
    } else {
        groups
    };
    for group in &groups {
        family.subscribe(group).await?;
        println!("Subscribed to {}", group);
    }

    let mut ntfs = family.notifications();
    loop {
        tokio::select! {
            msg = ntfs.next() => match msg {
                Some(Ok(msg)) => println!("{} {}", msg.op, msg.attrs.to_json()),
                Some(Err(e)) => eprintln!("error: {}", e),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    // A pending read holds the session.
    drop(ntfs);

    let dropped = family.ntf_dropped().await;
    if dropped > 0 {
        eprintln!("{} notifications dropped", dropped);
    }
    Ok(())
}
