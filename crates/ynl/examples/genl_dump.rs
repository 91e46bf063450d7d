//! Run one operation of any family described in JSON.
//!
//! Dumps when the operation supports it, otherwise performs a do request.
//! Replies are printed as JSON, one message per line.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features serde --example genl_dump -- netdev.json dev-get
//! cargo run --features serde --example genl_dump -- netdev.json dev-get '{"ifindex": 1}'
//! RUST_LOG=ynl=debug cargo run --features serde --example genl_dump -- nlctrl.json getfamily
//! ```
//!
//! # Requirements
//!
//! - The family's kernel module must be loaded
//! - Read operations usually need no special privileges

use std::io;
use std::sync::Arc;

use ynl::{Attrs, SpecFamily, YnlFamily};

fn invalid(msg: String) -> ynl::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg).into()
}

#[tokio::main]
async fn main() -> ynl::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(path), Some(op)) = (args.next(), args.next()) else {
        eprintln!("usage: genl_dump <family.json> <operation> [json attributes]");
        std::process::exit(2);
    };
    let attrs = match args.next() {
        Some(text) => {
            let json: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| invalid(format!("attributes: {}", e)))?;
            Attrs::from_json(&json).ok_or_else(|| invalid("attributes must be a JSON object".into()))?
        }
        None => Attrs::new(),
    };

    let spec = Arc::new(SpecFamily::from_json(&std::fs::read_to_string(&path)?)?);
    let dump = spec
        .operation(&op)
        .ok_or_else(|| ynl::EncodeError::UnknownOperation(op.clone()))?
        .is_dump();

    let family = YnlFamily::new(spec).await?;
    let replies = if dump {
        family.dump(&op, &attrs).await?
    } else {
        family.do_op(&op, &attrs).await?.into_iter().collect()
    };

    for msg in &replies {
        println!("{}", msg.attrs.to_json());
    }
    if replies.is_empty() {
        eprintln!("{}: no reply", op);
    }

    Ok(())
}
