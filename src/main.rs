mod args;

use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

use anyhow::Context;
use args::{convert_filter, Args};
use clap::Parser;
use sweep_power::{
    plan::plan,
    scan::{CancelToken, ScanContext},
};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        // stdout may be carrying the CSV
        .with_writer(io::stderr)
        .init();

    // Build the hop table before touching the radio
    let plan = plan(args.frequency, args.crop, args.decimation())
        .with_context(|| format!("planning hops for {}", args.frequency))?;
    plan.log_summary();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.signal())
        .context("installing the interrupt handler")?;

    let mut device = args
        .source
        .open()
        .with_context(|| format!("opening sample source {:?}", args.source))?;

    let mut out: Box<dyn Write> = match args.output() {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    let mut ctx = ScanContext::new(args.scan_config(), plan, cancel);
    ctx.run(&mut device, &mut out, &args.schedule())?;
    out.flush()?;
    info!("Done");
    Ok(())
}
