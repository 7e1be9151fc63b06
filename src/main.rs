//! Sends a 28x28 grayscale image to the FPGA inverter over a serial port and
//! checks that every returned pixel is `255 - sent`.
//!
//! usage: inverter-harness [image]
//!
//! Without an image a test pattern (the letter "C") is sent. The port and
//! other settings come from `INVERTER_*` environment variables.

use anyhow::Context;
use inverter_harness::report::{self, Reporter};
use inverter_harness::source::{self, Source, PAYLOAD_LEN};
use inverter_harness::verify::verify;
use inverter_harness::{Config, Session};
use std::env;

/// How many mismatches to list individually.
const SHOW_MISMATCHES: usize = 10;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let source = Source::from_arg(env::args_os().nth(1));
    if source == Source::TestPattern {
        println!("No image path provided, using the default 'C' test pattern.");
        println!("{}", USAGE);
    }
    let loaded = source::load(&source)?;

    let session = Session::open(&config).with_context(|| {
        format!(
            "failed to open {} at {} baud (set INVERTER_PORT to choose a port)",
            config.port, config.baud_rate
        )
    })?;
    let received = session.exchange(&loaded.payload)?;

    let comparison = verify(&loaded.payload, &received);
    println!();
    println!("Mismatches: {}/{}", comparison.mismatch_count(), PAYLOAD_LEN);
    println!("{}", comparison.summary());
    if !comparison.is_match() {
        println!("First mismatches:");
        for m in comparison.mismatches().iter().take(SHOW_MISMATCHES) {
            println!("  Index {}: expected {}, got {}", m.index, m.expected, m.actual);
        }
    }

    let reporter = Reporter::new(&config.output_dir);
    match reporter.write_grids(&loaded.payload, &received, comparison.expected()) {
        Ok(paths) => {
            for path in paths {
                println!("Saved {}", path.display());
            }
        }
        Err(e) => log::warn!("{:#}", anyhow::Error::from(e)),
    }

    let panel = report::render_panel(&loaded.original, &loaded.payload, &received, &comparison);
    match reporter.save_panel(&panel) {
        Ok(path) => {
            println!("Saved {}", path.display());
            if config.show {
                if let Err(e) = report::show(&path) {
                    log::warn!("{:#}", anyhow::Error::from(e));
                }
            }
        }
        Err(e) => log::warn!("{:#}", anyhow::Error::from(e)),
    }

    Ok(())
}

const USAGE: &str = "usage: inverter-harness [image]";
