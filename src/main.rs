use anyhow::Context;
use clap::Parser;
use log::{error, info};
use std::fs::File;
use std::path::PathBuf;

use bandscope::analyser::Analyser;
use bandscope::audio::CpalAcquirer;
use bandscope::config::Args;
use bandscope::input::KeyListener;
use bandscope::render::{TerminalSurface, init_terminal, restore_terminal};
use bandscope::scheduler::{ChannelFrames, Scheduler};

const DEBUG_LOG_FILE: &str = "bandscope.log";

/// The terminal owns stderr while the chart is up, so logs only go to a
/// file. Without one, logging stays off.
fn init_logging(args: &Args) -> Result<(), anyhow::Error> {
    let path = args
        .log_file
        .clone()
        .or_else(|| args.debug.then(|| PathBuf::from(DEBUG_LOG_FILE)));
    let level = match (&path, args.debug) {
        (None, _) => "off",
        (Some(_), true) => "debug",
        (Some(_), false) => "warn",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if let Some(path) = &path {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_logging(&args)?;
    let config = args.pipeline_config()?;
    info!("starting with {config:?}");

    let terminal = init_terminal()?;
    let mut scheduler = match Scheduler::new(TerminalSurface::new(terminal), config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            restore_terminal()?;
            return Err(e.into());
        }
    };

    let mut acquirer = CpalAcquirer::new(args.source, args.smoothing);
    if let Err(e) = scheduler.initialize(&mut acquirer) {
        restore_terminal()?;
        let context = if e.is_acquisition_failure() {
            "could not start audio capture"
        } else {
            "could not attach the spectrum analyser"
        };
        return Err(e).context(context);
    }
    if let Some(name) = scheduler.analyser().map(|a| a.source_name()) {
        scheduler.surface_mut().set_source_name(name);
    }

    let mut frames = ChannelFrames::new(args.fps);
    let canceller = frames.canceller();
    ctrlc::set_handler(move || canceller.cancel()).context("error setting Ctrl-C handler")?;

    let mut keys = KeyListener::spawn(scheduler.controls(), scheduler.config().clone());

    let outcome = scheduler.run(&mut frames);
    keys.stop();
    restore_terminal()?;

    match outcome {
        Ok(count) => {
            info!("rendered {count} frames");
            Ok(())
        }
        Err(e) => {
            error!("render loop failed: {e}");
            Err(e.into())
        }
    }
}
