use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use centrifuge_control_lib::config::Cli;

/// How long a finished session waits for blocking voice jobs before exiting
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// stderr logging, optionally mirrored into `log_file`
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    if let Some(path) = log_file {
        let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let file = Mutex::new(file);
        builder.format(move |buf, record| {
            let line = format!(
                "[{} {} {}] {}\n",
                buf.timestamp_seconds(),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args(),
            );
            buf.write_all(line.as_bytes())?;
            if let Ok(mut f) = file.lock() {
                let _ = f.write_all(line.as_bytes());
                let _ = f.flush();
            }
            Ok(())
        });
    }

    builder.init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let result = runtime.block_on(centrifuge_control_lib::run(cli));
    // a recorder or speaker subprocess still running is abandoned here
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    if let Err(e) = result {
        log::error!("Fatal: {e:#}");
        return Err(e);
    }
    Ok(())
}
