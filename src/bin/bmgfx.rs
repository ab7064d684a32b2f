use clap::Parser;

use bmg_fixer::cli::{run, Cli};

/// Installs no log subscriber: `log` records are structured and the
/// choice of sink belongs to whatever embeds this crate, not to the
/// crate itself. Running this binary standalone means `trace!`/`warn!`
/// calls are silently dropped, same as any other unconfigured `log`
/// consumer.
fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
