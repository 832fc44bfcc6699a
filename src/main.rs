use clap::Parser;

use metaopt::adapter::inbound::cli::command::{Cli, ColorChoice};
use metaopt::adapter::inbound::cli::output::{self, OutputConfig};
use metaopt::adapter::inbound::cli::run;

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }
    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose));

    if let Err(e) = run::execute(&cli) {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
