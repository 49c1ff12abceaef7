use clap::Parser;
use rotabak::backup::backup_config::Config;
use rotabak::backup::orchestrator::RunOptions;
use std::path::PathBuf;
use std::process::exit;
use tracing::error;

/// Create backups and delete the ones out of retention
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    /// Only run the named backup, can be repeated
    #[arg(short, long = "backup", value_name = "NAME")]
    backups: Vec<String>,

    #[arg(long)]
    skip_global_pre_hooks: bool,

    #[arg(long)]
    skip_global_post_hooks: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let options = RunOptions::builder()
        .selected(args.backups)
        .skip_global_pre_hooks(args.skip_global_pre_hooks)
        .skip_global_post_hooks(args.skip_global_post_hooks)
        .build();

    let res = Config::load(&args.config).and_then(|config| config.run(&options));

    match res {
        Ok(summary) if summary.is_success() => {}
        Ok(_) => exit(1),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
