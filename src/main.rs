//! airq entry point

use airquality_automl::cli::{
    cmd_inspect, cmd_predict, cmd_run, cmd_train, cmd_benchmark, cmd_unify, load_config, Cli, Commands,
};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airquality_automl=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Unify => cmd_unify(config)?,
        Commands::Benchmark { task, json } => cmd_benchmark(config, &task, json.as_deref())?,
        Commands::Train { task } => cmd_train(config, task.as_deref())?,
        Commands::Predict { model, features, json, strict } => {
            cmd_predict(config, &model, &features, json.as_deref(), strict)?
        }
        Commands::Run => cmd_run(config)?,
        Commands::Inspect { model } => cmd_inspect(config, model.as_deref())?,
    }

    Ok(())
}
