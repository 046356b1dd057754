use clap::Parser;
use lotuswifi::cli::{
    handle_completions, handle_config_init, handle_settings, Cli, Commands, ConfigCommands,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => {
            let result = lotuswifi::cli::run::run_supervisor(args).await;
            if result.is_ok() {
                // The stdin reader thread may still be blocked on a read that
                // can never be cancelled; don't wait for it on runtime drop.
                std::process::exit(0);
            }
            result
        }
        Commands::Settings(args) => handle_settings(&args),
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => handle_config_init(&args),
        },
        Commands::Completions(args) => {
            handle_completions(&args);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
