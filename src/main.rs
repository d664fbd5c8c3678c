use aigate::cli::{accounts, handle_config_init, AccountsCommands, Cli, Commands, ConfigCommands};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => aigate::cli::serve::run_serve(args).await,
        Commands::Accounts(cmd) => {
            let output = match cmd {
                AccountsCommands::Create(args) => accounts::handle_accounts_create(&args).await,
                AccountsCommands::Topup(args) => accounts::handle_accounts_topup(&args).await,
                AccountsCommands::Show(args) => accounts::handle_accounts_show(&args).await,
            };
            output.map(|msg| println!("{}", msg))
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => handle_config_init(&args),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
