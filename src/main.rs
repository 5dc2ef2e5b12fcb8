use clap::Parser;
use nodewiz::adapter::inbound::cli::command::{
    Cli, ClusterCommand, ColorChoice, Commands, ConfigCommand,
};
use nodewiz::adapter::inbound::cli::output::{self, OutputConfig};
use nodewiz::adapter::inbound::cli::{cluster, config, operator, wiz};
use nodewiz::error::Result;
use nodewiz::infrastructure::operator::entry::Operator;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose));
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }

    if operator::install(Box::new(Operator::new())).is_err() {
        output::error("operator already installed");
        std::process::exit(1);
    }

    if let Err(e) = dispatch(&cli).await {
        if output::is_json() {
            output::error(&e.to_string());
        } else {
            eprintln!("{:?}", miette::Report::new(e));
        }
        std::process::exit(1);
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let path = cli.config.as_deref();
    match &cli.command {
        Commands::Cluster(ClusterCommand::Create(args)) => cluster::execute_create(path, args).await,
        Commands::Cluster(ClusterCommand::Destroy(args)) => {
            cluster::execute_destroy(path, args).await
        }
        Commands::Cluster(ClusterCommand::List) => cluster::execute_list(path),
        Commands::Cluster(ClusterCommand::Describe(args)) => cluster::execute_describe(path, args),
        Commands::Cluster(ClusterCommand::Whitelist(args)) => {
            cluster::execute_whitelist(path, args).await
        }
        Commands::Cluster(ClusterCommand::Sync(args)) => cluster::execute_sync(path, args).await,
        Commands::Cluster(ClusterCommand::Validate(command)) => {
            cluster::execute_validate(path, command).await
        }
        Commands::Wiz(args) => wiz::execute(path, args).await,
        Commands::Config(ConfigCommand::Init(args)) => config::execute_init(path, args.force),
        Commands::Config(ConfigCommand::Show) => config::execute_show(path),
        Commands::Config(ConfigCommand::Validate) => config::execute_validate(path),
    }
}
