use clap::Parser;
use miette::Result;
use plotit::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Fancy miette reports with source snippets
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();

    // RUST_LOG still wins over -v/-q
    env_logger::Builder::new()
        .filter_level(cli.global.log_level())
        .format_timestamp(None)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Run(args) => plotit::cli::commands::run::run(args, cli.global),
        Commands::Summary(args) => plotit::cli::commands::summary::run(args),
        Commands::Check(args) => plotit::cli::commands::check::run(args, cli.global),
        Commands::List(args) => plotit::cli::commands::list::run(args),
        Commands::Completions(args) => plotit::cli::commands::completions::run(args),
    }
}
