use clap::Parser;
use prefix_index_cli::{Cli, Command, Context, Error, commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::from_cli(&cli);
    ctx.prepare()?;

    match &cli.command {
        Command::Normalize(args) => {
            let summary = commands::normalize(&ctx, args)?;
            for url in &summary.duplicates {
                println!("duplicate: {url}");
            }
            println!("{summary}");
        }
        Command::Analyze(args) => {
            for stats in commands::analyze(&ctx, args)? {
                println!("{stats}");
            }
        }
        Command::MatchExternal(args) => {
            println!("{}", commands::match_external(&ctx, args)?);
        }
        Command::MatchIndex(args) => {
            println!("{}", commands::match_index(&ctx, args)?);
        }
        Command::Lookup(args) => {
            for lookup in commands::lookup(&ctx, args)? {
                println!("{lookup}");
            }
        }
        Command::Scan(args) => {
            println!("{}", commands::scan(&ctx, args)?);
        }
        #[cfg(feature = "sqlite")]
        Command::ExportStore(args) => {
            let (count, out) = commands::export_store(&ctx, args)?;
            println!("{count} prefixes written to {}", out.display());
        }
    }

    Ok(())
}
