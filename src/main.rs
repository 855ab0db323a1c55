use clap::Parser;
use color_eyre::Section;
use tracing_subscriber::EnvFilter;

use release_stats::cli::{Cli, Commands, CommentersOutputFormat};
use release_stats::config::{
    ReleaseStatsConfig, load_config, load_pull_list, merge_all_args, merge_commenters_args,
    merge_forge_args, merge_merged_args, merge_releases_args,
};
use release_stats::error::{ReleaseStatsError, Result};
use release_stats::forge::ForgeClient;
use release_stats::{orchestrator, reporting};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn into_report(err: ReleaseStatsError) -> color_eyre::Report {
    let suggestions = err.suggestions();
    suggestions
        .into_iter()
        .fold(color_eyre::Report::new(err), |report, suggestion| {
            report.suggestion(suggestion)
        })
}

fn connect(config: &ReleaseStatsConfig) -> Result<ForgeClient> {
    ForgeClient::connect(config.forge.forge_settings()?, &config.forge.http_settings())
}

fn pull_list(config: &ReleaseStatsConfig) -> Result<Vec<u64>> {
    match &config.general.pull_list {
        Some(path) => load_pull_list(path),
        None => Err(ReleaseStatsError::invalid_input_with_arg(
            "no pull list given",
            "pull_list",
        )),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match load_config(cli.config.as_deref())? {
        Some((path, config)) => {
            tracing::info!(path = %path.display(), "using config file");
            config
        }
        None => ReleaseStatsConfig::default(),
    };

    match cli.command {
        Commands::Releases(args) => {
            let merged = merge_releases_args(&args, &config);
            let outcome = orchestrator::analyze_releases(&merged.run_settings())?;
            let rendered = reporting::render_releases(&outcome, args.output)?;
            reporting::write_output(&rendered, args.output_file.as_deref())
        }
        Commands::Commenters(args) => {
            let merged = merge_commenters_args(&args, &config);
            let prs = pull_list(&merged)?;
            let client = connect(&merged)?;
            orchestrator::rate_limit_before_requests(&client);
            let tally =
                orchestrator::tally_commenters(&client, &prs, merged.forge.comment_concurrency)?;
            let rendered = reporting::render_tally(&tally, args.output)?;
            reporting::write_output(&rendered, merged.general.commenters_output.as_deref())
        }
        Commands::Merged(args) => {
            let merged = merge_merged_args(&args, &config);
            let client = connect(&merged)?;
            orchestrator::rate_limit_before_requests(&client);
            let settings = merged.run_settings();
            let rows = orchestrator::merged_pull_requests(
                &client,
                &settings.page_fetch,
                &settings.mainline_branch,
            )?;
            reporting::write_output(&reporting::render_merged(&rows, args.output)?, None)
        }
        Commands::RateLimit(args) => {
            let merged = merge_forge_args(&args, &config);
            let status = orchestrator::check_rate_limit(&connect(&merged)?)?;
            reporting::write_output(&reporting::render_rate_limit(&status), None)
        }
        Commands::All(args) => {
            let merged = merge_all_args(&args, &config);
            let client = connect(&merged)?;
            let prs = match &merged.general.pull_list {
                Some(path) => load_pull_list(path)?,
                None => Vec::new(),
            };
            let report = orchestrator::run_all(&merged.run_settings(), &client, &prs)?;

            if let Some(status) = &report.rate_limit {
                eprint!("{}", reporting::render_rate_limit(status));
            }
            let outcome = orchestrator::ReleaseOutcome {
                releases: report.releases,
                failures: report.failed_releases,
            };
            reporting::write_output(&reporting::render_releases(&outcome, args.output)?, None)?;
            reporting::write_output(
                &reporting::render_merged(&report.merged_pull_requests, Default::default())?,
                None,
            )?;
            let csv = reporting::render_tally(&report.tally, CommentersOutputFormat::Csv)?;
            reporting::write_output(&csv, merged.general.commenters_output.as_deref())
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    run(cli).map_err(into_report)
}
