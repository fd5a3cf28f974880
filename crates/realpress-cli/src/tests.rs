use clap::Parser;

use super::*;
use crate::commands::parse_url_list;

#[test]
fn parses_enqueue_with_defaults() {
    let cli = Cli::try_parse_from(["realpress-cli", "enqueue", "--file", "urls.txt"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Enqueue {
            ref file,
            ref source,
            priority: 0,
        } if file.as_os_str() == "urls.txt" && source == "import"
    ));
}

#[test]
fn parses_enqueue_with_source_and_priority() {
    let cli = Cli::try_parse_from([
        "realpress-cli",
        "enqueue",
        "--file",
        "urls.txt",
        "--source",
        "manual",
        "--priority",
        "7",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Enqueue { ref source, priority: 7, .. } if source == "manual"
    ));
}

#[test]
fn parses_run_batch_overrides() {
    let cli = Cli::try_parse_from([
        "realpress-cli",
        "run-batch",
        "--batch-size",
        "20",
        "--max-concurrent",
        "4",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::RunBatch {
            batch_size: Some(20),
            max_concurrent: Some(4)
        }
    ));
}

#[test]
fn run_batch_sizes_default_to_none() {
    let cli = Cli::try_parse_from(["realpress-cli", "run-batch"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::RunBatch {
            batch_size: None,
            max_concurrent: None
        }
    ));
}

#[test]
fn parses_retry_and_cancel_ids() {
    let retry = Cli::try_parse_from(["realpress-cli", "retry", "42"]).expect("valid args");
    assert!(matches!(retry.command, Commands::Retry { id: 42 }));

    let cancel = Cli::try_parse_from(["realpress-cli", "cancel", "7"]).expect("valid args");
    assert!(matches!(cancel.command, Commands::Cancel { id: 7 }));
}

#[test]
fn rejects_non_numeric_job_id() {
    assert!(Cli::try_parse_from(["realpress-cli", "retry", "abc"]).is_err());
}

#[test]
fn parses_domain_block() {
    let cli = Cli::try_parse_from(["realpress-cli", "domain", "block", "example.com"])
        .expect("valid args");
    assert!(matches!(
        cli.command,
        Commands::Domain {
            command: DomainCommands::Block { ref domain }
        } if domain == "example.com"
    ));
}

#[test]
fn domain_priority_defaults_to_enabled() {
    let cli = Cli::try_parse_from(["realpress-cli", "domain", "priority", "example.com"])
        .expect("valid args");
    assert!(matches!(
        cli.command,
        Commands::Domain {
            command: DomainCommands::Priority { enabled: true, .. }
        }
    ));

    let cli = Cli::try_parse_from([
        "realpress-cli",
        "domain",
        "priority",
        "example.com",
        "--enabled",
        "false",
    ])
    .expect("valid args");
    assert!(matches!(
        cli.command,
        Commands::Domain {
            command: DomainCommands::Priority { enabled: false, .. }
        }
    ));
}

#[test]
fn parses_stats_and_migrate() {
    let stats = Cli::try_parse_from(["realpress-cli", "stats"]).expect("valid args");
    assert!(matches!(stats.command, Commands::Stats));

    let migrate = Cli::try_parse_from(["realpress-cli", "migrate"]).expect("valid args");
    assert!(matches!(migrate.command, Commands::Migrate));
}

#[test]
fn subcommand_is_required() {
    assert!(Cli::try_parse_from(["realpress-cli"]).is_err());
}

#[test]
fn url_list_skips_blanks_and_comments() {
    let contents = "# seed list\nhttps://example.com/a\n\n   https://example.com/b  \n#https://example.com/c\n";
    assert_eq!(
        parse_url_list(contents),
        vec!["https://example.com/a", "https://example.com/b"]
    );
}
