use clap::{value_parser, Arg, Command, ValueHint};
use rayon::ThreadPoolBuilder;
use tdmap_cli::input::Input;
use tdmap_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("TDMAP_LOG", "error,tdmap=info"))
        .init();

    let matches = Command::new("tdmap")
        .version(clap::crate_version!())
        .about("Target/decoy posterior error probabilities and FDR for proteomics identifications")
        .arg(
            Arg::new("parameters")
                .short('p')
                .long("parameters")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("observations")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to observation tables to process. Overrides the files listed in \
                     the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where results will be written. Overrides the directory \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("snapshot")
                .short('s')
                .long("snapshot")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Reload the maps saved by a previous run instead of starting empty")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("fdr")
                .long("fdr")
                .value_parser(value_parser!(f64))
                .help("Validate at this FDR, in percent. Overrides the configured threshold.")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("write-snapshot")
                .long("write-snapshot")
                .action(clap::ArgAction::SetTrue)
                .help("Save all maps to `snapshot.tdmap.json`"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .map(|n| *n as usize)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new().num_threads(threads).build_global()?;

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    runner.run()?;

    Ok(())
}
