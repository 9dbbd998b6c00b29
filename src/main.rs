use av_pipe::config::{DEFAULT_INPUT, DEFAULT_OUTPUT, Speed, TranscodeConfig};
use clap::{Arg, ArgMatches, Command};

fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder
            .filter_level(log::LevelFilter::Info)
            .filter_module("ffmpeg_next", log::LevelFilter::Warn)
            .filter_module("av_pipe", log::LevelFilter::Info)
            .filter_module("av_transcode", log::LevelFilter::Info);
    }
    builder.init();
}

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about("Re-encodes a video at a different playback speed")
        .arg(
            Arg::new("speed")
                .value_name("SPEED")
                .help("Playback speed multiplier, clamped to 0.5..=3.0")
                .required(false)
                .default_value("1.0"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("PATH")
                .help("Input media file")
                .default_value(DEFAULT_INPUT),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("Output media file, format guessed from the extension")
                .default_value(DEFAULT_OUTPUT),
        )
}

fn config_from_matches(matches: &ArgMatches) -> anyhow::Result<TranscodeConfig> {
    let speed = match matches.get_one::<String>("speed") {
        Some(value) => value.parse::<Speed>()?,
        None => Speed::default(),
    };
    let input = matches
        .get_one::<String>("input")
        .map(String::as_str)
        .unwrap_or(DEFAULT_INPUT);
    let output = matches
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or(DEFAULT_OUTPUT);
    Ok(TranscodeConfig::new(input, output, speed))
}

#[cfg(feature = "ffmpeg")]
async fn transcode(config: TranscodeConfig) -> anyhow::Result<()> {
    av_pipe::ffmpeg::init()?;
    let pipeline = av_pipe::ffmpeg::build_transcode(&config)?;
    let report = pipeline.run().await?;
    log::info!("{}", report);
    log::info!("wrote {}", config.output);
    Ok(())
}

#[cfg(not(feature = "ffmpeg"))]
async fn transcode(config: TranscodeConfig) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "cannot transcode {}: built without the ffmpeg feature",
        config.input
    ))
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = match config_from_matches(&cli().get_matches()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(2);
        }
    };
    log::info!(
        "{} -> {} at speed {}",
        config.input,
        config.output,
        config.speed
    );

    let task = tokio::spawn(transcode(config));

    let result = tokio::select! {
        result = task => result,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("interrupted, output is incomplete");
            std::process::exit(130);
        },
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("transcode failed: {:#}", e);
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("transcode task failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<TranscodeConfig> {
        let matches = cli().try_get_matches_from(args)?;
        config_from_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["av-transcode"]).unwrap();
        assert_eq!(config.speed.value(), 1.0);
        assert_eq!(config.input, DEFAULT_INPUT);
        assert_eq!(config.output, DEFAULT_OUTPUT);
    }

    #[test]
    fn test_speed_and_paths() {
        let config = parse(&["av-transcode", "2", "-i", "in.mkv", "--output", "fast.mp4"]).unwrap();
        assert_eq!(config.speed.value(), 2.0);
        assert_eq!(config.input, "in.mkv");
        assert_eq!(config.output, "fast.mp4");
    }

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(parse(&["av-transcode", "8"]).unwrap().speed.value(), 3.0);
        assert_eq!(parse(&["av-transcode", "0.1"]).unwrap().speed.value(), 0.5);
    }

    #[test]
    fn test_bad_speed_is_rejected() {
        assert!(parse(&["av-transcode", "fast"]).is_err());
        assert!(parse(&["av-transcode", "1", "2"]).is_err());
    }
}
