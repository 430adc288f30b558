use std::path::PathBuf;

#[derive(Debug, Default)]
struct CliArgs {
    config_dir: Option<PathBuf>,
    null_audio: bool,
}

fn main() -> anyhow::Result<()> {
    mediavault::logging::init();
    let args = parse_args(std::env::args().skip(1).collect())?;

    mediavault::app::run_with_startup(mediavault::app::AppStartupOptions {
        config_dir: args.config_dir,
        null_audio: args.null_audio,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--null-audio" => out.null_audio = true,
            "--config-dir" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--config-dir requires a path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--config-dir cannot be empty");
                }
                out.config_dir = Some(PathBuf::from(value.trim()));
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("mediavault");
    println!("  --config-dir <path>  Settings, PIN store and art cache location");
    println!("  --null-audio         Run without an audio output device");
}
