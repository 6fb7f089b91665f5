use camstream_frame::{DEFAULT_MAX_BUFFER_SIZE, DEFAULT_READ_TIMEOUT};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("camstream {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    print_fields(&build_info(), format);
    Ok(SUCCESS)
}

fn build_info() -> Vec<(&'static str, String)> {
    let known = |value: Option<&str>| value.unwrap_or("unknown").to_string();
    vec![
        ("name", "camstream".to_string()),
        ("version", env!("CARGO_PKG_VERSION").to_string()),
        ("build_target", known(option_env!("CAMSTREAM_BUILD_TARGET"))),
        ("target_os", std::env::consts::OS.to_string()),
        ("target_arch", std::env::consts::ARCH.to_string()),
        ("rustc", known(option_env!("RUSTC_VERSION"))),
        ("git_hash", known(option_env!("GIT_HASH"))),
        ("feature_async", cfg!(feature = "async").to_string()),
        ("default_max_buffer_size", DEFAULT_MAX_BUFFER_SIZE.to_string()),
        (
            "default_read_timeout_ms",
            DEFAULT_READ_TIMEOUT.as_millis().to_string(),
        ),
    ]
}
