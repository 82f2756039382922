//! Argument normalization ahead of clap
//!
//! `kxctl -i prod -- get pods` is shorthand for `kxctl exec -i prod -- get pods`:
//! when the first argument after the global flags is itself a flag, `exec`
//! is implied.

/// Global options that consume the following argument.
const GLOBAL_WITH_VALUE: &[&str] = &["--config"];

/// Flags clap handles at the top level.
const TOP_LEVEL: &[&str] = &["-h", "--help", "-V", "--version"];

/// Insert the implied `exec` subcommand where needed. `args[0]` is the
/// program name.
pub fn normalize(mut args: Vec<String>) -> Vec<String> {
    let mut pos = 1;
    while let Some(arg) = args.get(pos) {
        if GLOBAL_WITH_VALUE.contains(&arg.as_str()) {
            pos += 2;
        } else if is_global_switch(arg) || arg.starts_with("--config=") {
            pos += 1;
        } else {
            break;
        }
    }

    if let Some(first) = args.get(pos) {
        if first.starts_with('-') && !TOP_LEVEL.contains(&first.as_str()) {
            tracing::trace!("implying exec before {first}");
            args.insert(pos, "exec".to_string());
        }
    }
    args
}

/// `-v`, `-vvv`, `-q`, `-vq`, `--verbose`, `--quiet`
fn is_global_switch(arg: &str) -> bool {
    match arg {
        "--verbose" | "--quiet" => true,
        _ => {
            arg.len() > 1
                && arg.starts_with('-')
                && !arg.starts_with("--")
                && arg[1..].chars().all(|c| c == 'v' || c == 'q')
        }
    }
}
