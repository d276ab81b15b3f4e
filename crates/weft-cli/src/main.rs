use std::io;
use std::process::ExitCode;

use weft_core::init_tracing;

fn main() -> ExitCode {
    init_tracing();

    let matches = weft_cli::command().get_matches();
    let mut stdout = io::stdout().lock();
    match weft_cli::run(&matches, &mut stdout) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("weft: {e:#}");
            ExitCode::from(2)
        }
    }
}
