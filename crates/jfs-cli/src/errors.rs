use std::error::Error;

/// Print an error and its chain of causes to stderr.
pub fn print_error(e: &dyn Error) {
    eprintln!("Error: {}", e);
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}
