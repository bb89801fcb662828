/// Tells the operator on stdout and records the same line in the log.
macro_rules! say {
    ($($arg: tt)*) => {{
        let message = format!($($arg)*);
        ::log::info!("{message}");
        println!("{message}");
    }};
}

/// Reports a failure on stderr with the `ERROR:` prefix and records it in the log.
#[macro_export]
macro_rules! report_error {
    ($($arg: tt)*) => {{
        let message = format!($($arg)*);
        ::log::error!("{message}");
        eprintln!("ERROR: {message}");
    }};
}
