use color_eyre::{
    config::HookBuilder,
    Result,
};

/// Installs the eyre report hook and a panic hook that logs the panic before
/// exiting. Release builds write a crash report, debug builds print a full
/// backtrace.
pub fn init_errors() -> Result<()> {
    let (panic_hook, eyre_hook) = HookBuilder::default()
        .capture_span_trace_by_default(false)
        .display_location_section(false)
        .display_env_section(false)
        .into_hooks();
    eyre_hook.install()?;

    std::panic::set_hook(Box::new(move |panic_info| {
        #[cfg(not(debug_assertions))]
        {
            use human_panic::{
                handle_dump,
                print_msg,
                Metadata,
            };
            let metadata = Metadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            let file_path = handle_dump(&metadata, panic_info);
            if let Err(err) = print_msg(file_path, &metadata) {
                eprintln!("Failed to print crash report: {err}");
            }
            eprintln!("{}", panic_hook.panic_report(panic_info));
        }

        let report = panic_hook.panic_report(panic_info).to_string();
        error!("Error: {}", strip_ansi_escapes::strip_str(report));

        #[cfg(debug_assertions)]
        {
            better_panic::Settings::auto()
                .most_recent_first(false)
                .lineno_suffix(true)
                .verbosity(better_panic::Verbosity::Full)
                .create_panic_handler()(panic_info);
        }

        std::process::exit(libc::EXIT_FAILURE);
    }));

    Ok(())
}
