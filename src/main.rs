fn main() {
    if let Err(err) = parkir::cli::run() {
        parkir::ui::eprintln_error(&err);
        std::process::exit(parkir::exit::exit_code(&err));
    }
}
