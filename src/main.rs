fn main() {
    if let Err(err) = ops_report::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
