fn main() {
    tejs_cli::run_main();
}
