//! Emits the command-line options as markdown on stdout.

fn main() {
    print!("{}", cwicr_cli::render_options_markdown());
}
