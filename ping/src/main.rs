mod app;

use std::process::exit;

use crossterm::style::Stylize;

fn main() {
    let app = app::PingApp::from_args();
    if let Err(err) = app.run() {
        eprintln!("ping: {}", format!("{}", err).red());
        exit(1);
    }
}
