use characterdisplay::{app::App, cli::Command, Result};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match Command::parse(&args)? {
        Command::ShowHelp(text) => {
            print!("{text}");
            Ok(())
        }
        Command::ShowVersion => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Run(opts) => App::from_options(opts)?.run(),
    }
}
