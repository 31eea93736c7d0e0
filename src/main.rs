enum Cli {
    Exit,
    Run { demo: bool },
}

fn main() {
    let demo = match handle_cli_flags() {
        Cli::Exit => return,
        Cli::Run { demo } => demo,
    };

    if let Err(err) = hn_station::run(demo) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> Cli {
    let mut demo = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("HN Station {}", hn_station::VERSION);
                return Cli::Exit;
            }
            "--help" | "-h" => {
                println!(
                    "HN Station - read Hacker News discussions from the terminal.\n\n  --demo               Browse the built-in sample feed\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                return Cli::Exit;
            }
            "--demo" => demo = true,
            other => {
                eprintln!("error: unknown argument {other}\nRun with --help to see the options.");
                std::process::exit(2);
            }
        }
    }
    Cli::Run { demo }
}
