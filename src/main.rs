use clap::Parser;
use egg::cli::Cli;
use egg::core::tool_invoker::ToolInvoker;
use egg::dispatch;

fn main() {
    let cli = Cli::parse();
    let invoker = ToolInvoker::new(cli.verbose);

    if let Err(err) = dispatch::run(cli, &invoker) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
