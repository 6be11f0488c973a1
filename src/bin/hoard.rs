use clap::Parser;
use hoard::client::{run_command, ClientArgs};

#[tokio::main]
async fn main() {
  let args = ClientArgs::parse();

  match run_command(&args).await {
    Ok(true) => {}
    // the server answered, but the answer was "no"
    Ok(false) => std::process::exit(1),
    Err(e) => {
      eprintln!("{}", e);
      std::process::exit(e.exit_code());
    }
  }
}
