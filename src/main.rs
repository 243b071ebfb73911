use clap::Parser;
use weather_chat_lib::cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(e) = weather_chat_lib::run(args).await {
        eprintln!("weather-chat: {}", e);
        std::process::exit(1);
    }
}
